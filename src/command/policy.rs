//! Policy commands
//!
//! Instance-level defaults and org-level overrides share one set of
//! commands parameterized by scope. Add on an existing kind fails with
//! AlreadyExists, change/remove on a missing kind with NotFound, and a
//! change to identical values emits nothing.

use crate::aggregate::policy::{
    policy_event_type, reduce_policy_set, PolicyKind, PolicyOp, PolicyPayload, PolicySet,
};
use crate::aggregate::Scope;
use crate::domain::password::{PasswordComplexityPolicy, PasswordLockoutPolicy};
use crate::error::{AppResult, Error};
use crate::event_store::{EventCommand, EventFilter};

use super::{CommandContext, Commands};

impl Commands {
    pub async fn add_policy(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        payload: PolicyPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        payload.validate()?;
        let owner = self.policy_owner(ctx, scope, org_id).await?;
        let kind = payload.kind();
        let value = payload.to_value()?;

        self.retrying(|| {
            let owner = owner.clone();
            let value = value.clone();
            Box::pin(async move {
                let set = self.load_policy_set(ctx, scope, &owner).await?;
                if set.has(kind) {
                    return Err(Error::already_exists(
                        "POLICY-001",
                        format!("{} policy already exists", kind.as_str()),
                    ));
                }
                let command = EventCommand::new(
                    scope.aggregate_type(),
                    &owner,
                    &policy_event_type(scope, kind, PolicyOp::Added),
                )
                .payload(&value)?
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(set.stream.version);
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn change_policy(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        payload: PolicyPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        payload.validate()?;
        let owner = self.policy_owner(ctx, scope, org_id).await?;
        let kind = payload.kind();
        let value = payload.to_value()?;

        self.retrying(|| {
            let owner = owner.clone();
            let value = value.clone();
            Box::pin(async move {
                let set = self.load_policy_set(ctx, scope, &owner).await?;
                let current = set.get_raw(kind).ok_or_else(|| {
                    Error::not_found(
                        "POLICY-002",
                        format!("{} policy not found", kind.as_str()),
                    )
                })?;
                if *current == value {
                    return Ok(());
                }
                let command = EventCommand::new(
                    scope.aggregate_type(),
                    &owner,
                    &policy_event_type(scope, kind, PolicyOp::Changed),
                )
                .payload(&value)?
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(set.stream.version);
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_policy(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        kind: PolicyKind,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let owner = self.policy_owner(ctx, scope, org_id).await?;

        self.retrying(|| {
            let owner = owner.clone();
            Box::pin(async move {
                let set = self.load_policy_set(ctx, scope, &owner).await?;
                if !set.has(kind) {
                    return Err(Error::not_found(
                        "POLICY-002",
                        format!("{} policy not found", kind.as_str()),
                    ));
                }
                let command = EventCommand::new(
                    scope.aggregate_type(),
                    &owner,
                    &policy_event_type(scope, kind, PolicyOp::Removed),
                )
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(set.stream.version);
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn policy_owner(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
    ) -> AppResult<String> {
        match scope {
            Scope::Instance => Ok(ctx.instance_id.clone()),
            Scope::Org => {
                let org_id = org_id.ok_or_else(|| {
                    Error::invalid_argument("POLICY-004", "org id required for org policies")
                })?;
                self.existing_org(ctx, org_id).await?;
                Ok(org_id.to_string())
            }
        }
    }

    /// Reduce the full scope-owner stream into its policy view; the stream
    /// version covers all aggregate events so pushes stack correctly.
    pub(crate) async fn load_policy_set(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        owner: &str,
    ) -> AppResult<PolicySet> {
        let events = self
            .store()
            .query(EventFilter::aggregate(
                &ctx.instance_id,
                scope.aggregate_type(),
                owner,
            ))
            .await?;
        reduce_policy_set(&events)
    }

    /// Org override, instance default, built-in default, in that order.
    pub(crate) async fn effective_password_complexity(
        &self,
        ctx: &CommandContext,
        org_id: Option<&str>,
    ) -> AppResult<PasswordComplexityPolicy> {
        if let Some(org_id) = org_id {
            let set = self.load_policy_set(ctx, Scope::Org, org_id).await?;
            if let Some(policy) = set.get(PolicyKind::PasswordComplexity)? {
                return Ok(policy);
            }
        }
        let set = self
            .load_policy_set(ctx, Scope::Instance, &ctx.instance_id)
            .await?;
        Ok(set
            .get(PolicyKind::PasswordComplexity)?
            .unwrap_or_default())
    }

    pub(crate) async fn effective_password_lockout(
        &self,
        ctx: &CommandContext,
        org_id: Option<&str>,
    ) -> AppResult<PasswordLockoutPolicy> {
        if let Some(org_id) = org_id {
            let set = self.load_policy_set(ctx, Scope::Org, org_id).await?;
            if let Some(policy) = set.get(PolicyKind::PasswordLockout)? {
                return Ok(policy);
            }
        }
        let set = self
            .load_policy_set(ctx, Scope::Instance, &ctx.instance_id)
            .await?;
        Ok(set.get(PolicyKind::PasswordLockout)?.unwrap_or_default())
    }
}

//! Organization commands

use crate::aggregate::org::{
    OrgAddedPayload, OrgChangedPayload, OrgDomainAddedPayload, OrgDomainPrimarySetPayload,
    OrgDomainRemovedPayload, OrgDomainVerificationAddedPayload, OrgDomainVerificationFailedPayload,
    OrgDomainVerifiedPayload, OrgMemberPayload, OrgMemberRemovedPayload, OrgState,
    ORG_ADDED, ORG_CHANGED, ORG_DEACTIVATED, ORG_DOMAIN_ADDED, ORG_DOMAIN_PRIMARY_SET,
    ORG_DOMAIN_REMOVED, ORG_DOMAIN_VERIFICATION_ADDED, ORG_DOMAIN_VERIFICATION_FAILED,
    ORG_DOMAIN_VERIFIED, ORG_MEMBER_ADDED, ORG_MEMBER_CHANGED, ORG_MEMBER_REMOVED,
    ORG_REACTIVATED, ORG_REMOVED,
};
use crate::aggregate::{Aggregate, Org, User};
use crate::domain::validation::{
    normalize_domain, require_max_len, require_non_empty, validate_domain_name,
};
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

/// How a domain is proven: `http` or `dns`.
const DOMAIN_VALIDATION_TYPES: &[&str] = &["http", "dns"];

impl Commands {
    /// Create a new organization. Duplicate names are allowed.
    pub async fn add_org(&self, ctx: &CommandContext, name: &str) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let name = name.trim();
        require_non_empty(name, "ORG-001", "org name")?;
        require_max_len(name, 200, "ORG-001", "org name")?;

        let org_id = self.next_id();
        let command = EventCommand::new(Org::aggregate_type(), &org_id, ORG_ADDED)
            .payload(&OrgAddedPayload {
                name: name.to_string(),
            })?
            .editor(&ctx.editor_user)
            .owner(&org_id)
            .expected_version(0);

        self.push(ctx, vec![command]).await?;
        Ok(org_id)
    }

    /// Rename an organization; renaming to the current name is a no-op.
    pub async fn change_org(&self, ctx: &CommandContext, org_id: &str, name: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let name = name.trim().to_string();
        require_non_empty(&name, "ORG-001", "org name")?;
        require_max_len(&name, 200, "ORG-001", "org name")?;

        self.retrying(|| {
            let name = name.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if org.name == name {
                    return Ok(());
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_CHANGED)
                    .payload(&OrgChangedPayload { name })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_org(&self, ctx: &CommandContext, org_id: &str) -> AppResult<()> {
        self.org_state_change(ctx, org_id, ORG_DEACTIVATED, OrgState::Active, "active")
            .await
    }

    pub async fn reactivate_org(&self, ctx: &CommandContext, org_id: &str) -> AppResult<()> {
        self.org_state_change(ctx, org_id, ORG_REACTIVATED, OrgState::Inactive, "inactive")
            .await
    }

    pub async fn remove_org(&self, ctx: &CommandContext, org_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_REMOVED)
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn org_state_change(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        event_type: &'static str,
        required: OrgState,
        required_name: &'static str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if org.state != required {
                    return Err(Error::failed_precondition(
                        "ORG-003",
                        format!("org is not {required_name}"),
                    ));
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, event_type)
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Domains
    // -----------------------------------------------------------------------

    pub async fn add_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let domain = normalize_domain(domain);
        validate_domain_name(&domain)?;

        self.retrying(|| {
            let domain = domain.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if org.domain(&domain).is_some() {
                    return Err(Error::already_exists(
                        "ORG-DOMAIN-002",
                        format!("domain already exists: {domain}"),
                    ));
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_ADDED)
                    .payload(&OrgDomainAddedPayload {
                        domain,
                        validation_type: None,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Issue a fresh ownership token for the domain and return it for
    /// publication (HTTP well-known path or DNS TXT record).
    pub async fn generate_org_domain_validation(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
        validation_type: &str,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let domain = normalize_domain(domain);
        if !DOMAIN_VALIDATION_TYPES.contains(&validation_type) {
            return Err(Error::invalid_argument(
                "ORG-DOMAIN-004",
                format!("unknown validation type: {validation_type}"),
            ));
        }

        let token = self.codes().token32();
        let result = self
            .retrying(|| {
                let domain = domain.clone();
                let token = token.clone();
                let validation_type = validation_type.to_string();
                Box::pin(async move {
                    let org = self.existing_org(ctx, org_id).await?;
                    let existing = org.domain(&domain).ok_or_else(|| {
                        Error::not_found("ORG-DOMAIN-005", format!("domain not found: {domain}"))
                    })?;
                    if existing.verified {
                        return Err(Error::failed_precondition(
                            "ORG-DOMAIN-006",
                            "domain is already verified",
                        ));
                    }
                    let command =
                        EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_VERIFICATION_ADDED)
                            .payload(&OrgDomainVerificationAddedPayload {
                                domain,
                                validation_type,
                                token,
                            })?
                            .editor(&ctx.editor_user)
                            .owner(org_id)
                            .expected_version(org.version());
                    self.push(ctx, vec![command]).await?;
                    Ok(())
                })
            })
            .await;

        result.map(|_| token)
    }

    /// Probe the domain for the published token and mark it verified.
    pub async fn verify_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let domain = normalize_domain(domain);

        let org = self.existing_org(ctx, org_id).await?;
        let entry = org.domain(&domain).ok_or_else(|| {
            Error::not_found("ORG-DOMAIN-005", format!("domain not found: {domain}"))
        })?;
        if entry.verified {
            return Ok(());
        }
        let token = entry.pending_token.clone().ok_or_else(|| {
            Error::failed_precondition("ORG-DOMAIN-007", "no verification pending for domain")
        })?;
        let validation_type = entry.validation_type.clone().unwrap_or_else(|| "http".to_string());

        let verified = match validation_type.as_str() {
            "dns" => self.probe().verify_dns(&domain, &token).await,
            _ => self.probe().verify_http(&domain, &token).await,
        };

        let command = if verified {
            EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_VERIFIED).payload(
                &OrgDomainVerifiedPayload {
                    domain: domain.clone(),
                },
            )?
        } else {
            EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_VERIFICATION_FAILED)
                .payload(&OrgDomainVerificationFailedPayload {
                    domain: domain.clone(),
                })?
        }
        .editor(&ctx.editor_user)
        .owner(org_id)
        .expected_version(org.version());
        self.push(ctx, vec![command]).await?;

        if verified {
            Ok(())
        } else {
            Err(Error::failed_precondition(
                "ORG-DOMAIN-003",
                format!("domain verification failed: {domain}"),
            ))
        }
    }

    pub async fn set_primary_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let domain = normalize_domain(domain);

        self.retrying(|| {
            let domain = domain.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                let entry = org.domain(&domain).ok_or_else(|| {
                    Error::not_found("ORG-DOMAIN-005", format!("domain not found: {domain}"))
                })?;
                if !entry.verified {
                    return Err(Error::failed_precondition(
                        "ORG-DOMAIN-008",
                        "Domain must be verified to set as primary",
                    ));
                }
                if entry.primary {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_PRIMARY_SET)
                        .payload(&OrgDomainPrimarySetPayload { domain })?
                        .editor(&ctx.editor_user)
                        .owner(org_id)
                        .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let domain = normalize_domain(domain);

        self.retrying(|| {
            let domain = domain.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if org.domain(&domain).is_none() {
                    return Err(Error::not_found(
                        "ORG-DOMAIN-005",
                        format!("domain not found: {domain}"),
                    ));
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_DOMAIN_REMOVED)
                    .payload(&OrgDomainRemovedPayload { domain })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    pub async fn add_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "ORG-MEMBER-001",
                "member roles must not be empty",
            ));
        }
        let user: User = self.load(&ctx.instance_id, user_id).await?;
        if !user.exists() {
            return Err(Error::not_found(
                "USER-002",
                format!("user not found: {user_id}"),
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if org.members.contains_key(user_id) {
                    return Err(Error::already_exists(
                        "ORG-MEMBER-003",
                        "org member already exists",
                    ));
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_MEMBER_ADDED)
                    .payload(&OrgMemberPayload {
                        user_id: user_id.to_string(),
                        roles,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn change_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "ORG-MEMBER-001",
                "member roles must not be empty",
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                let current = org.members.get(user_id).ok_or_else(|| {
                    Error::not_found("ORG-MEMBER-002", "org member not found")
                })?;
                if *current == roles {
                    return Ok(());
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_MEMBER_CHANGED)
                    .payload(&OrgMemberPayload {
                        user_id: user_id.to_string(),
                        roles,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let org = self.existing_org(ctx, org_id).await?;
                if !org.members.contains_key(user_id) {
                    return Err(Error::not_found("ORG-MEMBER-002", "org member not found"));
                }
                let command = EventCommand::new(Org::aggregate_type(), org_id, ORG_MEMBER_REMOVED)
                    .payload(&OrgMemberRemovedPayload {
                        user_id: user_id.to_string(),
                    })?
                    .editor(&ctx.editor_user)
                    .owner(org_id)
                    .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Load an org that must exist and not be removed.
    pub(crate) async fn existing_org(&self, ctx: &CommandContext, org_id: &str) -> AppResult<Org> {
        let org: Org = self.load(&ctx.instance_id, org_id).await?;
        if !org.exists() || org.state == OrgState::Removed {
            return Err(Error::not_found(
                "ORG-002",
                format!("org not found: {org_id}"),
            ));
        }
        Ok(org)
    }
}

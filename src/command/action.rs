//! Instance action and execution commands

use crate::aggregate::action::{
    ActionAddedPayload, ActionChangedPayload, ActionState, ExecutionSetPayload,
    ExecutionRemovedPayload, ExecutionTarget, ACTION_ADDED, ACTION_CHANGED, ACTION_DEACTIVATED,
    ACTION_REACTIVATED, ACTION_REMOVED, EXECUTION_REMOVED, EXECUTION_SET,
};
use crate::aggregate::{Aggregate, Execution, InstanceAction};
use crate::domain::validation::{require_non_empty, validate_url};
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

impl Commands {
    /// Create an instance action under a generated ID.
    pub async fn add_instance_action(
        &self,
        ctx: &CommandContext,
        name: &str,
        script: &str,
        timeout_secs: u64,
        allowed_to_fail: bool,
    ) -> AppResult<String> {
        let action_id = self.next_id();
        self.add_instance_action_with_id(ctx, &action_id, name, script, timeout_secs, allowed_to_fail)
            .await?;
        Ok(action_id)
    }

    /// Create an instance action under a caller-chosen ID; fails when a
    /// live action already holds the ID.
    pub async fn add_instance_action_with_id(
        &self,
        ctx: &CommandContext,
        action_id: &str,
        name: &str,
        script: &str,
        timeout_secs: u64,
        allowed_to_fail: bool,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        require_non_empty(action_id, "ACTION-005", "action id")?;
        require_non_empty(name, "ACTION-006", "action name")?;
        require_non_empty(script, "ACTION-007", "action script")?;

        self.retrying(|| {
            let name = name.to_string();
            let script = script.to_string();
            Box::pin(async move {
                let action: InstanceAction = self.load(&ctx.instance_id, action_id).await?;
                if action.is_live() {
                    return Err(Error::already_exists(
                        "ACTION-001",
                        "instance action already exists",
                    ));
                }
                let command =
                    EventCommand::new(InstanceAction::aggregate_type(), action_id, ACTION_ADDED)
                        .payload(&ActionAddedPayload {
                            name,
                            script,
                            timeout_secs,
                            allowed_to_fail,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(action.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn change_instance_action(
        &self,
        ctx: &CommandContext,
        action_id: &str,
        changes: ActionChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let action = self.live_action(ctx, action_id).await?;

                let mut effective = changes;
                if effective.name.as_deref() == Some(action.name.as_str()) {
                    effective.name = None;
                }
                if effective.script.as_deref() == Some(action.script.as_str()) {
                    effective.script = None;
                }
                if effective.timeout_secs == Some(action.timeout_secs) {
                    effective.timeout_secs = None;
                }
                if effective.allowed_to_fail == Some(action.allowed_to_fail) {
                    effective.allowed_to_fail = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command =
                    EventCommand::new(InstanceAction::aggregate_type(), action_id, ACTION_CHANGED)
                        .payload(&effective)?
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(action.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_instance_action(
        &self,
        ctx: &CommandContext,
        action_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let action = self.live_action(ctx, action_id).await?;
                if action.state != ActionState::Active {
                    return Err(Error::failed_precondition(
                        "ACTION-003",
                        "instance action is not active",
                    ));
                }
                let command = EventCommand::new(
                    InstanceAction::aggregate_type(),
                    action_id,
                    ACTION_DEACTIVATED,
                )
                .editor(&ctx.editor_user)
                .owner(&ctx.instance_id)
                .expected_version(action.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn reactivate_instance_action(
        &self,
        ctx: &CommandContext,
        action_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let action = self.live_action(ctx, action_id).await?;
                if action.state != ActionState::Inactive {
                    return Err(Error::failed_precondition(
                        "ACTION-004",
                        "instance action is not inactive",
                    ));
                }
                let command = EventCommand::new(
                    InstanceAction::aggregate_type(),
                    action_id,
                    ACTION_REACTIVATED,
                )
                .editor(&ctx.editor_user)
                .owner(&ctx.instance_id)
                .expected_version(action.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_instance_action(
        &self,
        ctx: &CommandContext,
        action_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let action = self.live_action(ctx, action_id).await?;
                let command =
                    EventCommand::new(InstanceAction::aggregate_type(), action_id, ACTION_REMOVED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(action.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Bind targets to a trigger condition (upsert); identical target
    /// lists emit nothing.
    pub async fn set_execution(
        &self,
        ctx: &CommandContext,
        condition: &str,
        targets: Vec<ExecutionTarget>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        require_non_empty(condition, "EXEC-002", "execution condition")?;
        if targets.is_empty() {
            return Err(Error::invalid_argument(
                "EXEC-001",
                "execution targets must not be empty",
            ));
        }
        for target in &targets {
            if target.target_type != "webhook" && target.target_type != "call" {
                return Err(Error::invalid_argument(
                    "EXEC-003",
                    format!("unknown target type: {}", target.target_type),
                ));
            }
            validate_url(&target.target)?;
        }

        self.retrying(|| {
            let targets = targets.clone();
            Box::pin(async move {
                let execution: Execution = self.load(&ctx.instance_id, condition).await?;
                if execution.active && execution.targets == targets {
                    return Ok(());
                }
                let command = EventCommand::new(Execution::aggregate_type(), condition, EXECUTION_SET)
                    .payload(&ExecutionSetPayload {
                        condition: condition.to_string(),
                        targets,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&ctx.instance_id)
                    .expected_version(execution.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_execution(&self, ctx: &CommandContext, condition: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let execution: Execution = self.load(&ctx.instance_id, condition).await?;
                if !execution.active {
                    return Err(Error::not_found(
                        "EXEC-004",
                        format!("execution not found: {condition}"),
                    ));
                }
                let command =
                    EventCommand::new(Execution::aggregate_type(), condition, EXECUTION_REMOVED)
                        .payload(&ExecutionRemovedPayload {
                            condition: condition.to_string(),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(execution.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn live_action(
        &self,
        ctx: &CommandContext,
        action_id: &str,
    ) -> AppResult<InstanceAction> {
        let action: InstanceAction = self.load(&ctx.instance_id, action_id).await?;
        if !action.is_live() {
            return Err(Error::not_found(
                "ACTION-002",
                format!("instance action not found: {action_id}"),
            ));
        }
        Ok(action)
    }
}

//! Actions and executions read model

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::action::{
    ActionAddedPayload, ActionChangedPayload, ExecutionRemovedPayload, ExecutionSetPayload,
    ACTION_ADDED, ACTION_CHANGED, ACTION_DEACTIVATED, ACTION_REACTIVATED, ACTION_REMOVED,
    EXECUTION_REMOVED, EXECUTION_SET,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct ActionProjection;

impl ActionProjection {
    async fn set_state(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        state: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE actions_projection
            SET state = $3, change_date = $4, position = $5
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(state)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Projection for ActionProjection {
    fn name(&self) -> &'static str {
        "actions"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            ACTION_ADDED,
            ACTION_CHANGED,
            ACTION_DEACTIVATED,
            ACTION_REACTIVATED,
            ACTION_REMOVED,
            EXECUTION_SET,
            EXECUTION_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            ACTION_ADDED => {
                let payload: ActionAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO actions_projection
                        (id, instance_id, resource_owner, name, script, timeout_secs,
                         allowed_to_fail, state, change_date, position)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET name = EXCLUDED.name,
                        script = EXCLUDED.script,
                        timeout_secs = EXCLUDED.timeout_secs,
                        allowed_to_fail = EXCLUDED.allowed_to_fail,
                        state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.name)
                .bind(&payload.script)
                .bind(payload.timeout_secs as i64)
                .bind(payload.allowed_to_fail)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ACTION_CHANGED => {
                let payload: ActionChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE actions_projection
                    SET name = COALESCE($3, name),
                        script = COALESCE($4, script),
                        timeout_secs = COALESCE($5, timeout_secs),
                        allowed_to_fail = COALESCE($6, allowed_to_fail),
                        change_date = $7,
                        position = $8
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.name)
                .bind(&payload.script)
                .bind(payload.timeout_secs.map(|t| t as i64))
                .bind(payload.allowed_to_fail)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ACTION_DEACTIVATED => Self::set_state(tx, event, "inactive").await?,
            ACTION_REACTIVATED => Self::set_state(tx, event, "active").await?,
            ACTION_REMOVED => {
                sqlx::query("DELETE FROM actions_projection WHERE instance_id = $1 AND id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .execute(&mut **tx)
                    .await?;
            }
            EXECUTION_SET => {
                let payload: ExecutionSetPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO executions_projection
                        (condition, instance_id, targets, change_date, position)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (instance_id, condition) DO UPDATE
                    SET targets = EXCLUDED.targets,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&payload.condition)
                .bind(&event.instance_id)
                .bind(serde_json::to_value(&payload.targets)?)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            EXECUTION_REMOVED => {
                let payload: ExecutionRemovedPayload = event.payload_as()?;
                sqlx::query(
                    "DELETE FROM executions_projection WHERE instance_id = $1 AND condition = $2",
                )
                .bind(&event.instance_id)
                .bind(&payload.condition)
                .execute(&mut **tx)
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

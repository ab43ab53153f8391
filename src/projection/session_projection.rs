//! Session read model
//!
//! Maintains `sessions_projection`, including the bulk termination
//! handlers fanning out user/org/client-wide logouts.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::org::ORG_SESSIONS_TERMINATED;
use crate::aggregate::project::{AppSessionsTerminatedPayload, APP_SESSIONS_TERMINATED};
use crate::aggregate::session::{
    FactorCheckedPayload, OidcSessionAddedPayload, SessionAddedPayload, SessionUpdatedPayload,
    SESSION_ADDED, SESSION_FACTOR_CHECKED, SESSION_OIDC_ADDED, SESSION_TERMINATED,
    SESSION_UPDATED,
};
use crate::aggregate::user::USER_SESSIONS_TERMINATED;
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct SessionProjection;

#[async_trait]
impl Projection for SessionProjection {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            SESSION_ADDED,
            SESSION_OIDC_ADDED,
            SESSION_UPDATED,
            SESSION_FACTOR_CHECKED,
            SESSION_TERMINATED,
            USER_SESSIONS_TERMINATED,
            ORG_SESSIONS_TERMINATED,
            APP_SESSIONS_TERMINATED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            SESSION_ADDED => {
                let payload: SessionAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO sessions_projection
                        (id, instance_id, user_id, resource_owner, state,
                         creation_date, change_date, position)
                    VALUES ($1, $2, $3, $4, 'active', $5, $5, $6)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&payload.user_id)
                .bind(&event.resource_owner)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SESSION_OIDC_ADDED => {
                let payload: OidcSessionAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO sessions_projection
                        (id, instance_id, user_id, resource_owner, state, client_id,
                         code_challenge, code_challenge_method, creation_date, change_date, position)
                    VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8, $8, $9)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&payload.user_id)
                .bind(&event.resource_owner)
                .bind(&payload.client_id)
                .bind(&payload.code_challenge)
                .bind(&payload.code_challenge_method)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SESSION_UPDATED => {
                let payload: SessionUpdatedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET token_id = COALESCE($3, token_id),
                        amr = COALESCE($4, amr),
                        auth_time = COALESCE($5, auth_time),
                        change_date = $6,
                        position = $7
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.token_id)
                .bind(&payload.amr)
                .bind(payload.auth_time)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SESSION_FACTOR_CHECKED => {
                let payload: FactorCheckedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET factors = factors || jsonb_build_object($3::text, $4::timestamptz),
                        change_date = $5,
                        position = $6
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.factor_type)
                .bind(payload.checked_at)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SESSION_TERMINATED => {
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET state = 'terminated', change_date = $3, position = $4
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            USER_SESSIONS_TERMINATED => {
                // The aggregate is the user.
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET state = 'terminated', change_date = $3, position = $4
                    WHERE instance_id = $1 AND user_id = $2 AND state = 'active'
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_SESSIONS_TERMINATED => {
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET state = 'terminated', change_date = $3, position = $4
                    WHERE instance_id = $1 AND resource_owner = $2 AND state = 'active'
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            APP_SESSIONS_TERMINATED => {
                let payload: AppSessionsTerminatedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE sessions_projection
                    SET state = 'terminated', change_date = $3, position = $4
                    WHERE instance_id = $1 AND client_id = $2 AND state = 'active'
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.client_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

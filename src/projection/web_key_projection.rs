//! Web key read model

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::web_key::{
    WEB_KEY_ACTIVATED, WEB_KEY_DEACTIVATED, WEB_KEY_GENERATED, WEB_KEY_REMOVED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct WebKeyProjection;

#[async_trait]
impl Projection for WebKeyProjection {
    fn name(&self) -> &'static str {
        "web_keys"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            WEB_KEY_GENERATED,
            WEB_KEY_ACTIVATED,
            WEB_KEY_DEACTIVATED,
            WEB_KEY_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            WEB_KEY_GENERATED => {
                sqlx::query(
                    r#"
                    INSERT INTO web_keys_projection
                        (id, instance_id, state, config, change_date, position)
                    VALUES ($1, $2, 'initial', $3, $4, $5)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET config = EXCLUDED.config,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            WEB_KEY_ACTIVATED | WEB_KEY_DEACTIVATED => {
                let state = if event.event_type == WEB_KEY_ACTIVATED {
                    "active"
                } else {
                    "inactive"
                };
                sqlx::query(
                    r#"
                    UPDATE web_keys_projection
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
            }
            WEB_KEY_REMOVED => {
                sqlx::query("DELETE FROM web_keys_projection WHERE instance_id = $1 AND id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .execute(&mut **tx)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

//! SMTP and SMS configuration read models

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::notify::{
    SmsChangedPayload, SmsHttpAddedPayload, SmsTwilioAddedPayload, SmtpAddedPayload,
    SmtpChangedPayload, SMS_ACTIVATED, SMS_CHANGED, SMS_DEACTIVATED, SMS_HTTP_ADDED, SMS_REMOVED,
    SMS_TWILIO_ADDED, SMTP_ACTIVATED, SMTP_ADDED, SMTP_CHANGED, SMTP_DEACTIVATED, SMTP_REMOVED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct SmtpConfigProjection;

#[async_trait]
impl Projection for SmtpConfigProjection {
    fn name(&self) -> &'static str {
        "smtp_configs"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            SMTP_ADDED,
            SMTP_CHANGED,
            SMTP_ACTIVATED,
            SMTP_DEACTIVATED,
            SMTP_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            SMTP_ADDED => {
                let payload: SmtpAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO smtp_configs_projection
                        (id, instance_id, resource_owner, description, state, sender_address,
                         sender_name, reply_to_address, host, smtp_user, tls, change_date, position)
                    VALUES ($1, $2, $3, $4, 'inactive', $5, $6, $7, $8, $9, $10, $11, $12)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET description = EXCLUDED.description,
                        sender_address = EXCLUDED.sender_address,
                        host = EXCLUDED.host,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.description)
                .bind(&payload.sender_address)
                .bind(&payload.sender_name)
                .bind(&payload.reply_to_address)
                .bind(&payload.host)
                .bind(&payload.user)
                .bind(payload.tls)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SMTP_CHANGED => {
                let payload: SmtpChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE smtp_configs_projection
                    SET description = COALESCE($3, description),
                        sender_address = COALESCE($4, sender_address),
                        sender_name = COALESCE($5, sender_name),
                        reply_to_address = COALESCE($6, reply_to_address),
                        host = COALESCE($7, host),
                        smtp_user = COALESCE($8, smtp_user),
                        tls = COALESCE($9, tls),
                        change_date = $10,
                        position = $11
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.description)
                .bind(&payload.sender_address)
                .bind(&payload.sender_name)
                .bind(&payload.reply_to_address)
                .bind(&payload.host)
                .bind(&payload.user)
                .bind(payload.tls)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SMTP_ACTIVATED | SMTP_DEACTIVATED => {
                let state = if event.event_type == SMTP_ACTIVATED {
                    "active"
                } else {
                    "inactive"
                };
                sqlx::query(
                    r#"
                    UPDATE smtp_configs_projection
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
            SMTP_REMOVED => {
                sqlx::query(
                    "DELETE FROM smtp_configs_projection WHERE instance_id = $1 AND id = $2",
                )
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

pub struct SmsConfigProjection;

#[async_trait]
impl Projection for SmsConfigProjection {
    fn name(&self) -> &'static str {
        "sms_configs"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            SMS_TWILIO_ADDED,
            SMS_HTTP_ADDED,
            SMS_CHANGED,
            SMS_ACTIVATED,
            SMS_DEACTIVATED,
            SMS_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            SMS_TWILIO_ADDED => {
                let payload: SmsTwilioAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO sms_configs_projection
                        (id, instance_id, resource_owner, description, state, provider, config,
                         change_date, position)
                    VALUES ($1, $2, $3, $4, 'inactive', 'twilio', $5, $6, $7)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET config = EXCLUDED.config,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.description)
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SMS_HTTP_ADDED => {
                let payload: SmsHttpAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO sms_configs_projection
                        (id, instance_id, resource_owner, description, state, provider, config,
                         change_date, position)
                    VALUES ($1, $2, $3, $4, 'inactive', 'http', $5, $6, $7)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET config = EXCLUDED.config,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.description)
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SMS_CHANGED => {
                let payload: SmsChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE sms_configs_projection
                    SET description = COALESCE($3, description),
                        config = config || $4,
                        change_date = $5,
                        position = $6
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.description)
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            SMS_ACTIVATED | SMS_DEACTIVATED => {
                let state = if event.event_type == SMS_ACTIVATED {
                    "active"
                } else {
                    "inactive"
                };
                sqlx::query(
                    r#"
                    UPDATE sms_configs_projection
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
            SMS_REMOVED => {
                sqlx::query(
                    "DELETE FROM sms_configs_projection WHERE instance_id = $1 AND id = $2",
                )
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

//! User read model
//!
//! Maintains `users_projection` and `user_auth_methods_projection`.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::user::{
    EmailChangedPayload, HumanAddedPayload, MachineAddedPayload, PhoneChangedPayload,
    ProfileChangedPayload, UsernameChangedPayload, WebAuthnTokenAddedPayload,
    WebAuthnTokenRemovedPayload, WebAuthnTokenVerifiedPayload, EMAIL_CHANGED, EMAIL_VERIFIED,
    HUMAN_ADDED, MACHINE_ADDED, OTP_EMAIL_ADDED, OTP_EMAIL_REMOVED, OTP_SMS_ADDED,
    OTP_SMS_REMOVED, PASSWORD_CHANGED, PASSWORDLESS_TOKEN_ADDED, PASSWORDLESS_TOKEN_REMOVED,
    PASSWORDLESS_TOKEN_VERIFIED, PHONE_CHANGED, PHONE_REMOVED, PHONE_VERIFIED, PROFILE_CHANGED,
    TOTP_ADDED, TOTP_REMOVED, TOTP_VERIFIED, U2F_TOKEN_ADDED, U2F_TOKEN_REMOVED,
    U2F_TOKEN_VERIFIED, USERNAME_CHANGED, USER_DEACTIVATED, USER_LOCKED, USER_REACTIVATED,
    USER_REMOVED, USER_UNLOCKED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct UserProjection;

impl UserProjection {
    async fn set_state(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        state: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users_projection
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

    async fn upsert_auth_method(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        method_type: &str,
        token_id: &str,
        state: &str,
        name: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_auth_methods_projection
                (instance_id, user_id, method_type, token_id, state, name, change_date, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (instance_id, user_id, method_type, token_id) DO UPDATE
            SET state = EXCLUDED.state,
                name = COALESCE(EXCLUDED.name, user_auth_methods_projection.name),
                change_date = EXCLUDED.change_date,
                position = EXCLUDED.position
            "#,
        )
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(method_type)
        .bind(token_id)
        .bind(state)
        .bind(name)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_auth_method(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        method_type: &str,
        token_id: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM user_auth_methods_projection
            WHERE instance_id = $1 AND user_id = $2 AND method_type = $3 AND token_id = $4
            "#,
        )
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(method_type)
        .bind(token_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Projection for UserProjection {
    fn name(&self) -> &'static str {
        "users"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            HUMAN_ADDED,
            MACHINE_ADDED,
            USERNAME_CHANGED,
            PROFILE_CHANGED,
            EMAIL_CHANGED,
            EMAIL_VERIFIED,
            PHONE_CHANGED,
            PHONE_VERIFIED,
            PHONE_REMOVED,
            PASSWORD_CHANGED,
            USER_LOCKED,
            USER_UNLOCKED,
            USER_DEACTIVATED,
            USER_REACTIVATED,
            USER_REMOVED,
            TOTP_ADDED,
            TOTP_VERIFIED,
            TOTP_REMOVED,
            OTP_SMS_ADDED,
            OTP_SMS_REMOVED,
            OTP_EMAIL_ADDED,
            OTP_EMAIL_REMOVED,
            U2F_TOKEN_ADDED,
            U2F_TOKEN_VERIFIED,
            U2F_TOKEN_REMOVED,
            PASSWORDLESS_TOKEN_ADDED,
            PASSWORDLESS_TOKEN_VERIFIED,
            PASSWORDLESS_TOKEN_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            HUMAN_ADDED => {
                let payload: HumanAddedPayload = event.payload_as()?;
                let state = if payload.password_hash.is_some() {
                    "active"
                } else {
                    "initial"
                };
                sqlx::query(
                    r#"
                    INSERT INTO users_projection
                        (id, instance_id, resource_owner, user_type, state, username,
                         first_name, last_name, display_name, preferred_language,
                         email, email_verified, phone, phone_verified,
                         creation_date, change_date, position)
                    VALUES ($1, $2, $3, 'human', $4, $5, $6, $7, $8, $9, $10, FALSE, $11, FALSE, $12, $12, $13)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET state = EXCLUDED.state,
                        username = EXCLUDED.username,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(state)
                .bind(&payload.username)
                .bind(&payload.profile.first_name)
                .bind(&payload.profile.last_name)
                .bind(&payload.profile.display_name)
                .bind(&payload.profile.preferred_language)
                .bind(&payload.email)
                .bind(&payload.phone)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            MACHINE_ADDED => {
                let payload: MachineAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO users_projection
                        (id, instance_id, resource_owner, user_type, state, username,
                         machine_name, machine_description, creation_date, change_date, position)
                    VALUES ($1, $2, $3, 'machine', 'active', $4, $5, $6, $7, $7, $8)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET username = EXCLUDED.username,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.username)
                .bind(&payload.name)
                .bind(&payload.description)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            USERNAME_CHANGED => {
                let payload: UsernameChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET username = $3, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.username)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            PROFILE_CHANGED => {
                let payload: ProfileChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET first_name = COALESCE($3, first_name),
                        last_name = COALESCE($4, last_name),
                        display_name = COALESCE($5, display_name),
                        preferred_language = COALESCE($6, preferred_language),
                        change_date = $7,
                        position = $8
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.first_name)
                .bind(&payload.last_name)
                .bind(&payload.display_name)
                .bind(&payload.preferred_language)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            EMAIL_CHANGED => {
                let payload: EmailChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET email = $3, email_verified = FALSE, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.email)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            EMAIL_VERIFIED => {
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET email_verified = TRUE, change_date = $3, position = $4
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
            PHONE_CHANGED => {
                let payload: PhoneChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET phone = $3, phone_verified = FALSE, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.phone)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            PHONE_VERIFIED => {
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET phone_verified = TRUE, change_date = $3, position = $4
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
            PHONE_REMOVED => {
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET phone = NULL, phone_verified = FALSE, change_date = $3, position = $4
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
                Self::delete_auth_method(tx, event, "otp_sms", "").await?;
            }
            PASSWORD_CHANGED => {
                sqlx::query(
                    r#"
                    UPDATE users_projection
                    SET state = CASE WHEN state = 'initial' THEN 'active' ELSE state END,
                        change_date = $3,
                        position = $4
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
            USER_LOCKED => Self::set_state(tx, event, "locked").await?,
            USER_UNLOCKED | USER_REACTIVATED => Self::set_state(tx, event, "active").await?,
            USER_DEACTIVATED => Self::set_state(tx, event, "inactive").await?,
            USER_REMOVED => {
                sqlx::query("DELETE FROM users_projection WHERE instance_id = $1 AND id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query(
                    "DELETE FROM user_auth_methods_projection WHERE instance_id = $1 AND user_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            TOTP_ADDED => {
                Self::upsert_auth_method(tx, event, "totp", "", "not_ready", None).await?
            }
            TOTP_VERIFIED => {
                Self::upsert_auth_method(tx, event, "totp", "", "ready", None).await?
            }
            TOTP_REMOVED => Self::delete_auth_method(tx, event, "totp", "").await?,
            OTP_SMS_ADDED => {
                Self::upsert_auth_method(tx, event, "otp_sms", "", "ready", None).await?
            }
            OTP_SMS_REMOVED => Self::delete_auth_method(tx, event, "otp_sms", "").await?,
            OTP_EMAIL_ADDED => {
                Self::upsert_auth_method(tx, event, "otp_email", "", "ready", None).await?
            }
            OTP_EMAIL_REMOVED => Self::delete_auth_method(tx, event, "otp_email", "").await?,
            U2F_TOKEN_ADDED => {
                let payload: WebAuthnTokenAddedPayload = event.payload_as()?;
                Self::upsert_auth_method(
                    tx,
                    event,
                    "u2f",
                    &payload.token_id,
                    "not_ready",
                    payload.name.as_deref(),
                )
                .await?;
            }
            U2F_TOKEN_VERIFIED => {
                let payload: WebAuthnTokenVerifiedPayload = event.payload_as()?;
                Self::upsert_auth_method(
                    tx,
                    event,
                    "u2f",
                    &payload.token_id,
                    "ready",
                    payload.name.as_deref(),
                )
                .await?;
            }
            U2F_TOKEN_REMOVED => {
                let payload: WebAuthnTokenRemovedPayload = event.payload_as()?;
                Self::delete_auth_method(tx, event, "u2f", &payload.token_id).await?;
            }
            PASSWORDLESS_TOKEN_ADDED => {
                let payload: WebAuthnTokenAddedPayload = event.payload_as()?;
                Self::upsert_auth_method(
                    tx,
                    event,
                    "passwordless",
                    &payload.token_id,
                    "not_ready",
                    payload.name.as_deref(),
                )
                .await?;
            }
            PASSWORDLESS_TOKEN_VERIFIED => {
                let payload: WebAuthnTokenVerifiedPayload = event.payload_as()?;
                Self::upsert_auth_method(
                    tx,
                    event,
                    "passwordless",
                    &payload.token_id,
                    "ready",
                    payload.name.as_deref(),
                )
                .await?;
            }
            PASSWORDLESS_TOKEN_REMOVED => {
                let payload: WebAuthnTokenRemovedPayload = event.payload_as()?;
                Self::delete_auth_method(tx, event, "passwordless", &payload.token_id).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

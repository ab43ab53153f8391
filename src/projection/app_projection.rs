//! Application read model
//!
//! Maintains `apps_projection` plus the per-type config tables
//! (`apps_oidc_configs`, `apps_api_configs`, `apps_saml_configs`).

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::project::{
    ApiAppAddedPayload, ApiConfigChangedPayload, AppRefPayload, OidcAppAddedPayload,
    OidcConfigChangedPayload, SamlAppAddedPayload, SamlConfigChangedPayload, APP_API_ADDED,
    APP_API_CONFIG_CHANGED, APP_DEACTIVATED, APP_OIDC_ADDED, APP_OIDC_CONFIG_CHANGED,
    APP_REACTIVATED, APP_REMOVED, APP_SAML_ADDED, APP_SAML_CONFIG_CHANGED, PROJECT_REMOVED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct AppProjection;

impl AppProjection {
    async fn insert_app(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        app_id: &str,
        name: &str,
        app_type: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO apps_projection
                (id, instance_id, project_id, name, state, app_type, resource_owner,
                 creation_date, change_date, position)
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $7, $8)
            ON CONFLICT (instance_id, id) DO UPDATE
            SET name = EXCLUDED.name,
                state = EXCLUDED.state,
                change_date = EXCLUDED.change_date,
                position = EXCLUDED.position
            "#,
        )
        .bind(app_id)
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(name)
        .bind(app_type)
        .bind(&event.resource_owner)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_state(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        app_id: &str,
        state: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE apps_projection
            SET state = $3, change_date = $4, position = $5
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(&event.instance_id)
        .bind(app_id)
        .bind(state)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_app(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        app_id: &str,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM apps_projection WHERE instance_id = $1 AND id = $2")
            .bind(&event.instance_id)
            .bind(app_id)
            .execute(&mut **tx)
            .await?;
        for table in ["apps_oidc_configs", "apps_api_configs", "apps_saml_configs"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE instance_id = $1 AND app_id = $2"
            ))
            .bind(&event.instance_id)
            .bind(app_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for AppProjection {
    fn name(&self) -> &'static str {
        "apps"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            APP_OIDC_ADDED,
            APP_OIDC_CONFIG_CHANGED,
            APP_API_ADDED,
            APP_API_CONFIG_CHANGED,
            APP_SAML_ADDED,
            APP_SAML_CONFIG_CHANGED,
            APP_DEACTIVATED,
            APP_REACTIVATED,
            APP_REMOVED,
            PROJECT_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            APP_OIDC_ADDED => {
                let payload: OidcAppAddedPayload = event.payload_as()?;
                Self::insert_app(tx, event, &payload.app_id, &payload.name, "oidc").await?;
                sqlx::query(
                    r#"
                    INSERT INTO apps_oidc_configs
                        (instance_id, app_id, client_id, redirect_uris, response_types,
                         grant_types, oidc_app_type, auth_method, post_logout_redirect_uris, dev_mode)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (instance_id, app_id) DO UPDATE
                    SET client_id = EXCLUDED.client_id,
                        redirect_uris = EXCLUDED.redirect_uris,
                        response_types = EXCLUDED.response_types,
                        grant_types = EXCLUDED.grant_types,
                        oidc_app_type = EXCLUDED.oidc_app_type,
                        auth_method = EXCLUDED.auth_method,
                        post_logout_redirect_uris = EXCLUDED.post_logout_redirect_uris,
                        dev_mode = EXCLUDED.dev_mode
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(&payload.config.client_id)
                .bind(&payload.config.redirect_uris)
                .bind(&payload.config.response_types)
                .bind(&payload.config.grant_types)
                .bind(payload.config.app_type.as_str())
                .bind(payload.config.auth_method.as_str())
                .bind(&payload.config.post_logout_redirect_uris)
                .bind(payload.config.dev_mode)
                .execute(&mut **tx)
                .await?;
            }
            APP_OIDC_CONFIG_CHANGED => {
                let payload: OidcConfigChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE apps_oidc_configs
                    SET redirect_uris = COALESCE($3, redirect_uris),
                        response_types = COALESCE($4, response_types),
                        grant_types = COALESCE($5, grant_types),
                        oidc_app_type = COALESCE($6, oidc_app_type),
                        auth_method = COALESCE($7, auth_method),
                        post_logout_redirect_uris = COALESCE($8, post_logout_redirect_uris),
                        dev_mode = COALESCE($9, dev_mode)
                    WHERE instance_id = $1 AND app_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(&payload.redirect_uris)
                .bind(&payload.response_types)
                .bind(&payload.grant_types)
                .bind(payload.app_type.map(|t| t.as_str()))
                .bind(payload.auth_method.map(|m| m.as_str()))
                .bind(&payload.post_logout_redirect_uris)
                .bind(payload.dev_mode)
                .execute(&mut **tx)
                .await?;
                sqlx::query(
                    r#"
                    UPDATE apps_projection SET change_date = $3, position = $4
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            APP_API_ADDED => {
                let payload: ApiAppAddedPayload = event.payload_as()?;
                Self::insert_app(tx, event, &payload.app_id, &payload.name, "api").await?;
                sqlx::query(
                    r#"
                    INSERT INTO apps_api_configs (instance_id, app_id, client_id, auth_method)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (instance_id, app_id) DO UPDATE
                    SET client_id = EXCLUDED.client_id,
                        auth_method = EXCLUDED.auth_method
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(&payload.config.client_id)
                .bind(payload.config.auth_method.as_str())
                .execute(&mut **tx)
                .await?;
            }
            APP_API_CONFIG_CHANGED => {
                let payload: ApiConfigChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE apps_api_configs
                    SET auth_method = COALESCE($3, auth_method)
                    WHERE instance_id = $1 AND app_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(payload.auth_method.map(|m| m.as_str()))
                .execute(&mut **tx)
                .await?;
            }
            APP_SAML_ADDED => {
                let payload: SamlAppAddedPayload = event.payload_as()?;
                Self::insert_app(tx, event, &payload.app_id, &payload.name, "saml").await?;
                sqlx::query(
                    r#"
                    INSERT INTO apps_saml_configs (instance_id, app_id, entity_id, metadata, metadata_url)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (instance_id, app_id) DO UPDATE
                    SET entity_id = EXCLUDED.entity_id,
                        metadata = EXCLUDED.metadata,
                        metadata_url = EXCLUDED.metadata_url
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(&payload.config.entity_id)
                .bind(&payload.config.metadata)
                .bind(&payload.config.metadata_url)
                .execute(&mut **tx)
                .await?;
            }
            APP_SAML_CONFIG_CHANGED => {
                let payload: SamlConfigChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE apps_saml_configs
                    SET entity_id = COALESCE($3, entity_id),
                        metadata = COALESCE($4, metadata),
                        metadata_url = COALESCE($5, metadata_url)
                    WHERE instance_id = $1 AND app_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.app_id)
                .bind(&payload.entity_id)
                .bind(&payload.metadata)
                .bind(&payload.metadata_url)
                .execute(&mut **tx)
                .await?;
            }
            APP_DEACTIVATED => {
                let payload: AppRefPayload = event.payload_as()?;
                Self::set_state(tx, event, &payload.app_id, "inactive").await?;
            }
            APP_REACTIVATED => {
                let payload: AppRefPayload = event.payload_as()?;
                Self::set_state(tx, event, &payload.app_id, "active").await?;
            }
            APP_REMOVED => {
                let payload: AppRefPayload = event.payload_as()?;
                Self::delete_app(tx, event, &payload.app_id).await?;
            }
            PROJECT_REMOVED => {
                let app_ids: Vec<String> = sqlx::query_scalar(
                    "SELECT id FROM apps_projection WHERE instance_id = $1 AND project_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .fetch_all(&mut **tx)
                .await?;
                for app_id in app_ids {
                    Self::delete_app(tx, event, &app_id).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

//! Application reads, including the client ID and entity ID lookups.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppRow {
    pub id: String,
    pub instance_id: String,
    pub project_id: String,
    pub name: String,
    pub state: String,
    pub app_type: String,
    pub resource_owner: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OidcConfigRow {
    pub app_id: String,
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    pub response_types: Vec<String>,
    pub grant_types: Vec<String>,
    pub oidc_app_type: String,
    pub auth_method: String,
    pub post_logout_redirect_uris: Vec<String>,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiConfigRow {
    pub app_id: String,
    pub client_id: String,
    pub auth_method: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SamlConfigRow {
    pub app_id: String,
    pub entity_id: String,
    pub metadata: Option<String>,
    pub metadata_url: Option<String>,
}

const APP_COLUMNS: &str = "id, instance_id, project_id, name, state, app_type, \
     resource_owner, creation_date, change_date, position";

impl Queries {
    pub async fn app_by_id(&self, instance_id: &str, app_id: &str) -> AppResult<Option<AppRow>> {
        let app = sqlx::query_as(&format!(
            "SELECT {APP_COLUMNS} FROM apps_projection WHERE instance_id = $1 AND id = $2"
        ))
        .bind(instance_id)
        .bind(app_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(app)
    }

    pub async fn apps_by_project(
        &self,
        instance_id: &str,
        project_id: &str,
    ) -> AppResult<Vec<AppRow>> {
        let apps = sqlx::query_as(&format!(
            "SELECT {APP_COLUMNS} FROM apps_projection \
             WHERE instance_id = $1 AND project_id = $2 ORDER BY name"
        ))
        .bind(instance_id)
        .bind(project_id)
        .fetch_all(self.pool())
        .await?;
        Ok(apps)
    }

    /// App row + OIDC config by client ID. Both tables belong to the apps
    /// projection, so the join stays inside one projection's tables.
    pub async fn oidc_app_by_client_id(
        &self,
        instance_id: &str,
        client_id: &str,
    ) -> AppResult<Option<(AppRow, OidcConfigRow)>> {
        let row: Option<AppRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.instance_id, a.project_id, a.name, a.state, a.app_type,
                   a.resource_owner, a.creation_date, a.change_date, a.position
            FROM apps_projection a
            JOIN apps_oidc_configs c ON c.instance_id = a.instance_id AND c.app_id = a.id
            WHERE a.instance_id = $1 AND c.client_id = $2
            "#,
        )
        .bind(instance_id)
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(app) = row else { return Ok(None) };
        let config = self.oidc_config(instance_id, &app.id).await?;
        Ok(config.map(|config| (app, config)))
    }

    pub async fn oidc_config(
        &self,
        instance_id: &str,
        app_id: &str,
    ) -> AppResult<Option<OidcConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT app_id, client_id, redirect_uris, response_types, grant_types,
                   oidc_app_type, auth_method, post_logout_redirect_uris, dev_mode
            FROM apps_oidc_configs
            WHERE instance_id = $1 AND app_id = $2
            "#,
        )
        .bind(instance_id)
        .bind(app_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }

    pub async fn api_app_by_client_id(
        &self,
        instance_id: &str,
        client_id: &str,
    ) -> AppResult<Option<ApiConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT app_id, client_id, auth_method
            FROM apps_api_configs
            WHERE instance_id = $1 AND client_id = $2
            "#,
        )
        .bind(instance_id)
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }

    pub async fn saml_app_by_entity_id(
        &self,
        instance_id: &str,
        entity_id: &str,
    ) -> AppResult<Option<SamlConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT app_id, entity_id, metadata, metadata_url
            FROM apps_saml_configs
            WHERE instance_id = $1 AND entity_id = $2
            "#,
        )
        .bind(instance_id)
        .bind(entity_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }
}

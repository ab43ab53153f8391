//! Database module
//!
//! Database connection and migration utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Build the connection pool from configuration
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Run database migrations
/// Note: We use raw SQL files in migrations/ directory
/// This function can be used to verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "instances",
        "events",
        "event_positions",
        "unique_constraints",
        "projection_states",
        "orgs_projection",
        "org_domains_projection",
        "users_projection",
        "user_auth_methods_projection",
        "projects_projection",
        "project_roles_projection",
        "project_grants_projection",
        "members_projection",
        "apps_projection",
        "apps_oidc_configs",
        "apps_api_configs",
        "apps_saml_configs",
        "sessions_projection",
        "idps_projection",
        "smtp_configs_projection",
        "sms_configs_projection",
        "actions_projection",
        "executions_projection",
        "policies_projection",
        "web_keys_projection",
        "encryption_keys",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

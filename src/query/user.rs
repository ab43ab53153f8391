//! User reads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub instance_id: String,
    pub resource_owner: String,
    pub user_type: String,
    pub state: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub machine_name: Option<String>,
    pub machine_description: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthMethodRow {
    pub user_id: String,
    pub method_type: String,
    pub token_id: String,
    pub state: String,
    pub name: Option<String>,
}

const USER_COLUMNS: &str = "id, instance_id, resource_owner, user_type, state, username, \
     first_name, last_name, display_name, preferred_language, \
     email, email_verified, phone, phone_verified, \
     machine_name, machine_description, creation_date, change_date, position";

impl Queries {
    pub async fn user_by_id(&self, instance_id: &str, user_id: &str) -> AppResult<Option<UserRow>> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users_projection WHERE instance_id = $1 AND id = $2"
        ))
        .bind(instance_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    /// Username lookup within one org.
    pub async fn user_by_login_name(
        &self,
        instance_id: &str,
        org_id: &str,
        username: &str,
    ) -> AppResult<Option<UserRow>> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users_projection \
             WHERE instance_id = $1 AND resource_owner = $2 AND username = $3"
        ))
        .bind(instance_id)
        .bind(org_id)
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    pub async fn users_by_org(&self, instance_id: &str, org_id: &str) -> AppResult<Vec<UserRow>> {
        let users = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users_projection \
             WHERE instance_id = $1 AND resource_owner = $2 ORDER BY username"
        ))
        .bind(instance_id)
        .bind(org_id)
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    /// Ready and pending auth methods of one user.
    pub async fn auth_methods_by_user(
        &self,
        instance_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<AuthMethodRow>> {
        let methods = sqlx::query_as(
            r#"
            SELECT user_id, method_type, token_id, state, name
            FROM user_auth_methods_projection
            WHERE instance_id = $1 AND user_id = $2
            ORDER BY method_type, token_id
            "#,
        )
        .bind(instance_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(methods)
    }
}

//! Session reads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub instance_id: String,
    pub user_id: Option<String>,
    pub resource_owner: String,
    pub state: String,
    pub client_id: Option<String>,
    pub token_id: Option<String>,
    pub amr: Vec<String>,
    pub auth_time: Option<DateTime<Utc>>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub factors: serde_json::Value,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Decimal,
}

const SESSION_COLUMNS: &str = "id, instance_id, user_id, resource_owner, state, client_id, \
     token_id, amr, auth_time, code_challenge, code_challenge_method, factors, \
     creation_date, change_date, position";

impl Queries {
    pub async fn session_by_id(
        &self,
        instance_id: &str,
        session_id: &str,
    ) -> AppResult<Option<SessionRow>> {
        let session = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions_projection \
             WHERE instance_id = $1 AND id = $2"
        ))
        .bind(instance_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(session)
    }

    pub async fn sessions_by_user(
        &self,
        instance_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<SessionRow>> {
        let sessions = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions_projection \
             WHERE instance_id = $1 AND user_id = $2 ORDER BY creation_date"
        ))
        .bind(instance_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(sessions)
    }

    pub async fn active_session_count(
        &self,
        instance_id: &str,
        user_id: &str,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions_projection
            WHERE instance_id = $1 AND user_id = $2 AND state = 'active'
            "#,
        )
        .bind(instance_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

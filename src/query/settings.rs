//! Settings reads: policies, IDPs, notification configs, actions,
//! executions and web keys.

use chrono::{DateTime, Utc};

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PolicyRow {
    pub resource_owner: String,
    pub policy_kind: String,
    pub is_default: bool,
    pub payload: serde_json::Value,
    pub change_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdpRow {
    pub id: String,
    pub resource_owner: String,
    pub name: String,
    pub idp_type: String,
    pub state: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SmtpConfigRow {
    pub id: String,
    pub description: Option<String>,
    pub state: String,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub reply_to_address: Option<String>,
    pub host: String,
    pub smtp_user: Option<String>,
    pub tls: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SmsConfigRow {
    pub id: String,
    pub description: Option<String>,
    pub state: String,
    pub provider: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionRow {
    pub id: String,
    pub name: String,
    pub script: String,
    pub timeout_secs: i64,
    pub allowed_to_fail: bool,
    pub state: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExecutionRow {
    pub condition: String,
    pub targets: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebKeyRow {
    pub id: String,
    pub state: String,
    pub config: serde_json::Value,
}

impl Queries {
    /// Effective policy: org override when present, instance default
    /// otherwise.
    pub async fn effective_policy(
        &self,
        instance_id: &str,
        org_id: &str,
        policy_kind: &str,
    ) -> AppResult<Option<PolicyRow>> {
        let policy = sqlx::query_as(
            r#"
            SELECT resource_owner, policy_kind, is_default, payload, change_date
            FROM policies_projection
            WHERE instance_id = $1 AND policy_kind = $2 AND resource_owner IN ($3, $1)
            ORDER BY is_default ASC
            LIMIT 1
            "#,
        )
        .bind(instance_id)
        .bind(policy_kind)
        .bind(org_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(policy)
    }

    pub async fn idp_by_id(&self, instance_id: &str, idp_id: &str) -> AppResult<Option<IdpRow>> {
        let idp = sqlx::query_as(
            r#"
            SELECT id, resource_owner, name, idp_type, state, config
            FROM idps_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(idp_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(idp)
    }

    pub async fn active_smtp_config(&self, instance_id: &str) -> AppResult<Option<SmtpConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT id, description, state, sender_address, sender_name, reply_to_address,
                   host, smtp_user, tls
            FROM smtp_configs_projection
            WHERE instance_id = $1 AND state = 'active'
            "#,
        )
        .bind(instance_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }

    pub async fn smtp_config_by_id(
        &self,
        instance_id: &str,
        config_id: &str,
    ) -> AppResult<Option<SmtpConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT id, description, state, sender_address, sender_name, reply_to_address,
                   host, smtp_user, tls
            FROM smtp_configs_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(config_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }

    pub async fn active_sms_config(&self, instance_id: &str) -> AppResult<Option<SmsConfigRow>> {
        let config = sqlx::query_as(
            r#"
            SELECT id, description, state, provider, config
            FROM sms_configs_projection
            WHERE instance_id = $1 AND state = 'active'
            "#,
        )
        .bind(instance_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(config)
    }

    pub async fn action_by_id(
        &self,
        instance_id: &str,
        action_id: &str,
    ) -> AppResult<Option<ActionRow>> {
        let action = sqlx::query_as(
            r#"
            SELECT id, name, script, timeout_secs, allowed_to_fail, state
            FROM actions_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(action_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(action)
    }

    pub async fn execution_by_condition(
        &self,
        instance_id: &str,
        condition: &str,
    ) -> AppResult<Option<ExecutionRow>> {
        let execution = sqlx::query_as(
            r#"
            SELECT condition, targets
            FROM executions_projection
            WHERE instance_id = $1 AND condition = $2
            "#,
        )
        .bind(instance_id)
        .bind(condition)
        .fetch_optional(self.pool())
        .await?;
        Ok(execution)
    }

    pub async fn web_keys_by_state(
        &self,
        instance_id: &str,
        state: &str,
    ) -> AppResult<Vec<WebKeyRow>> {
        let keys = sqlx::query_as(
            r#"
            SELECT id, state, config
            FROM web_keys_projection
            WHERE instance_id = $1 AND state = $2
            ORDER BY id
            "#,
        )
        .bind(instance_id)
        .bind(state)
        .fetch_all(self.pool())
        .await?;
        Ok(keys)
    }
}

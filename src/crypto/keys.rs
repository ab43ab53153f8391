//! Encryption key repository
//!
//! Keys are written once under a unique identifier and read back by the
//! components that need them. No event stream is involved.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppResult, Error};

/// Stored key record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EncryptionKey {
    pub instance_id: String,
    pub identifier: String,
    pub key_data: String,
    pub created_at: DateTime<Utc>,
}

/// Repository over the `encryption_keys` table.
#[derive(Debug, Clone)]
pub struct EncryptionKeys {
    pool: PgPool,
}

impl EncryptionKeys {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a key; identifiers are unique per instance.
    pub async fn add(
        &self,
        instance_id: &str,
        identifier: &str,
        key_data: &str,
    ) -> AppResult<()> {
        if identifier.trim().is_empty() {
            return Err(Error::invalid_argument(
                "KEY-003",
                "key identifier must not be empty",
            ));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO encryption_keys (instance_id, identifier, key_data)
            VALUES ($1, $2, $3)
            ON CONFLICT (instance_id, identifier) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(identifier)
        .bind(key_data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::already_exists(
                "KEY-001",
                format!("key already exists: {identifier}"),
            ));
        }
        Ok(())
    }

    pub async fn get(&self, instance_id: &str, identifier: &str) -> AppResult<EncryptionKey> {
        let key: Option<EncryptionKey> = sqlx::query_as(
            r#"
            SELECT instance_id, identifier, key_data, created_at
            FROM encryption_keys
            WHERE instance_id = $1 AND identifier = $2
            "#,
        )
        .bind(instance_id)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        key.ok_or_else(|| Error::not_found("KEY-002", format!("key not found: {identifier}")))
    }

    pub async fn list(&self, instance_id: &str) -> AppResult<Vec<EncryptionKey>> {
        let keys = sqlx::query_as(
            r#"
            SELECT instance_id, identifier, key_data, created_at
            FROM encryption_keys
            WHERE instance_id = $1
            ORDER BY identifier
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    pub async fn remove(&self, instance_id: &str, identifier: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM encryption_keys
            WHERE instance_id = $1 AND identifier = $2
            "#,
        )
        .bind(instance_id)
        .bind(identifier)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(
                "KEY-002",
                format!("key not found: {identifier}"),
            ));
        }
        Ok(())
    }
}

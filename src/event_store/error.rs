//! Event Store Errors
//!
//! Error types for event store operations.

use crate::error::Error;

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    /// Unknown tenant
    #[error("Unknown instance: {0}")]
    TenantMissing(String),

    /// A unique constraint attached to a command already exists
    #[error("Unique constraint violated: {message}")]
    UniqueViolation {
        code: &'static str,
        message: String,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Maximum retries exceeded
    #[error("Maximum retries exceeded for push")]
    MaxRetriesExceeded,
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::Database(_)
        )
    }
}

impl From<EventStoreError> for Error {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict { .. } => {
                Error::concurrency_conflict("STORE-010", err.to_string())
            }
            EventStoreError::TenantMissing(instance) => {
                Error::not_found("INSTANCE-001", format!("unknown instance: {instance}"))
            }
            EventStoreError::UniqueViolation { code, message } => {
                Error::already_exists(code, message)
            }
            EventStoreError::Database(e) => e.into(),
            EventStoreError::Serialization(e) => e.into(),
            EventStoreError::MaxRetriesExceeded => {
                Error::concurrency_conflict("STORE-011", "push retries exhausted")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_store_error_is_retryable() {
        let conflict = EventStoreError::ConcurrencyConflict {
            aggregate_type: "org".to_string(),
            aggregate_id: "o1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert!(conflict.is_concurrency_conflict());

        let missing = EventStoreError::TenantMissing("i1".to_string());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_taxonomy_mapping() {
        let err: Error = EventStoreError::UniqueViolation {
            code: "APP-OIDC-002",
            message: "client id already taken".to_string(),
        }
        .into();
        assert_eq!(err.kind, crate::error::ErrorKind::AlreadyExists);
        assert_eq!(err.code, "APP-OIDC-002");
    }
}

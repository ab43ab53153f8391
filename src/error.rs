//! Error handling module
//!
//! Centralized error taxonomy surfaced to callers. Every error carries a
//! stable domain code (e.g. `ORG-001`, `PHONE-so0wa`) alongside the kind.

use std::fmt;

/// Application-wide Result type
pub type AppResult<T> = Result<T, Error>;

/// Error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unauthenticated,
    PermissionDenied,
    /// Optimistic-concurrency failure; retried by the command engine.
    ConcurrencyConflict,
    /// Transient storage failure; retryable by the caller.
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy error: kind + stable domain code + human readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({code}): {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn already_exists(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, code, message)
    }

    pub fn failed_precondition(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, code, message)
    }

    pub fn unauthenticated(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, code, message)
    }

    pub fn permission_denied(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, code, message)
    }

    pub fn concurrency_conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrencyConflict, code, message)
    }

    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, code, message)
    }

    pub fn deadline_exceeded(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, code, message)
    }

    /// True for the optimistic-locking failure the command engine retries.
    pub fn is_concurrency_conflict(&self) -> bool {
        self.kind == ErrorKind::ConcurrencyConflict
    }

    /// True when the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ConcurrencyConflict | ErrorKind::Unavailable
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::unavailable("STORE-001", format!("storage unavailable: {err}"))
            }
            sqlx::Error::RowNotFound => Error::not_found("STORE-002", "row not found"),
            _ => Error::internal("STORE-003", format!("database error: {err}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal("EVENT-001", format!("corrupted event payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_code() {
        let err = Error::invalid_argument("ORG-001", "org name must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid_argument (ORG-001): org name must not be empty"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(Error::concurrency_conflict("STORE-010", "version mismatch").is_retryable());
        assert!(Error::unavailable("STORE-001", "down").is_retryable());
        assert!(!Error::not_found("ORG-002", "org not found").is_retryable());
        assert!(Error::concurrency_conflict("STORE-010", "x").is_concurrency_conflict());
        assert!(!Error::internal("X-001", "x").is_concurrency_conflict());
    }
}

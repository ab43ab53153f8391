//! Verification codes
//!
//! Codes are never stored in clear text: events carry a SHA-256 digest
//! plus the expiry window; the plaintext goes to the notifier only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::{AppResult, Error};

pub fn code_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issued verification code as embedded in `…code.added` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub digest: String,
    pub lifetime_secs: u64,
    pub issued_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn issue(code: &str, lifetime: Duration, now: DateTime<Utc>) -> Self {
        Self {
            digest: code_digest(code),
            lifetime_secs: lifetime.as_secs(),
            issued_at: now,
        }
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.issued_at + chrono::Duration::seconds(self.lifetime_secs as i64);
        now > deadline
    }

    /// Compare a provided code against this issued one.
    pub fn verify(&self, provided: &str, now: DateTime<Utc>) -> AppResult<()> {
        if self.expired(now) {
            return Err(Error::failed_precondition(
                "CODE-001",
                "verification code expired",
            ));
        }
        if code_digest(provided) != self.digest {
            return Err(Error::invalid_argument(
                "CODE-002",
                "verification code is invalid",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(code_digest("123456"), code_digest("123456"));
        assert_ne!(code_digest("123456"), code_digest("654321"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let now = Utc::now();
        let code = VerificationCode::issue("123456", Duration::from_secs(3600), now);
        assert!(code.verify("123456", now).is_ok());

        let err = code.verify("000000", now).unwrap_err();
        assert_eq!(err.code, "CODE-002");
    }

    #[test]
    fn test_expiry() {
        let issued = Utc::now();
        let code = VerificationCode::issue("123456", Duration::from_secs(60), issued);
        let later = issued + chrono::Duration::seconds(61);
        assert!(code.expired(later));
        let err = code.verify("123456", later).unwrap_err();
        assert_eq!(err.code, "CODE-001");
    }
}

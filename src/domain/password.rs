//! Password policies
//!
//! Complexity, age and lockout rules. The structs double as the policy
//! event payloads; the check functions are pure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, Error};

/// Password complexity requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicy {
    pub min_length: u32,
    pub has_lowercase: bool,
    pub has_uppercase: bool,
    pub has_number: bool,
    pub has_symbol: bool,
}

impl Default for PasswordComplexityPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            has_lowercase: true,
            has_uppercase: true,
            has_number: true,
            has_symbol: false,
        }
    }
}

impl PasswordComplexityPolicy {
    /// Check a candidate password against the policy.
    pub fn check(&self, password: &str) -> AppResult<()> {
        if (password.chars().count() as u32) < self.min_length {
            return Err(Error::invalid_argument(
                "PASSWORD-002",
                format!("password must be at least {} characters", self.min_length),
            ));
        }
        if self.has_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err(Error::invalid_argument(
                "PASSWORD-002",
                "password must contain a lowercase character",
            ));
        }
        if self.has_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(Error::invalid_argument(
                "PASSWORD-002",
                "password must contain an uppercase character",
            ));
        }
        if self.has_number && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_argument(
                "PASSWORD-002",
                "password must contain a number",
            ));
        }
        if self.has_symbol && password.chars().all(|c| c.is_alphanumeric()) {
            return Err(Error::invalid_argument(
                "PASSWORD-002",
                "password must contain a symbol",
            ));
        }
        Ok(())
    }
}

/// Password expiry windows. Zero means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordAgePolicy {
    pub max_age_days: u32,
    pub expire_warn_days: u32,
}

impl PasswordAgePolicy {
    pub fn expired(&self, changed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.max_age_days == 0 {
            return false;
        }
        now - changed_at > chrono::Duration::days(i64::from(self.max_age_days))
    }
}

/// Lockout thresholds. Zero means unlimited attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordLockoutPolicy {
    pub max_password_attempts: u32,
    pub max_otp_attempts: u32,
    pub show_lockout_failure: bool,
}

impl Default for PasswordLockoutPolicy {
    fn default() -> Self {
        Self {
            max_password_attempts: 0,
            max_otp_attempts: 0,
            show_lockout_failure: true,
        }
    }
}

impl PasswordLockoutPolicy {
    pub fn password_locked(&self, failed_attempts: u32) -> bool {
        self.max_password_attempts != 0 && failed_attempts >= self.max_password_attempts
    }

    pub fn otp_locked(&self, failed_attempts: u32) -> bool {
        self.max_otp_attempts != 0 && failed_attempts >= self.max_otp_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_default() {
        let policy = PasswordComplexityPolicy::default();
        assert!(policy.check("Secret42").is_ok());
        assert!(policy.check("short1A").is_err());
        assert!(policy.check("nouppercase1").is_err());
        assert!(policy.check("NOLOWERCASE1").is_err());
        assert!(policy.check("NoNumberHere").is_err());
    }

    #[test]
    fn test_complexity_symbol_requirement() {
        let policy = PasswordComplexityPolicy {
            has_symbol: true,
            ..Default::default()
        };
        assert!(policy.check("Secret42!").is_ok());
        assert!(policy.check("Secret423").is_err());
    }

    #[test]
    fn test_age_policy() {
        let policy = PasswordAgePolicy {
            max_age_days: 30,
            expire_warn_days: 5,
        };
        let now = Utc::now();
        assert!(!policy.expired(now - chrono::Duration::days(10), now));
        assert!(policy.expired(now - chrono::Duration::days(31), now));

        let unlimited = PasswordAgePolicy::default();
        assert!(!unlimited.expired(now - chrono::Duration::days(10_000), now));
    }

    #[test]
    fn test_lockout_policy() {
        let policy = PasswordLockoutPolicy {
            max_password_attempts: 3,
            max_otp_attempts: 0,
            show_lockout_failure: true,
        };
        assert!(!policy.password_locked(2));
        assert!(policy.password_locked(3));
        assert!(!policy.otp_locked(100));
    }
}

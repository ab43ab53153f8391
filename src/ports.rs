//! Injected capabilities
//!
//! Ports the core consumes but does not implement in depth: clocks, ID
//! generation, password hashing, phone normalization, domain verification
//! probes, code generation and outbound notification. Production adapters
//! live outside the core; the defaults here are good enough for the worker
//! binary and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AppResult, Error};

/// Wall clock. Tests may override.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Globally unique, roughly time-ordered string IDs.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Opaque password hashing. Input is capped at 72 bytes by the caller.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AppResult<String>;
    fn verify(&self, password: &str, hash: &str) -> AppResult<bool>;
}

/// Phone normalization to E.164.
pub trait PhoneNormalizer: Send + Sync {
    fn normalize(&self, raw: &str, default_region: &str) -> AppResult<String>;
}

/// Domain ownership probes. Network failures read as `false`.
#[async_trait]
pub trait DomainProbe: Send + Sync {
    async fn verify_http(&self, domain: &str, token: &str) -> bool;
    async fn verify_dns(&self, domain: &str, token: &str) -> bool;
}

/// Cryptographically random verification codes.
pub trait CodeGenerator: Send + Sync {
    /// 6-digit decimal OTP.
    fn otp6(&self) -> String;
    /// 32-character alphanumeric verification token.
    fn token32(&self) -> String;
    /// Check a TOTP code against the enrolled secret. The default is a
    /// deterministic stand-in; production injects an RFC 6238 adapter.
    fn verify_totp(&self, secret: &str, code: &str) -> bool {
        derived_totp(secret) == code
    }
}

/// Deterministic 6-digit code derived from a secret. Stand-in for the
/// external TOTP adapter; also used by tests to produce matching codes.
pub fn derived_totp(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let num = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 1_000_000;
    format!("{num:06}")
}

/// Outbound delivery. Best effort: failures never roll back the command
/// that emitted the code.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str);
    async fn send_sms(&self, to: &str, body: &str);
}

// ---------------------------------------------------------------------------
// Default implementations
// ---------------------------------------------------------------------------

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time-prefixed random IDs: millisecond timestamp in hex followed by a
/// CSPRNG suffix, so IDs sort roughly by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut suffix = [0u8; 5];
        rand::rngs::OsRng.fill_bytes(&mut suffix);
        format!("{millis:011x}{}", hex::encode(suffix))
    }
}

/// Salted SHA-256 hasher. A stand-in for the external bcrypt adapter;
/// sufficient for the worker binary and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> AppResult<String> {
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let digest = salted_digest(&salt, password);
        Ok(format!("{}${}", hex::encode(salt), digest))
    }

    fn verify(&self, password: &str, hash: &str) -> AppResult<bool> {
        let (salt_hex, digest) = hash
            .split_once('$')
            .ok_or_else(|| Error::internal("PASSWORD-001", "malformed password hash"))?;
        let salt = hex::decode(salt_hex)
            .map_err(|_| Error::internal("PASSWORD-001", "malformed password hash"))?;
        Ok(salted_digest(&salt, password) == digest)
    }
}

fn salted_digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// CSPRNG-backed code generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

impl CodeGenerator for RandomCodeGenerator {
    fn otp6(&self) -> String {
        let mut rng = rand::rngs::OsRng;
        (0..6)
            .map(|_| {
                let digit = rng.next_u32() % 10;
                char::from(b'0' + digit as u8)
            })
            .collect()
    }

    fn token32(&self) -> String {
        let mut rng = rand::rngs::OsRng;
        (0..32)
            .map(|_| {
                let idx = (rng.next_u32() as usize) % TOKEN_ALPHABET.len();
                char::from(TOKEN_ALPHABET[idx])
            })
            .collect()
    }
}

/// Discards every notification; delivery adapters are wired in by the
/// embedding service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) {
        tracing::debug!(to, subject, "email notification dropped (noop notifier)");
    }

    async fn send_sms(&self, to: &str, _body: &str) {
        tracing::debug!(to, "sms notification dropped (noop notifier)");
    }
}

/// Probe that never verifies; real HTTP/DNS probes are injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyingDomainProbe;

#[async_trait]
impl DomainProbe for DenyingDomainProbe {
    async fn verify_http(&self, _domain: &str, _token: &str) -> bool {
        false
    }

    async fn verify_dns(&self, _domain: &str, _token: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp6_format() {
        let gen = RandomCodeGenerator;
        for _ in 0..32 {
            let code = gen.otp6();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_token32_format() {
        let gen = RandomCodeGenerator;
        let token = gen.token32();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hasher = Sha256PasswordHasher;
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_id_generator_unique_and_ordered_prefix() {
        let gen = RandomIdGenerator;
        let a = gen.next_id();
        let b = gen.next_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 21);
    }
}

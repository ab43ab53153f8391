//! Input format validation
//!
//! Fail-fast checks run before any I/O. Each helper returns the taxonomy
//! error with a stable domain code.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppResult, Error};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("email regex")
});

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").expect("domain regex")
});

static ROLE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("role key regex"));

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex color regex"));

static VERIFICATION_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{16,64}$").expect("token regex"));

static OTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("otp regex"));

/// Trim and lowercase; idempotent.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if email.is_empty() || !EMAIL_RE.is_match(email) {
        return Err(Error::invalid_argument(
            "EMAIL-001",
            format!("invalid email address: {email}"),
        ));
    }
    Ok(())
}

/// Trim, lowercase, strip one trailing dot; idempotent.
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}

pub fn validate_domain_name(domain: &str) -> AppResult<()> {
    if domain.is_empty() || domain.len() > 253 || !DOMAIN_RE.is_match(domain) {
        return Err(Error::invalid_argument(
            "ORG-DOMAIN-001",
            format!("invalid domain name: {domain}"),
        ));
    }
    Ok(())
}

pub fn validate_role_key(key: &str) -> AppResult<()> {
    if !ROLE_KEY_RE.is_match(key) {
        return Err(Error::invalid_argument(
            "PROJECT-ROLE-001",
            format!("role key must match ^[A-Z][A-Z0-9_]*$: {key}"),
        ));
    }
    Ok(())
}

pub fn validate_hex_color(color: &str) -> AppResult<()> {
    if !HEX_COLOR_RE.is_match(color) {
        return Err(Error::invalid_argument(
            "POLICY-LABEL-001",
            format!("invalid hex color: {color}"),
        ));
    }
    Ok(())
}

/// http(s) URL with a non-empty host.
pub fn validate_url(url: &str) -> AppResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    let valid = matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'));
    if !valid {
        return Err(Error::invalid_argument(
            "URL-001",
            format!("invalid url: {url}"),
        ));
    }
    Ok(())
}

/// Domain verification tokens: 16..64 alphanumerics.
pub fn validate_verification_token(token: &str) -> AppResult<()> {
    if !VERIFICATION_TOKEN_RE.is_match(token) {
        return Err(Error::invalid_argument(
            "CODE-003",
            "invalid verification token format",
        ));
    }
    Ok(())
}

/// One-time passwords: 6 decimal digits.
pub fn validate_otp(code: &str) -> AppResult<()> {
    if !OTP_RE.is_match(code) {
        return Err(Error::invalid_argument("CODE-004", "invalid otp format"));
    }
    Ok(())
}

pub fn require_non_empty(value: &str, code: &'static str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_argument(
            code,
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

pub fn require_max_len(value: &str, max: usize, code: &'static str, field: &str) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(Error::invalid_argument(
            code,
            format!("{field} must be at most {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("x@-bad.com").is_err());
    }

    #[test]
    fn test_email_normalization_idempotent() {
        let once = normalize_email("  Alice@Example.COM ");
        assert_eq!(once, "alice@example.com");
        assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn test_domain_validation() {
        assert!(validate_domain_name("example.com").is_ok());
        assert!(validate_domain_name("sub.deep.example.io").is_ok());
        assert!(validate_domain_name("localhost").is_err());
        assert!(validate_domain_name("-bad.com").is_err());
        assert!(validate_domain_name("").is_err());
    }

    #[test]
    fn test_domain_normalization_idempotent() {
        let once = normalize_domain(" Example.COM. ");
        assert_eq!(once, "example.com");
        assert_eq!(normalize_domain(&once), once);
    }

    #[test]
    fn test_role_key() {
        assert!(validate_role_key("ADMIN").is_ok());
        assert!(validate_role_key("VIEWER_2").is_ok());
        assert!(validate_role_key("admin").is_err());
        assert!(validate_role_key("2ADMIN").is_err());
        assert!(validate_role_key("").is_err());
    }

    #[test]
    fn test_hex_color() {
        assert!(validate_hex_color("#fff").is_ok());
        assert!(validate_hex_color("#1A2B3C").is_ok());
        assert!(validate_hex_color("fff").is_err());
        assert!(validate_hex_color("#12345").is_err());
    }

    #[test]
    fn test_url() {
        assert!(validate_url("https://x/cb").is_ok());
        assert!(validate_url("http://localhost:8080/cb").is_ok());
        assert!(validate_url("ftp://x").is_err());
        assert!(validate_url("https://").is_err());
    }

    #[test]
    fn test_code_formats() {
        assert!(validate_verification_token("A1b2C3d4E5f6G7h8").is_ok());
        assert!(validate_verification_token("short").is_err());
        assert!(validate_otp("123456").is_ok());
        assert!(validate_otp("12345").is_err());
        assert!(validate_otp("abcdef").is_err());
    }
}

//! PKCE validation
//!
//! OAuth proof-key-for-code-exchange: codeChallenge and
//! codeChallengeMethod come as a pair or not at all.

use crate::error::{AppResult, Error};

const METHODS: &[&str] = &["S256", "plain"];

pub fn validate_pkce(code_challenge: Option<&str>, method: Option<&str>) -> AppResult<()> {
    match (code_challenge, method) {
        (None, None) => Ok(()),
        (Some(challenge), Some(method)) => {
            if challenge.is_empty() {
                return Err(Error::invalid_argument(
                    "SESSION-004",
                    "codeChallenge must not be empty",
                ));
            }
            if !METHODS.contains(&method) {
                return Err(Error::invalid_argument(
                    "SESSION-005",
                    format!("unsupported codeChallengeMethod: {method}"),
                ));
            }
            Ok(())
        }
        (Some(_), None) => Err(Error::invalid_argument(
            "SESSION-004",
            "codeChallengeMethod required with codeChallenge",
        )),
        (None, Some(_)) => Err(Error::invalid_argument(
            "SESSION-004",
            "codeChallenge required with codeChallengeMethod",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_or_nothing() {
        assert!(validate_pkce(None, None).is_ok());
        assert!(validate_pkce(Some("x"), Some("S256")).is_ok());
        assert!(validate_pkce(Some("x"), Some("plain")).is_ok());

        let err = validate_pkce(Some("x"), None).unwrap_err();
        assert!(err.message.contains("codeChallengeMethod required"));

        let err = validate_pkce(None, Some("S256")).unwrap_err();
        assert!(err.message.contains("codeChallenge required"));
    }

    #[test]
    fn test_method_bounds() {
        assert!(validate_pkce(Some("x"), Some("md5")).is_err());
        assert!(validate_pkce(Some(""), Some("S256")).is_err());
    }
}

//! Phone normalization
//!
//! Default `PhoneNormalizer` implementation over a small region table.
//! Production deployments inject a full libphonenumber-backed adapter;
//! the contract is the same: E.164 out, idempotent on normalized input.

use crate::error::{AppResult, Error};
use crate::ports::PhoneNormalizer;

/// ISO 3166-1 alpha-2 region to calling code.
const REGION_CODES: &[(&str, &str)] = &[
    ("AT", "43"),
    ("CH", "41"),
    ("DE", "49"),
    ("ES", "34"),
    ("FR", "33"),
    ("GB", "44"),
    ("IT", "39"),
    ("NL", "31"),
    ("US", "1"),
];

/// Table-driven normalizer to E.164.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionPhoneNormalizer;

impl RegionPhoneNormalizer {
    fn calling_code(region: &str) -> AppResult<&'static str> {
        REGION_CODES
            .iter()
            .find(|(r, _)| *r == region.to_uppercase())
            .map(|(_, code)| *code)
            .ok_or_else(|| {
                Error::invalid_argument("PHONE-so0wa", format!("unknown phone region: {region}"))
            })
    }
}

impl PhoneNormalizer for RegionPhoneNormalizer {
    fn normalize(&self, raw: &str, default_region: &str) -> AppResult<String> {
        let mut cleaned = String::with_capacity(raw.len());
        let mut leading_plus = false;
        for (i, c) in raw.trim().chars().enumerate() {
            match c {
                '+' if i == 0 => leading_plus = true,
                '0'..='9' => cleaned.push(c),
                ' ' | '-' | '.' | '/' | '(' | ')' => {}
                _ => {
                    return Err(Error::invalid_argument(
                        "PHONE-so0wa",
                        format!("invalid phone number: {raw}"),
                    ))
                }
            }
        }

        let digits = if leading_plus {
            cleaned
        } else if let Some(rest) = cleaned.strip_prefix("00") {
            rest.to_string()
        } else if let Some(rest) = cleaned.strip_prefix('0') {
            format!("{}{}", Self::calling_code(default_region)?, rest)
        } else if cleaned.is_empty() {
            String::new()
        } else {
            format!("{}{}", Self::calling_code(default_region)?, cleaned)
        };

        if digits.len() < 7 || digits.len() > 15 {
            return Err(Error::invalid_argument(
                "PHONE-so0wa",
                format!("invalid phone number: {raw}"),
            ));
        }

        Ok(format!("+{digits}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swiss_local_number() {
        let normalizer = RegionPhoneNormalizer;
        assert_eq!(
            normalizer.normalize("044 668 18 00", "CH").unwrap(),
            "+41446681800"
        );
    }

    #[test]
    fn test_already_normalized_is_idempotent() {
        let normalizer = RegionPhoneNormalizer;
        let once = normalizer.normalize("+41446681800", "CH").unwrap();
        assert_eq!(once, "+41446681800");
        assert_eq!(normalizer.normalize(&once, "CH").unwrap(), once);
    }

    #[test]
    fn test_international_prefix() {
        let normalizer = RegionPhoneNormalizer;
        assert_eq!(
            normalizer.normalize("0049 170 1234567", "CH").unwrap(),
            "+491701234567"
        );
    }

    #[test]
    fn test_invalid_number() {
        let normalizer = RegionPhoneNormalizer;
        let err = normalizer.normalize("invalid", "CH").unwrap_err();
        assert_eq!(err.code, "PHONE-so0wa");

        let err = normalizer.normalize("123", "CH").unwrap_err();
        assert_eq!(err.code, "PHONE-so0wa");
    }

    #[test]
    fn test_unknown_region() {
        let normalizer = RegionPhoneNormalizer;
        assert!(normalizer.normalize("044 668 18 00", "ZZ").is_err());
    }
}

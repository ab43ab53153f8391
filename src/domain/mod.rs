//! Domain services
//!
//! Pure helpers used by commands: format validation, password rules,
//! verification codes, PKCE and phone normalization. No I/O.

pub mod codes;
pub mod password;
pub mod phone;
pub mod pkce;
pub mod validation;

pub use codes::{code_digest, VerificationCode};
pub use password::{PasswordAgePolicy, PasswordComplexityPolicy, PasswordLockoutPolicy};
pub use phone::RegionPhoneNormalizer;
pub use pkce::validate_pkce;

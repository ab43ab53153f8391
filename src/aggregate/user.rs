//! User aggregate
//!
//! Human and machine users share one aggregate; the human-only sub-state
//! (profile, email, phone, password, auth factors) is an optional record
//! keyed by the creation event.

use serde::{Deserialize, Serialize};

use crate::domain::VerificationCode;
use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const HUMAN_ADDED: &str = "user.human.added";
pub const MACHINE_ADDED: &str = "user.machine.added";
pub const USERNAME_CHANGED: &str = "user.username.changed";
pub const PROFILE_CHANGED: &str = "user.human.profile.changed";
pub const EMAIL_CHANGED: &str = "user.human.email.changed";
pub const EMAIL_CODE_ADDED: &str = "user.human.email.code.added";
pub const EMAIL_VERIFIED: &str = "user.human.email.verified";
pub const EMAIL_CHECK_FAILED: &str = "user.human.email.check.failed";
pub const PHONE_CHANGED: &str = "user.human.phone.changed";
pub const PHONE_CODE_ADDED: &str = "user.human.phone.code.added";
pub const PHONE_VERIFIED: &str = "user.human.phone.verified";
pub const PHONE_CHECK_FAILED: &str = "user.human.phone.check.failed";
pub const PHONE_REMOVED: &str = "user.human.phone.removed";
pub const PASSWORD_CHANGED: &str = "user.human.password.changed";
pub const PASSWORD_CHECK_SUCCEEDED: &str = "user.human.password.check.succeeded";
pub const PASSWORD_CHECK_FAILED: &str = "user.human.password.check.failed";
pub const USER_LOCKED: &str = "user.locked";
pub const USER_UNLOCKED: &str = "user.unlocked";
pub const USER_DEACTIVATED: &str = "user.deactivated";
pub const USER_REACTIVATED: &str = "user.reactivated";
pub const USER_REMOVED: &str = "user.removed";
pub const USER_SESSIONS_TERMINATED: &str = "user.sessions.terminated";

pub const TOTP_ADDED: &str = "user.human.mfa.otp.added";
pub const TOTP_VERIFIED: &str = "user.human.mfa.otp.verified";
pub const TOTP_CHECK_SUCCEEDED: &str = "user.human.mfa.otp.check.succeeded";
pub const TOTP_CHECK_FAILED: &str = "user.human.mfa.otp.check.failed";
pub const TOTP_REMOVED: &str = "user.human.mfa.otp.removed";
pub const OTP_SMS_ADDED: &str = "user.human.otp.sms.added";
pub const OTP_SMS_REMOVED: &str = "user.human.otp.sms.removed";
pub const OTP_SMS_CODE_ADDED: &str = "user.human.otp.sms.code.added";
pub const OTP_SMS_CHECK_SUCCEEDED: &str = "user.human.otp.sms.check.succeeded";
pub const OTP_SMS_CHECK_FAILED: &str = "user.human.otp.sms.check.failed";
pub const OTP_EMAIL_ADDED: &str = "user.human.otp.email.added";
pub const OTP_EMAIL_REMOVED: &str = "user.human.otp.email.removed";
pub const OTP_EMAIL_CODE_ADDED: &str = "user.human.otp.email.code.added";
pub const OTP_EMAIL_CHECK_SUCCEEDED: &str = "user.human.otp.email.check.succeeded";
pub const OTP_EMAIL_CHECK_FAILED: &str = "user.human.otp.email.check.failed";
pub const U2F_TOKEN_ADDED: &str = "user.human.mfa.u2f.token.added";
pub const U2F_TOKEN_VERIFIED: &str = "user.human.mfa.u2f.token.verified";
pub const U2F_TOKEN_REMOVED: &str = "user.human.mfa.u2f.token.removed";
pub const PASSWORDLESS_TOKEN_ADDED: &str = "user.human.passwordless.token.added";
pub const PASSWORDLESS_TOKEN_VERIFIED: &str = "user.human.passwordless.token.verified";
pub const PASSWORDLESS_TOKEN_REMOVED: &str = "user.human.passwordless.token.removed";

/// User status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    /// Human created without credentials; leaves Initial on first password.
    Initial,
    Inactive,
    Locked,
    Deleted,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Unspecified => "unspecified",
            UserState::Active => "active",
            UserState::Initial => "initial",
            UserState::Inactive => "inactive",
            UserState::Locked => "locked",
            UserState::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

/// WebAuthn credential (U2F or passwordless).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebAuthnToken {
    pub token_id: String,
    pub name: Option<String>,
    pub verified: bool,
}

/// Human-only sub-state.
#[derive(Debug, Clone, Default)]
pub struct HumanState {
    pub profile: HumanProfile,
    pub email: String,
    pub email_verified: bool,
    pub pending_email: Option<String>,
    pub pending_email_code: Option<VerificationCode>,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub pending_phone: Option<String>,
    pub pending_phone_code: Option<VerificationCode>,
    pub password_hash: Option<String>,
    pub password_check_failures: u32,
    pub totp_secret: Option<String>,
    pub totp_verified: bool,
    pub otp_sms_enabled: bool,
    pub otp_email_enabled: bool,
    pub pending_otp_sms_code: Option<VerificationCode>,
    pub pending_otp_email_code: Option<VerificationCode>,
    pub otp_check_failures: u32,
    pub u2f_tokens: Vec<WebAuthnToken>,
    pub passwordless_tokens: Vec<WebAuthnToken>,
}

#[derive(Debug, Clone, Default)]
pub struct MachineState {
    pub name: String,
    pub description: String,
}

/// User write model.
#[derive(Debug, Clone, Default)]
pub struct User {
    stream: StreamInfo,
    pub state: UserState,
    pub username: String,
    pub human: Option<HumanState>,
    pub machine: Option<MachineState>,
}

impl User {
    pub fn is_human(&self) -> bool {
        self.human.is_some()
    }

    pub fn is_machine(&self) -> bool {
        self.machine.is_some()
    }

    pub fn human(&self) -> Option<&HumanState> {
        self.human.as_ref()
    }

    fn human_mut(&mut self) -> Option<&mut HumanState> {
        self.human.as_mut()
    }
}

fn token_mut<'a>(tokens: &'a mut Vec<WebAuthnToken>, token_id: &str) -> Option<&'a mut WebAuthnToken> {
    tokens.iter_mut().find(|t| t.token_id == token_id)
}

impl Aggregate for User {
    fn aggregate_type() -> &'static str {
        "user"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            HUMAN_ADDED => {
                let payload: HumanAddedPayload = event.payload_as()?;
                self.username = payload.username;
                self.state = if payload.password_hash.is_some() {
                    UserState::Active
                } else {
                    UserState::Initial
                };
                self.human = Some(HumanState {
                    profile: payload.profile,
                    email: payload.email,
                    phone: payload.phone,
                    password_hash: payload.password_hash,
                    ..Default::default()
                });
            }
            MACHINE_ADDED => {
                let payload: MachineAddedPayload = event.payload_as()?;
                self.username = payload.username;
                self.state = UserState::Active;
                self.machine = Some(MachineState {
                    name: payload.name,
                    description: payload.description.unwrap_or_default(),
                });
            }
            USERNAME_CHANGED => {
                let payload: UsernameChangedPayload = event.payload_as()?;
                self.username = payload.username;
            }
            PROFILE_CHANGED => {
                let payload: ProfileChangedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    if let Some(first_name) = payload.first_name {
                        human.profile.first_name = first_name;
                    }
                    if let Some(last_name) = payload.last_name {
                        human.profile.last_name = last_name;
                    }
                    if let Some(display_name) = payload.display_name {
                        human.profile.display_name = Some(display_name);
                    }
                    if let Some(language) = payload.preferred_language {
                        human.profile.preferred_language = Some(language);
                    }
                }
            }
            EMAIL_CHANGED => {
                let payload: EmailChangedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.email = payload.email;
                    human.email_verified = false;
                    human.pending_email_code = None;
                }
            }
            EMAIL_CODE_ADDED => {
                let payload: CodeAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.pending_email_code = Some(payload.code);
                }
            }
            EMAIL_VERIFIED => {
                if let Some(human) = self.human_mut() {
                    human.email_verified = true;
                    human.pending_email_code = None;
                }
            }
            EMAIL_CHECK_FAILED => {}
            PHONE_CHANGED => {
                let payload: PhoneChangedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.phone = Some(payload.phone);
                    human.phone_verified = false;
                    human.pending_phone_code = None;
                }
            }
            PHONE_CODE_ADDED => {
                let payload: CodeAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.pending_phone_code = Some(payload.code);
                }
            }
            PHONE_VERIFIED => {
                if let Some(human) = self.human_mut() {
                    human.phone_verified = true;
                    human.pending_phone_code = None;
                }
            }
            PHONE_CHECK_FAILED => {}
            PHONE_REMOVED => {
                if let Some(human) = self.human_mut() {
                    human.phone = None;
                    human.phone_verified = false;
                    human.pending_phone_code = None;
                    human.otp_sms_enabled = false;
                }
            }
            PASSWORD_CHANGED => {
                let payload: PasswordChangedPayload = event.payload_as()?;
                if self.state == UserState::Initial {
                    self.state = UserState::Active;
                }
                if let Some(human) = self.human_mut() {
                    human.password_hash = Some(payload.hash);
                    human.password_check_failures = 0;
                }
            }
            PASSWORD_CHECK_SUCCEEDED => {
                if let Some(human) = self.human_mut() {
                    human.password_check_failures = 0;
                }
            }
            PASSWORD_CHECK_FAILED => {
                if let Some(human) = self.human_mut() {
                    human.password_check_failures += 1;
                }
            }
            USER_LOCKED => self.state = UserState::Locked,
            USER_UNLOCKED | USER_REACTIVATED => self.state = UserState::Active,
            USER_DEACTIVATED => self.state = UserState::Inactive,
            USER_REMOVED => self.state = UserState::Deleted,
            USER_SESSIONS_TERMINATED => {}
            TOTP_ADDED => {
                let payload: TotpAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.totp_secret = Some(payload.secret);
                    human.totp_verified = false;
                }
            }
            TOTP_VERIFIED => {
                if let Some(human) = self.human_mut() {
                    human.totp_verified = true;
                }
            }
            TOTP_CHECK_SUCCEEDED | OTP_SMS_CHECK_SUCCEEDED | OTP_EMAIL_CHECK_SUCCEEDED => {
                if let Some(human) = self.human_mut() {
                    human.otp_check_failures = 0;
                    human.pending_otp_sms_code = None;
                    human.pending_otp_email_code = None;
                }
            }
            TOTP_CHECK_FAILED | OTP_SMS_CHECK_FAILED | OTP_EMAIL_CHECK_FAILED => {
                if let Some(human) = self.human_mut() {
                    human.otp_check_failures += 1;
                }
            }
            TOTP_REMOVED => {
                if let Some(human) = self.human_mut() {
                    human.totp_secret = None;
                    human.totp_verified = false;
                }
            }
            OTP_SMS_ADDED => {
                if let Some(human) = self.human_mut() {
                    human.otp_sms_enabled = true;
                }
            }
            OTP_SMS_REMOVED => {
                if let Some(human) = self.human_mut() {
                    human.otp_sms_enabled = false;
                    human.pending_otp_sms_code = None;
                }
            }
            OTP_SMS_CODE_ADDED => {
                let payload: CodeAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.pending_otp_sms_code = Some(payload.code);
                }
            }
            OTP_EMAIL_ADDED => {
                if let Some(human) = self.human_mut() {
                    human.otp_email_enabled = true;
                }
            }
            OTP_EMAIL_REMOVED => {
                if let Some(human) = self.human_mut() {
                    human.otp_email_enabled = false;
                    human.pending_otp_email_code = None;
                }
            }
            OTP_EMAIL_CODE_ADDED => {
                let payload: CodeAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.pending_otp_email_code = Some(payload.code);
                }
            }
            U2F_TOKEN_ADDED => {
                let payload: WebAuthnTokenAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.u2f_tokens.push(WebAuthnToken {
                        token_id: payload.token_id,
                        name: payload.name,
                        verified: false,
                    });
                }
            }
            U2F_TOKEN_VERIFIED => {
                let payload: WebAuthnTokenVerifiedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    if let Some(token) = token_mut(&mut human.u2f_tokens, &payload.token_id) {
                        token.verified = true;
                        if payload.name.is_some() {
                            token.name = payload.name;
                        }
                    }
                }
            }
            U2F_TOKEN_REMOVED => {
                let payload: WebAuthnTokenRemovedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.u2f_tokens.retain(|t| t.token_id != payload.token_id);
                }
            }
            PASSWORDLESS_TOKEN_ADDED => {
                let payload: WebAuthnTokenAddedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human.passwordless_tokens.push(WebAuthnToken {
                        token_id: payload.token_id,
                        name: payload.name,
                        verified: false,
                    });
                }
            }
            PASSWORDLESS_TOKEN_VERIFIED => {
                let payload: WebAuthnTokenVerifiedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    if let Some(token) = token_mut(&mut human.passwordless_tokens, &payload.token_id)
                    {
                        token.verified = true;
                        if payload.name.is_some() {
                            token.name = payload.name;
                        }
                    }
                }
            }
            PASSWORDLESS_TOKEN_REMOVED => {
                let payload: WebAuthnTokenRemovedPayload = event.payload_as()?;
                if let Some(human) = self.human_mut() {
                    human
                        .passwordless_tokens
                        .retain(|t| t.token_id != payload.token_id);
                }
            }
            _ => {}
        }

        self.stream.track(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanAddedPayload {
    pub username: String,
    #[serde(flatten)]
    pub profile: HumanProfile,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineAddedPayload {
    pub username: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameChangedPayload {
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

impl ProfileChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.display_name.is_none()
            && self.preferred_language.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChangedPayload {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneChangedPayload {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChangedPayload {
    pub hash: String,
}

/// Shared payload for every `…code.added` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAddedPayload {
    pub code: VerificationCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpAddedPayload {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAuthnTokenAddedPayload {
    pub token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAuthnTokenVerifiedPayload {
    pub token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAuthnTokenRemovedPayload {
    pub token_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSessionsTerminatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    fn human_added() -> serde_json::Value {
        json!({
            "username": "alice",
            "first_name": "Alice",
            "last_name": "Smith",
            "email": "alice@example.com"
        })
    }

    #[test]
    fn test_human_added_starts_initial_without_password() {
        let events = stream("user", "u1", vec![(HUMAN_ADDED, human_added())]);
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.state, UserState::Initial);
        assert!(user.is_human());
        assert_eq!(user.username, "alice");
        assert_eq!(user.human().unwrap().email, "alice@example.com");
        assert!(!user.human().unwrap().email_verified);
    }

    #[test]
    fn test_password_moves_initial_to_active() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (PASSWORD_CHANGED, json!({"hash": "s$abc"})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.state, UserState::Active);
        assert!(user.human().unwrap().password_hash.is_some());
    }

    #[test]
    fn test_machine_added_is_active() {
        let events = stream(
            "user",
            "m1",
            vec![(
                MACHINE_ADDED,
                json!({"username": "ci-bot", "name": "CI Bot"}),
            )],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.state, UserState::Active);
        assert!(user.is_machine());
    }

    #[test]
    fn test_email_change_resets_verified() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (EMAIL_VERIFIED, json!({})),
                (EMAIL_CHANGED, json!({"email": "new@example.com"})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        let human = user.human().unwrap();
        assert_eq!(human.email, "new@example.com");
        assert!(!human.email_verified);
    }

    #[test]
    fn test_lock_unlock_cycle() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (USER_LOCKED, json!({})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.state, UserState::Locked);

        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (USER_LOCKED, json!({})),
                (USER_UNLOCKED, json!({})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.state, UserState::Active);
    }

    #[test]
    fn test_phone_removed_disables_sms_otp() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (PHONE_CHANGED, json!({"phone": "+41446681800"})),
                (PHONE_VERIFIED, json!({})),
                (OTP_SMS_ADDED, json!({})),
                (PHONE_REMOVED, json!({})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        let human = user.human().unwrap();
        assert!(human.phone.is_none());
        assert!(!human.otp_sms_enabled);
    }

    #[test]
    fn test_u2f_token_lifecycle() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (U2F_TOKEN_ADDED, json!({"token_id": "t1"})),
                (U2F_TOKEN_VERIFIED, json!({"token_id": "t1", "name": "yubikey"})),
                (U2F_TOKEN_ADDED, json!({"token_id": "t2"})),
                (U2F_TOKEN_REMOVED, json!({"token_id": "t2"})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        let human = user.human().unwrap();
        assert_eq!(human.u2f_tokens.len(), 1);
        assert!(human.u2f_tokens[0].verified);
        assert_eq!(human.u2f_tokens[0].name.as_deref(), Some("yubikey"));
    }

    #[test]
    fn test_failed_password_checks_accumulate_and_reset() {
        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (PASSWORD_CHECK_FAILED, json!({})),
                (PASSWORD_CHECK_FAILED, json!({})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.human().unwrap().password_check_failures, 2);

        let events = stream(
            "user",
            "u1",
            vec![
                (HUMAN_ADDED, human_added()),
                (PASSWORD_CHECK_FAILED, json!({})),
                (PASSWORD_CHECK_SUCCEEDED, json!({})),
            ],
        );
        let user: User = reduce(&events).unwrap();
        assert_eq!(user.human().unwrap().password_check_failures, 0);
    }
}

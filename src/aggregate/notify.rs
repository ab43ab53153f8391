//! SMTP and SMS configuration aggregates
//!
//! Notification channels of an instance. Several configs may exist; at
//! most one per channel is active, enforced by the activate command over
//! an instance-wide write model.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const SMTP_ADDED: &str = "org.smtp.config.added";
pub const SMTP_CHANGED: &str = "org.smtp.config.changed";
pub const SMTP_ACTIVATED: &str = "org.smtp.config.activated";
pub const SMTP_DEACTIVATED: &str = "org.smtp.config.deactivated";
pub const SMTP_REMOVED: &str = "org.smtp.config.removed";
pub const SMS_TWILIO_ADDED: &str = "org.sms.config.twilio.added";
pub const SMS_HTTP_ADDED: &str = "org.sms.config.http.added";
pub const SMS_CHANGED: &str = "org.sms.config.changed";
pub const SMS_ACTIVATED: &str = "org.sms.config.activated";
pub const SMS_DEACTIVATED: &str = "org.sms.config.deactivated";
pub const SMS_REMOVED: &str = "org.sms.config.removed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigState {
    #[default]
    Unspecified,
    Inactive,
    Active,
    Removed,
}

impl ConfigState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigState::Unspecified => "unspecified",
            ConfigState::Inactive => "inactive",
            ConfigState::Active => "active",
            ConfigState::Removed => "removed",
        }
    }
}

/// SMTP configuration write model.
#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    stream: StreamInfo,
    pub state: ConfigState,
    pub description: Option<String>,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub reply_to_address: Option<String>,
    pub host: String,
    pub user: Option<String>,
    pub tls: bool,
}

impl SmtpConfig {
    pub fn is_live(&self) -> bool {
        matches!(self.state, ConfigState::Inactive | ConfigState::Active)
    }
}

impl Aggregate for SmtpConfig {
    fn aggregate_type() -> &'static str {
        "smtp_config"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            SMTP_ADDED => {
                let payload: SmtpAddedPayload = event.payload_as()?;
                self.description = payload.description;
                self.sender_address = payload.sender_address;
                self.sender_name = payload.sender_name;
                self.reply_to_address = payload.reply_to_address;
                self.host = payload.host;
                self.user = payload.user;
                self.tls = payload.tls;
                self.state = ConfigState::Inactive;
            }
            SMTP_CHANGED => {
                let payload: SmtpChangedPayload = event.payload_as()?;
                if let Some(description) = payload.description {
                    self.description = Some(description);
                }
                if let Some(sender_address) = payload.sender_address {
                    self.sender_address = sender_address;
                }
                if let Some(sender_name) = payload.sender_name {
                    self.sender_name = Some(sender_name);
                }
                if let Some(reply_to_address) = payload.reply_to_address {
                    self.reply_to_address = Some(reply_to_address);
                }
                if let Some(host) = payload.host {
                    self.host = host;
                }
                if let Some(user) = payload.user {
                    self.user = Some(user);
                }
                if let Some(tls) = payload.tls {
                    self.tls = tls;
                }
            }
            SMTP_ACTIVATED => self.state = ConfigState::Active,
            SMTP_DEACTIVATED => self.state = ConfigState::Inactive,
            SMTP_REMOVED => self.state = ConfigState::Removed,
            _ => {}
        }

        self.stream.track(event);
        Ok(())
    }
}

/// SMS provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SmsProvider {
    Twilio {
        sid: String,
        sender_number: String,
    },
    Http {
        endpoint: String,
    },
}

impl SmsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsProvider::Twilio { .. } => "twilio",
            SmsProvider::Http { .. } => "http",
        }
    }
}

/// SMS configuration write model.
#[derive(Debug, Clone, Default)]
pub struct SmsConfig {
    stream: StreamInfo,
    pub state: ConfigState,
    pub description: Option<String>,
    pub provider: Option<SmsProvider>,
}

impl SmsConfig {
    pub fn is_live(&self) -> bool {
        matches!(self.state, ConfigState::Inactive | ConfigState::Active)
    }
}

impl Aggregate for SmsConfig {
    fn aggregate_type() -> &'static str {
        "sms_config"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            SMS_TWILIO_ADDED => {
                let payload: SmsTwilioAddedPayload = event.payload_as()?;
                self.description = payload.description;
                self.provider = Some(SmsProvider::Twilio {
                    sid: payload.sid,
                    sender_number: payload.sender_number,
                });
                self.state = ConfigState::Inactive;
            }
            SMS_HTTP_ADDED => {
                let payload: SmsHttpAddedPayload = event.payload_as()?;
                self.description = payload.description;
                self.provider = Some(SmsProvider::Http {
                    endpoint: payload.endpoint,
                });
                self.state = ConfigState::Inactive;
            }
            SMS_CHANGED => {
                let payload: SmsChangedPayload = event.payload_as()?;
                if let Some(description) = payload.description {
                    self.description = Some(description);
                }
                match (&mut self.provider, payload.sid, payload.sender_number) {
                    (Some(SmsProvider::Twilio { sid, sender_number }), new_sid, new_number) => {
                        if let Some(new_sid) = new_sid {
                            *sid = new_sid;
                        }
                        if let Some(new_number) = new_number {
                            *sender_number = new_number;
                        }
                    }
                    _ => {}
                }
                if let (Some(SmsProvider::Http { endpoint }), Some(new_endpoint)) =
                    (&mut self.provider, payload.endpoint)
                {
                    *endpoint = new_endpoint;
                }
            }
            SMS_ACTIVATED => self.state = ConfigState::Active,
            SMS_DEACTIVATED => self.state = ConfigState::Inactive,
            SMS_REMOVED => self.state = ConfigState::Removed,
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
pub struct SmtpAddedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sender_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_address: Option<String>,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_tls() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
}

impl SmtpChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.sender_address.is_none()
            && self.sender_name.is_none()
            && self.reply_to_address.is_none()
            && self.host.is_none()
            && self.user.is_none()
            && self.tls.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsTwilioAddedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sid: String,
    pub sender_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsHttpAddedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl SmsChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.sid.is_none()
            && self.sender_number.is_none()
            && self.endpoint.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_smtp_lifecycle() {
        let events = stream(
            "smtp_config",
            "smtp1",
            vec![
                (
                    SMTP_ADDED,
                    json!({"sender_address": "no-reply@acme.com", "host": "smtp.acme.com:587"}),
                ),
                (SMTP_ACTIVATED, json!({})),
            ],
        );

        let config: SmtpConfig = reduce(&events).unwrap();
        assert_eq!(config.state, ConfigState::Active);
        assert!(config.tls);
        assert_eq!(config.sender_address, "no-reply@acme.com");
    }

    #[test]
    fn test_smtp_added_starts_inactive() {
        let events = stream(
            "smtp_config",
            "smtp1",
            vec![(
                SMTP_ADDED,
                json!({"sender_address": "no-reply@acme.com", "host": "smtp.acme.com:587"}),
            )],
        );

        let config: SmtpConfig = reduce(&events).unwrap();
        assert_eq!(config.state, ConfigState::Inactive);
    }

    #[test]
    fn test_sms_twilio_provider() {
        let events = stream(
            "sms_config",
            "sms1",
            vec![
                (
                    SMS_TWILIO_ADDED,
                    json!({"sid": "AC123", "sender_number": "+41790000000"}),
                ),
                (SMS_CHANGED, json!({"sender_number": "+41791111111"})),
                (SMS_ACTIVATED, json!({})),
            ],
        );

        let config: SmsConfig = reduce(&events).unwrap();
        assert_eq!(config.state, ConfigState::Active);
        match config.provider.as_ref().unwrap() {
            SmsProvider::Twilio { sender_number, .. } => {
                assert_eq!(sender_number, "+41791111111");
            }
            other => panic!("expected twilio provider, got {other:?}"),
        }
    }

    #[test]
    fn test_removed_config_is_not_live() {
        let events = stream(
            "sms_config",
            "sms1",
            vec![
                (SMS_HTTP_ADDED, json!({"endpoint": "https://sms-gw/send"})),
                (SMS_REMOVED, json!({})),
            ],
        );

        let config: SmsConfig = reduce(&events).unwrap();
        assert!(!config.is_live());
    }
}

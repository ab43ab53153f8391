//! Web key aggregate
//!
//! Signing-key lifecycle: generated keys start Initial, exactly the state
//! machine matters here. An active key cannot be removed; only the key
//! configuration is stored, material handling lives outside the core.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const WEB_KEY_GENERATED: &str = "web_key.generated";
pub const WEB_KEY_ACTIVATED: &str = "web_key.activated";
pub const WEB_KEY_DEACTIVATED: &str = "web_key.deactivated";
pub const WEB_KEY_REMOVED: &str = "web_key.removed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebKeyState {
    #[default]
    Unspecified,
    Initial,
    Active,
    Inactive,
    Removed,
}

impl WebKeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebKeyState::Unspecified => "unspecified",
            WebKeyState::Initial => "initial",
            WebKeyState::Active => "active",
            WebKeyState::Inactive => "inactive",
            WebKeyState::Removed => "removed",
        }
    }
}

/// Key type and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebKeyConfig {
    Rsa { bits: u32, hasher: String },
    Ecdsa { curve: String },
    Ed25519,
}

/// Web key write model.
#[derive(Debug, Clone, Default)]
pub struct WebKey {
    stream: StreamInfo,
    pub state: WebKeyState,
    pub config: Option<WebKeyConfig>,
}

impl Aggregate for WebKey {
    fn aggregate_type() -> &'static str {
        "web_key"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            WEB_KEY_GENERATED => {
                let payload: WebKeyGeneratedPayload = event.payload_as()?;
                self.config = Some(payload.config);
                self.state = WebKeyState::Initial;
            }
            WEB_KEY_ACTIVATED => self.state = WebKeyState::Active,
            WEB_KEY_DEACTIVATED => self.state = WebKeyState::Inactive,
            WEB_KEY_REMOVED => self.state = WebKeyState::Removed,
            _ => {}
        }

        self.stream.track(event);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebKeyGeneratedPayload {
    #[serde(flatten)]
    pub config: WebKeyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_generated_key_is_initial() {
        let events = stream(
            "web_key",
            "k1",
            vec![(WEB_KEY_GENERATED, json!({"type": "rsa", "bits": 2048, "hasher": "sha256"}))],
        );

        let key: WebKey = reduce(&events).unwrap();
        assert_eq!(key.state, WebKeyState::Initial);
        assert!(matches!(
            key.config,
            Some(WebKeyConfig::Rsa { bits: 2048, .. })
        ));
    }

    #[test]
    fn test_activation_cycle() {
        let events = stream(
            "web_key",
            "k1",
            vec![
                (WEB_KEY_GENERATED, json!({"type": "ed25519"})),
                (WEB_KEY_ACTIVATED, json!({})),
                (WEB_KEY_DEACTIVATED, json!({})),
                (WEB_KEY_REMOVED, json!({})),
            ],
        );

        let key: WebKey = reduce(&events).unwrap();
        assert_eq!(key.state, WebKeyState::Removed);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = WebKeyConfig::Ecdsa {
            curve: "P-256".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "ecdsa");
        let back: WebKeyConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}

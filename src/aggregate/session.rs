//! Session aggregate
//!
//! Classic and OIDC sessions. A session holds at most one verified factor
//! per auth-method type; later checks of the same type replace the earlier
//! one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const SESSION_ADDED: &str = "session.added";
pub const SESSION_OIDC_ADDED: &str = "session.oidc.added";
pub const SESSION_UPDATED: &str = "session.updated";
pub const SESSION_FACTOR_CHECKED: &str = "session.factor.checked";
pub const SESSION_TERMINATED: &str = "session.terminated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unspecified,
    Active,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unspecified => "unspecified",
            SessionState::Active => "active",
            SessionState::Terminated => "terminated",
        }
    }
}

/// One verified factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorCheck {
    pub checked_at: DateTime<Utc>,
}

/// Session write model.
#[derive(Debug, Clone, Default)]
pub struct Session {
    stream: StreamInfo,
    pub state: SessionState,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub token_id: Option<String>,
    pub amr: Vec<String>,
    pub auth_time: Option<DateTime<Utc>>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// factor type -> most recent verified check
    pub factors: BTreeMap<String, FactorCheck>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

impl Aggregate for Session {
    fn aggregate_type() -> &'static str {
        "session"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            SESSION_ADDED => {
                let payload: SessionAddedPayload = event.payload_as()?;
                self.user_id = payload.user_id;
                self.state = SessionState::Active;
            }
            SESSION_OIDC_ADDED => {
                let payload: OidcSessionAddedPayload = event.payload_as()?;
                self.user_id = payload.user_id;
                self.client_id = Some(payload.client_id);
                self.code_challenge = payload.code_challenge;
                self.code_challenge_method = payload.code_challenge_method;
                self.state = SessionState::Active;
            }
            SESSION_UPDATED => {
                let payload: SessionUpdatedPayload = event.payload_as()?;
                if let Some(token_id) = payload.token_id {
                    self.token_id = Some(token_id);
                }
                if let Some(amr) = payload.amr {
                    self.amr = amr;
                }
                if let Some(auth_time) = payload.auth_time {
                    self.auth_time = Some(auth_time);
                }
            }
            SESSION_FACTOR_CHECKED => {
                let payload: FactorCheckedPayload = event.payload_as()?;
                // At most one verified factor per type.
                self.factors.insert(
                    payload.factor_type,
                    FactorCheck {
                        checked_at: payload.checked_at,
                    },
                );
            }
            SESSION_TERMINATED => self.state = SessionState::Terminated,
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
pub struct SessionAddedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcSessionAddedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUpdatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<DateTime<Utc>>,
}

impl SessionUpdatedPayload {
    pub fn is_empty(&self) -> bool {
        self.token_id.is_none() && self.amr.is_none() && self.auth_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorCheckedPayload {
    pub factor_type: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTerminatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_session_lifecycle() {
        let events = stream(
            "session",
            "s1",
            vec![
                (SESSION_ADDED, json!({"user_id": "u1"})),
                (
                    SESSION_UPDATED,
                    json!({"token_id": "t1", "amr": ["pwd", "otp"]}),
                ),
                (SESSION_TERMINATED, json!({})),
            ],
        );

        let session: Session = reduce(&events).unwrap();
        assert_eq!(session.state, SessionState::Terminated);
        assert_eq!(session.user_id.as_deref(), Some("u1"));
        assert_eq!(session.token_id.as_deref(), Some("t1"));
        assert_eq!(session.amr, vec!["pwd", "otp"]);
    }

    #[test]
    fn test_at_most_one_factor_per_type() {
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(60);
        let events = stream(
            "session",
            "s1",
            vec![
                (SESSION_ADDED, json!({"user_id": "u1"})),
                (
                    SESSION_FACTOR_CHECKED,
                    json!({"factor_type": "password", "checked_at": t1}),
                ),
                (
                    SESSION_FACTOR_CHECKED,
                    json!({"factor_type": "password", "checked_at": t2}),
                ),
                (
                    SESSION_FACTOR_CHECKED,
                    json!({"factor_type": "otp", "checked_at": t2}),
                ),
            ],
        );

        let session: Session = reduce(&events).unwrap();
        assert_eq!(session.factors.len(), 2);
        assert_eq!(session.factors["password"].checked_at, t2);
    }

    #[test]
    fn test_oidc_session_carries_pkce() {
        let events = stream(
            "session",
            "s1",
            vec![(
                SESSION_OIDC_ADDED,
                json!({
                    "user_id": "u1",
                    "client_id": "c-42",
                    "code_challenge": "xyz",
                    "code_challenge_method": "S256"
                }),
            )],
        );

        let session: Session = reduce(&events).unwrap();
        assert_eq!(session.client_id.as_deref(), Some("c-42"));
        assert_eq!(session.code_challenge.as_deref(), Some("xyz"));
        assert_eq!(session.code_challenge_method.as_deref(), Some("S256"));
    }
}

//! Organization aggregate
//!
//! Orgs own their domains and members. At most one domain is primary, and
//! only verified domains may become primary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const ORG_ADDED: &str = "org.added";
pub const ORG_CHANGED: &str = "org.changed";
pub const ORG_DEACTIVATED: &str = "org.deactivated";
pub const ORG_REACTIVATED: &str = "org.reactivated";
pub const ORG_REMOVED: &str = "org.removed";
pub const ORG_DOMAIN_ADDED: &str = "org.domain.added";
pub const ORG_DOMAIN_VERIFICATION_ADDED: &str = "org.domain.verification.added";
pub const ORG_DOMAIN_VERIFICATION_FAILED: &str = "org.domain.verification.failed";
pub const ORG_DOMAIN_VERIFIED: &str = "org.domain.verified";
pub const ORG_DOMAIN_PRIMARY_SET: &str = "org.domain.primary.set";
pub const ORG_DOMAIN_REMOVED: &str = "org.domain.removed";
pub const ORG_MEMBER_ADDED: &str = "org.member.added";
pub const ORG_MEMBER_CHANGED: &str = "org.member.changed";
pub const ORG_MEMBER_REMOVED: &str = "org.member.removed";
pub const ORG_SESSIONS_TERMINATED: &str = "org.sessions.terminated";

/// Organization status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl OrgState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgState::Unspecified => "unspecified",
            OrgState::Active => "active",
            OrgState::Inactive => "inactive",
            OrgState::Removed => "removed",
        }
    }
}

/// A domain owned by the org.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgDomain {
    pub name: String,
    pub verified: bool,
    pub primary: bool,
    pub validation_type: Option<String>,
    /// Ownership token awaiting publication; cleared once verified.
    pub pending_token: Option<String>,
}

/// Organization write model.
#[derive(Debug, Clone, Default)]
pub struct Org {
    stream: StreamInfo,
    pub state: OrgState,
    pub name: String,
    pub domains: Vec<OrgDomain>,
    /// user_id -> roles
    pub members: BTreeMap<String, Vec<String>>,
}

impl Org {
    pub fn domain(&self, name: &str) -> Option<&OrgDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    fn domain_mut(&mut self, name: &str) -> Option<&mut OrgDomain> {
        self.domains.iter_mut().find(|d| d.name == name)
    }

    pub fn primary_domain(&self) -> Option<&OrgDomain> {
        self.domains.iter().find(|d| d.primary)
    }
}

impl Aggregate for Org {
    fn aggregate_type() -> &'static str {
        "org"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            ORG_ADDED => {
                let payload: OrgAddedPayload = event.payload_as()?;
                self.name = payload.name;
                self.state = OrgState::Active;
            }
            ORG_CHANGED => {
                let payload: OrgChangedPayload = event.payload_as()?;
                self.name = payload.name;
            }
            ORG_DEACTIVATED => self.state = OrgState::Inactive,
            ORG_REACTIVATED => self.state = OrgState::Active,
            ORG_REMOVED => self.state = OrgState::Removed,
            ORG_DOMAIN_ADDED => {
                let payload: OrgDomainAddedPayload = event.payload_as()?;
                if self.domain(&payload.domain).is_none() {
                    self.domains.push(OrgDomain {
                        name: payload.domain,
                        validation_type: payload.validation_type,
                        ..Default::default()
                    });
                }
            }
            ORG_DOMAIN_VERIFICATION_ADDED => {
                let payload: OrgDomainVerificationAddedPayload = event.payload_as()?;
                if let Some(domain) = self.domain_mut(&payload.domain) {
                    domain.validation_type = Some(payload.validation_type);
                    domain.pending_token = Some(payload.token);
                }
            }
            ORG_DOMAIN_VERIFICATION_FAILED => {}
            ORG_DOMAIN_VERIFIED => {
                let payload: OrgDomainVerifiedPayload = event.payload_as()?;
                if let Some(domain) = self.domain_mut(&payload.domain) {
                    domain.verified = true;
                    domain.pending_token = None;
                }
            }
            ORG_DOMAIN_PRIMARY_SET => {
                let payload: OrgDomainPrimarySetPayload = event.payload_as()?;
                // All other domains lose the flag before the target gains it.
                for domain in &mut self.domains {
                    domain.primary = domain.name == payload.domain;
                }
            }
            ORG_DOMAIN_REMOVED => {
                let payload: OrgDomainRemovedPayload = event.payload_as()?;
                self.domains.retain(|d| d.name != payload.domain);
            }
            ORG_MEMBER_ADDED | ORG_MEMBER_CHANGED => {
                let payload: OrgMemberPayload = event.payload_as()?;
                self.members.insert(payload.user_id, payload.roles);
            }
            ORG_MEMBER_REMOVED => {
                let payload: OrgMemberRemovedPayload = event.payload_as()?;
                self.members.remove(&payload.user_id);
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
pub struct OrgAddedPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgChangedPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainAddedPayload {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainVerificationAddedPayload {
    pub domain: String,
    pub validation_type: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainVerificationFailedPayload {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainVerifiedPayload {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainPrimarySetPayload {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDomainRemovedPayload {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMemberPayload {
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMemberRemovedPayload {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSessionsTerminatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_org_lifecycle() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                (ORG_CHANGED, json!({"name": "Acme Corp"})),
                (ORG_DEACTIVATED, json!({})),
                (ORG_REACTIVATED, json!({})),
            ],
        );

        let org: Org = reduce(&events).unwrap();
        assert_eq!(org.name, "Acme Corp");
        assert_eq!(org.state, OrgState::Active);
        assert_eq!(org.version(), 4);
        assert!(org.exists());
    }

    #[test]
    fn test_replay_equivalence() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                (ORG_DOMAIN_ADDED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_VERIFIED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_PRIMARY_SET, json!({"domain": "acme.com"})),
            ],
        );

        let a: Org = reduce(&events).unwrap();
        let b: Org = reduce(&events).unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(a.state, b.state);
        assert_eq!(a.domains, b.domains);
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn test_primary_moves_between_domains() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                (ORG_DOMAIN_ADDED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_VERIFIED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_PRIMARY_SET, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_ADDED, json!({"domain": "acme.io"})),
                (ORG_DOMAIN_VERIFIED, json!({"domain": "acme.io"})),
                (ORG_DOMAIN_PRIMARY_SET, json!({"domain": "acme.io"})),
            ],
        );

        let org: Org = reduce(&events).unwrap();
        assert!(!org.domain("acme.com").unwrap().primary);
        assert!(org.domain("acme.io").unwrap().primary);
        assert_eq!(org.domains.iter().filter(|d| d.primary).count(), 1);
    }

    #[test]
    fn test_removing_primary_clears_primary() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                (ORG_DOMAIN_ADDED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_VERIFIED, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_PRIMARY_SET, json!({"domain": "acme.com"})),
                (ORG_DOMAIN_REMOVED, json!({"domain": "acme.com"})),
            ],
        );

        let org: Org = reduce(&events).unwrap();
        assert!(org.primary_domain().is_none());
        assert!(org.domains.is_empty());
    }

    #[test]
    fn test_members() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                (ORG_MEMBER_ADDED, json!({"user_id": "u1", "roles": ["ORG_OWNER"]})),
                (ORG_MEMBER_CHANGED, json!({"user_id": "u1", "roles": ["ORG_VIEWER"]})),
                (ORG_MEMBER_ADDED, json!({"user_id": "u2", "roles": ["ORG_VIEWER"]})),
                (ORG_MEMBER_REMOVED, json!({"user_id": "u2"})),
            ],
        );

        let org: Org = reduce(&events).unwrap();
        assert_eq!(org.members.len(), 1);
        assert_eq!(org.members["u1"], vec!["ORG_VIEWER"]);
    }

    #[test]
    fn test_unknown_event_type_ignored() {
        let events = stream(
            "org",
            "o1",
            vec![
                (ORG_ADDED, json!({"name": "Acme"})),
                ("org.something.from.the.future", json!({"whatever": 1})),
            ],
        );

        let org: Org = reduce(&events).unwrap();
        assert_eq!(org.name, "Acme");
        assert_eq!(org.version(), 2);
    }
}

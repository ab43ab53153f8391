//! Policy aggregation
//!
//! Policies live on the instance aggregate (defaults) and on org
//! aggregates (overrides). Event types follow
//! `<scope>.policy.<kind>.<added|changed|removed>`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::password::{
    PasswordAgePolicy, PasswordComplexityPolicy, PasswordLockoutPolicy,
};
use crate::domain::validation;
use crate::error::{AppResult, Error};
use crate::event_store::Event;

use super::{Scope, StreamInfo};

/// The policy kinds of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PolicyKind {
    PasswordComplexity,
    PasswordAge,
    PasswordLockout,
    Login,
    Label,
    Privacy,
    Notification,
    Domain,
    Mfa,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 9] = [
        PolicyKind::PasswordComplexity,
        PolicyKind::PasswordAge,
        PolicyKind::PasswordLockout,
        PolicyKind::Login,
        PolicyKind::Label,
        PolicyKind::Privacy,
        PolicyKind::Notification,
        PolicyKind::Domain,
        PolicyKind::Mfa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::PasswordComplexity => "password.complexity",
            PolicyKind::PasswordAge => "password.age",
            PolicyKind::PasswordLockout => "password.lockout",
            PolicyKind::Login => "login",
            PolicyKind::Label => "label",
            PolicyKind::Privacy => "privacy",
            PolicyKind::Notification => "notification",
            PolicyKind::Domain => "domain",
            PolicyKind::Mfa => "mfa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOp {
    Added,
    Changed,
    Removed,
}

impl PolicyOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyOp::Added => "added",
            PolicyOp::Changed => "changed",
            PolicyOp::Removed => "removed",
        }
    }
}

/// Build the dotted event type for a policy event.
pub fn policy_event_type(scope: Scope, kind: PolicyKind, op: PolicyOp) -> String {
    format!("{}.policy.{}.{}", scope.prefix(), kind.as_str(), op.as_str())
}

/// Parse a policy event type back into its parts.
pub fn parse_policy_event_type(event_type: &str) -> Option<(Scope, PolicyKind, PolicyOp)> {
    let (scope, rest) = if let Some(rest) = event_type.strip_prefix("instance.policy.") {
        (Scope::Instance, rest)
    } else if let Some(rest) = event_type.strip_prefix("org.policy.") {
        (Scope::Org, rest)
    } else {
        return None;
    };

    for kind in PolicyKind::ALL {
        if let Some(op) = rest.strip_prefix(kind.as_str()) {
            let op = match op {
                ".added" => PolicyOp::Added,
                ".changed" => PolicyOp::Changed,
                ".removed" => PolicyOp::Removed,
                _ => continue,
            };
            return Some((scope, kind, op));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Policy payloads (complexity/age/lockout come from the domain module)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPolicy {
    pub allow_username_password: bool,
    pub allow_register: bool,
    pub allow_external_idp: bool,
    pub force_mfa: bool,
    #[serde(default)]
    pub hide_password_reset: bool,
    #[serde(default)]
    pub ignore_unknown_usernames: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwordless_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPolicy {
    pub primary_color: String,
    pub background_color: String,
    pub warn_color: String,
    pub font_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color_dark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color_dark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_color_dark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color_dark: Option<String>,
    #[serde(default)]
    pub hide_login_name_suffix: bool,
    #[serde(default)]
    pub disable_watermark: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    pub password_change: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    pub user_login_must_be_domain: bool,
    pub validate_org_domains: bool,
    pub smtp_sender_address_matches_instance_domain: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaPolicy {
    #[serde(default)]
    pub second_factors: Vec<String>,
    #[serde(default)]
    pub multi_factors: Vec<String>,
}

/// A typed policy payload tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyPayload {
    PasswordComplexity(PasswordComplexityPolicy),
    PasswordAge(PasswordAgePolicy),
    PasswordLockout(PasswordLockoutPolicy),
    Login(LoginPolicy),
    Label(LabelPolicy),
    Privacy(PrivacyPolicy),
    Notification(NotificationPolicy),
    Domain(DomainPolicy),
    Mfa(MfaPolicy),
}

impl PolicyPayload {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyPayload::PasswordComplexity(_) => PolicyKind::PasswordComplexity,
            PolicyPayload::PasswordAge(_) => PolicyKind::PasswordAge,
            PolicyPayload::PasswordLockout(_) => PolicyKind::PasswordLockout,
            PolicyPayload::Login(_) => PolicyKind::Login,
            PolicyPayload::Label(_) => PolicyKind::Label,
            PolicyPayload::Privacy(_) => PolicyKind::Privacy,
            PolicyPayload::Notification(_) => PolicyKind::Notification,
            PolicyPayload::Domain(_) => PolicyKind::Domain,
            PolicyPayload::Mfa(_) => PolicyKind::Mfa,
        }
    }

    pub fn to_value(&self) -> AppResult<serde_json::Value> {
        let value = match self {
            PolicyPayload::PasswordComplexity(p) => serde_json::to_value(p),
            PolicyPayload::PasswordAge(p) => serde_json::to_value(p),
            PolicyPayload::PasswordLockout(p) => serde_json::to_value(p),
            PolicyPayload::Login(p) => serde_json::to_value(p),
            PolicyPayload::Label(p) => serde_json::to_value(p),
            PolicyPayload::Privacy(p) => serde_json::to_value(p),
            PolicyPayload::Notification(p) => serde_json::to_value(p),
            PolicyPayload::Domain(p) => serde_json::to_value(p),
            PolicyPayload::Mfa(p) => serde_json::to_value(p),
        }?;
        Ok(value)
    }

    /// Field validation; runs before any I/O.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            PolicyPayload::PasswordComplexity(p) => {
                if p.min_length == 0 || p.min_length > 72 {
                    return Err(Error::invalid_argument(
                        "POLICY-COMPLEXITY-001",
                        "min_length must be between 1 and 72",
                    ));
                }
            }
            PolicyPayload::Label(p) => {
                validation::validate_hex_color(&p.primary_color)?;
                validation::validate_hex_color(&p.background_color)?;
                validation::validate_hex_color(&p.warn_color)?;
                validation::validate_hex_color(&p.font_color)?;
                for color in [
                    &p.primary_color_dark,
                    &p.background_color_dark,
                    &p.warn_color_dark,
                    &p.font_color_dark,
                ]
                .into_iter()
                .flatten()
                {
                    validation::validate_hex_color(color)?;
                }
            }
            PolicyPayload::Privacy(p) => {
                for link in [&p.tos_link, &p.privacy_link, &p.help_link]
                    .into_iter()
                    .flatten()
                {
                    validation::validate_url(link)?;
                }
                if let Some(email) = &p.support_email {
                    validation::validate_email(email)?;
                }
            }
            PolicyPayload::Login(p) => {
                if let Some(uri) = &p.default_redirect_uri {
                    validation::validate_url(uri)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Write model over one scope's policy events: kind -> stored payload.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub stream: StreamInfo,
    policies: BTreeMap<&'static str, serde_json::Value>,
}

impl PolicySet {
    pub fn apply(&mut self, event: &Event) -> AppResult<()> {
        if let Some((_, kind, op)) = parse_policy_event_type(&event.event_type) {
            match op {
                PolicyOp::Added | PolicyOp::Changed => {
                    self.policies.insert(kind.as_str(), event.payload.clone());
                }
                PolicyOp::Removed => {
                    self.policies.remove(kind.as_str());
                }
            }
        }
        self.stream.track(event);
        Ok(())
    }

    pub fn has(&self, kind: PolicyKind) -> bool {
        self.policies.contains_key(kind.as_str())
    }

    pub fn get_raw(&self, kind: PolicyKind) -> Option<&serde_json::Value> {
        self.policies.get(kind.as_str())
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, kind: PolicyKind) -> AppResult<Option<T>> {
        match self.policies.get(kind.as_str()) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Fold a policy event stream into a set.
pub fn reduce_policy_set(events: &[Event]) -> AppResult<PolicySet> {
    let mut set = PolicySet::default();
    for event in events {
        set.apply(event)?;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::testing::stream;
    use serde_json::json;

    #[test]
    fn test_event_type_roundtrip() {
        for kind in PolicyKind::ALL {
            for op in [PolicyOp::Added, PolicyOp::Changed, PolicyOp::Removed] {
                for scope in [Scope::Instance, Scope::Org] {
                    let event_type = policy_event_type(scope, kind, op);
                    let (s, k, o) = parse_policy_event_type(&event_type).unwrap();
                    assert_eq!(s, scope);
                    assert_eq!(k, kind);
                    assert_eq!(o, op);
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_foreign_events() {
        assert!(parse_policy_event_type("org.added").is_none());
        assert!(parse_policy_event_type("instance.policy.bogus.added").is_none());
    }

    #[test]
    fn test_policy_set_reduction() {
        let events = stream(
            "instance",
            "i1",
            vec![
                (
                    "instance.policy.password.complexity.added",
                    json!({"min_length": 12, "has_lowercase": true, "has_uppercase": true, "has_number": true, "has_symbol": false}),
                ),
                (
                    "instance.policy.login.added",
                    json!({"allow_username_password": true, "allow_register": false, "allow_external_idp": false, "force_mfa": false}),
                ),
                ("instance.policy.login.removed", json!({})),
            ],
        );

        let set = reduce_policy_set(&events).unwrap();
        assert!(set.has(PolicyKind::PasswordComplexity));
        assert!(!set.has(PolicyKind::Login));

        let complexity: PasswordComplexityPolicy =
            set.get(PolicyKind::PasswordComplexity).unwrap().unwrap();
        assert_eq!(complexity.min_length, 12);
    }

    #[test]
    fn test_label_policy_validation() {
        let ok = PolicyPayload::Label(LabelPolicy {
            primary_color: "#5469d4".to_string(),
            background_color: "#fafafa".to_string(),
            warn_color: "#cd3d56".to_string(),
            font_color: "#000000".to_string(),
            ..Default::default()
        });
        assert!(ok.validate().is_ok());

        let bad = PolicyPayload::Label(LabelPolicy {
            primary_color: "blue".to_string(),
            background_color: "#fafafa".to_string(),
            warn_color: "#cd3d56".to_string(),
            font_color: "#000000".to_string(),
            ..Default::default()
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_privacy_policy_validation() {
        let bad = PolicyPayload::Privacy(PrivacyPolicy {
            tos_link: Some("not-a-url".to_string()),
            ..Default::default()
        });
        assert!(bad.validate().is_err());

        let ok = PolicyPayload::Privacy(PrivacyPolicy {
            tos_link: Some("https://example.com/tos".to_string()),
            support_email: Some("support@example.com".to_string()),
            ..Default::default()
        });
        assert!(ok.validate().is_ok());
    }
}

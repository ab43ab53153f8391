//! Identity provider configuration aggregate
//!
//! OIDC, JWT and SAML providers at org or instance scope. Both scopes
//! share the `idp.*` event suffixes under their own prefix and the shared
//! `…idp.removed`.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, Scope, StreamInfo};

pub const IDP_OIDC_ADDED_SUFFIX: &str = "idp.oidc.added";
pub const IDP_OIDC_CHANGED_SUFFIX: &str = "idp.oidc.changed";
pub const IDP_JWT_ADDED_SUFFIX: &str = "idp.jwt.added";
pub const IDP_JWT_CHANGED_SUFFIX: &str = "idp.jwt.changed";
pub const IDP_SAML_ADDED_SUFFIX: &str = "idp.saml.added";
pub const IDP_SAML_CHANGED_SUFFIX: &str = "idp.saml.changed";
pub const IDP_REMOVED_SUFFIX: &str = "idp.removed";

/// Build the scoped event type, e.g. `org.idp.oidc.added`.
pub fn idp_event_type(scope: Scope, suffix: &str) -> String {
    format!("{}.{}", scope.prefix(), suffix)
}

/// Strip the scope prefix off an idp event type.
fn idp_suffix(event_type: &str) -> Option<&str> {
    event_type
        .strip_prefix("org.")
        .or_else(|| event_type.strip_prefix("instance."))
        .filter(|rest| rest.starts_with("idp."))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdpState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

impl IdpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdpState::Unspecified => "unspecified",
            IdpState::Active => "active",
            IdpState::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdpType {
    Oidc,
    Jwt,
    Saml,
}

impl IdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdpType::Oidc => "oidc",
            IdpType::Jwt => "jwt",
            IdpType::Saml => "saml",
        }
    }
}

/// IDP write model.
#[derive(Debug, Clone, Default)]
pub struct IdpConfig {
    stream: StreamInfo,
    pub state: IdpState,
    pub name: String,
    pub idp_type: Option<IdpType>,
    pub oidc: Option<OidcIdpPayload>,
    pub jwt: Option<JwtIdpPayload>,
    pub saml: Option<SamlIdpPayload>,
}

impl Aggregate for IdpConfig {
    fn aggregate_type() -> &'static str {
        "idp"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        if let Some(suffix) = idp_suffix(&event.event_type) {
            match suffix {
                IDP_OIDC_ADDED_SUFFIX => {
                    let payload: OidcIdpPayload = event.payload_as()?;
                    self.name = payload.name.clone();
                    self.idp_type = Some(IdpType::Oidc);
                    self.oidc = Some(payload);
                    self.state = IdpState::Active;
                }
                IDP_OIDC_CHANGED_SUFFIX => {
                    let payload: OidcIdpChangedPayload = event.payload_as()?;
                    if let Some(oidc) = &mut self.oidc {
                        if let Some(name) = payload.name {
                            self.name = name.clone();
                            oidc.name = name;
                        }
                        if let Some(issuer) = payload.issuer {
                            oidc.issuer = issuer;
                        }
                        if let Some(client_id) = payload.client_id {
                            oidc.client_id = client_id;
                        }
                        if let Some(client_secret) = payload.client_secret {
                            oidc.client_secret = client_secret;
                        }
                        if let Some(scopes) = payload.scopes {
                            oidc.scopes = scopes;
                        }
                    }
                }
                IDP_JWT_ADDED_SUFFIX => {
                    let payload: JwtIdpPayload = event.payload_as()?;
                    self.name = payload.name.clone();
                    self.idp_type = Some(IdpType::Jwt);
                    self.jwt = Some(payload);
                    self.state = IdpState::Active;
                }
                IDP_JWT_CHANGED_SUFFIX => {
                    let payload: JwtIdpChangedPayload = event.payload_as()?;
                    if let Some(jwt) = &mut self.jwt {
                        if let Some(name) = payload.name {
                            self.name = name.clone();
                            jwt.name = name;
                        }
                        if let Some(issuer) = payload.issuer {
                            jwt.issuer = issuer;
                        }
                        if let Some(jwt_endpoint) = payload.jwt_endpoint {
                            jwt.jwt_endpoint = jwt_endpoint;
                        }
                        if let Some(keys_endpoint) = payload.keys_endpoint {
                            jwt.keys_endpoint = keys_endpoint;
                        }
                        if let Some(header_name) = payload.header_name {
                            jwt.header_name = header_name;
                        }
                    }
                }
                IDP_SAML_ADDED_SUFFIX => {
                    let payload: SamlIdpPayload = event.payload_as()?;
                    self.name = payload.name.clone();
                    self.idp_type = Some(IdpType::Saml);
                    self.saml = Some(payload);
                    self.state = IdpState::Active;
                }
                IDP_SAML_CHANGED_SUFFIX => {
                    let payload: SamlIdpChangedPayload = event.payload_as()?;
                    if let Some(saml) = &mut self.saml {
                        if let Some(name) = payload.name {
                            self.name = name.clone();
                            saml.name = name;
                        }
                        if let Some(metadata) = payload.metadata {
                            saml.metadata = Some(metadata);
                        }
                        if let Some(metadata_url) = payload.metadata_url {
                            saml.metadata_url = Some(metadata_url);
                        }
                    }
                }
                IDP_REMOVED_SUFFIX => self.state = IdpState::Removed,
                _ => {}
            }
        }

        self.stream.track(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcIdpPayload {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OidcIdpChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl OidcIdpChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.issuer.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
            && self.scopes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtIdpPayload {
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    pub header_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtIdpChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

impl JwtIdpChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.issuer.is_none()
            && self.jwt_endpoint.is_none()
            && self.keys_endpoint.is_none()
            && self.header_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlIdpPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamlIdpChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
}

impl SamlIdpChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.metadata.is_none() && self.metadata_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_oidc_idp_both_scopes() {
        for prefix in ["org", "instance"] {
            let events = stream(
                "idp",
                "idp1",
                vec![(
                    format!("{prefix}.idp.oidc.added").leak() as &str,
                    json!({
                        "name": "corp sso",
                        "issuer": "https://issuer.example.com",
                        "client_id": "cid",
                        "client_secret": "secret"
                    }),
                )],
            );

            let idp: IdpConfig = reduce(&events).unwrap();
            assert_eq!(idp.state, IdpState::Active);
            assert_eq!(idp.idp_type, Some(IdpType::Oidc));
            assert_eq!(idp.name, "corp sso");
        }
    }

    #[test]
    fn test_jwt_idp_change() {
        let events = stream(
            "idp",
            "idp1",
            vec![
                (
                    "org.idp.jwt.added",
                    json!({
                        "name": "legacy jwt",
                        "issuer": "https://issuer",
                        "jwt_endpoint": "https://issuer/jwt",
                        "keys_endpoint": "https://issuer/keys",
                        "header_name": "x-auth"
                    }),
                ),
                ("org.idp.jwt.changed", json!({"header_name": "authorization"})),
            ],
        );

        let idp: IdpConfig = reduce(&events).unwrap();
        assert_eq!(idp.jwt.as_ref().unwrap().header_name, "authorization");
    }

    #[test]
    fn test_shared_remove() {
        let events = stream(
            "idp",
            "idp1",
            vec![
                (
                    "org.idp.saml.added",
                    json!({"name": "partner", "metadata_url": "https://partner/metadata"}),
                ),
                ("org.idp.removed", json!({})),
            ],
        );

        let idp: IdpConfig = reduce(&events).unwrap();
        assert_eq!(idp.state, IdpState::Removed);
    }
}

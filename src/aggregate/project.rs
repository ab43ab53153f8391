//! Project aggregate
//!
//! Projects own their roles, grants, members and applications
//! (OIDC, API and SAML). Client IDs and SAML entity IDs are additionally
//! claimed instance-wide through unique constraints at push time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const PROJECT_ADDED: &str = "project.added";
pub const PROJECT_CHANGED: &str = "project.changed";
pub const PROJECT_DEACTIVATED: &str = "project.deactivated";
pub const PROJECT_REACTIVATED: &str = "project.reactivated";
pub const PROJECT_REMOVED: &str = "project.removed";
pub const ROLE_ADDED: &str = "project.role.added";
pub const ROLE_CHANGED: &str = "project.role.changed";
pub const ROLE_REMOVED: &str = "project.role.removed";
pub const GRANT_ADDED: &str = "project.grant.added";
pub const GRANT_CHANGED: &str = "project.grant.changed";
pub const GRANT_DEACTIVATED: &str = "project.grant.deactivated";
pub const GRANT_REACTIVATED: &str = "project.grant.reactivated";
pub const GRANT_REMOVED: &str = "project.grant.removed";
pub const MEMBER_ADDED: &str = "project.member.added";
pub const MEMBER_CHANGED: &str = "project.member.changed";
pub const MEMBER_REMOVED: &str = "project.member.removed";
pub const GRANT_MEMBER_ADDED: &str = "project.grant.member.added";
pub const GRANT_MEMBER_CHANGED: &str = "project.grant.member.changed";
pub const GRANT_MEMBER_REMOVED: &str = "project.grant.member.removed";
pub const APP_OIDC_ADDED: &str = "project.application.oidc.added";
pub const APP_OIDC_CONFIG_CHANGED: &str = "project.application.oidc.config.changed";
pub const APP_API_ADDED: &str = "project.application.api.added";
pub const APP_API_CONFIG_CHANGED: &str = "project.application.api.config.changed";
pub const APP_SAML_ADDED: &str = "project.application.saml.added";
pub const APP_SAML_CONFIG_CHANGED: &str = "project.application.saml.config.changed";
pub const APP_DEACTIVATED: &str = "project.application.deactivated";
pub const APP_REACTIVATED: &str = "project.application.reactivated";
pub const APP_REMOVED: &str = "project.application.removed";
pub const APP_SESSIONS_TERMINATED: &str = "project.application.sessions.terminated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Unspecified => "unspecified",
            ProjectState::Active => "active",
            ProjectState::Inactive => "inactive",
            ProjectState::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Unspecified,
    Active,
    Inactive,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Unspecified => "unspecified",
            AppState::Active => "active",
            AppState::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcAppType {
    Web,
    UserAgent,
    Native,
}

impl OidcAppType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OidcAppType::Web => "web",
            OidcAppType::UserAgent => "user_agent",
            OidcAppType::Native => "native",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcAuthMethod {
    Basic,
    Post,
    None,
    PrivateKeyJwt,
}

impl OidcAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OidcAuthMethod::Basic => "basic",
            OidcAuthMethod::Post => "post",
            OidcAuthMethod::None => "none",
            OidcAuthMethod::PrivateKeyJwt => "private_key_jwt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAuthMethod {
    Basic,
    PrivateKeyJwt,
}

impl ApiAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiAuthMethod::Basic => "basic",
            ApiAuthMethod::PrivateKeyJwt => "private_key_jwt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    pub app_type: OidcAppType,
    pub auth_method: OidcAuthMethod,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client_id: String,
    pub auth_method: ApiAuthMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlConfig {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppConfig {
    Oidc(OidcConfig),
    Api(ApiConfig),
    Saml(SamlConfig),
}

impl AppConfig {
    pub fn type_str(&self) -> &'static str {
        match self {
            AppConfig::Oidc(_) => "oidc",
            AppConfig::Api(_) => "api",
            AppConfig::Saml(_) => "saml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub state: AppState,
    pub config: AppConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleInfo {
    pub display_name: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    #[default]
    Unspecified,
    Active,
    Inactive,
}

impl GrantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantState::Unspecified => "unspecified",
            GrantState::Active => "active",
            GrantState::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGrant {
    pub id: String,
    pub granted_org_id: String,
    pub role_keys: Vec<String>,
    pub state: GrantState,
}

/// Project write model.
#[derive(Debug, Clone, Default)]
pub struct Project {
    stream: StreamInfo,
    pub state: ProjectState,
    pub name: String,
    pub role_assertion: bool,
    pub role_check: bool,
    /// role key -> info
    pub roles: BTreeMap<String, RoleInfo>,
    /// grant id -> grant
    pub grants: BTreeMap<String, ProjectGrant>,
    /// user_id -> roles
    pub members: BTreeMap<String, Vec<String>>,
    /// (grant id, user_id) -> roles
    pub grant_members: BTreeMap<(String, String), Vec<String>>,
    /// app id -> application
    pub apps: BTreeMap<String, Application>,
}

impl Project {
    pub fn app(&self, app_id: &str) -> Option<&Application> {
        self.apps.get(app_id)
    }

    pub fn has_role(&self, key: &str) -> bool {
        self.roles.contains_key(key)
    }

    /// True when every given key names an existing project role.
    pub fn roles_exist(&self, keys: &[String]) -> bool {
        keys.iter().all(|k| self.roles.contains_key(k))
    }
}

impl Aggregate for Project {
    fn aggregate_type() -> &'static str {
        "project"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            PROJECT_ADDED => {
                let payload: ProjectAddedPayload = event.payload_as()?;
                self.name = payload.name;
                self.role_assertion = payload.role_assertion;
                self.role_check = payload.role_check;
                self.state = ProjectState::Active;
            }
            PROJECT_CHANGED => {
                let payload: ProjectChangedPayload = event.payload_as()?;
                if let Some(name) = payload.name {
                    self.name = name;
                }
                if let Some(role_assertion) = payload.role_assertion {
                    self.role_assertion = role_assertion;
                }
                if let Some(role_check) = payload.role_check {
                    self.role_check = role_check;
                }
            }
            PROJECT_DEACTIVATED => self.state = ProjectState::Inactive,
            PROJECT_REACTIVATED => self.state = ProjectState::Active,
            PROJECT_REMOVED => self.state = ProjectState::Removed,
            ROLE_ADDED | ROLE_CHANGED => {
                let payload: RolePayload = event.payload_as()?;
                self.roles.insert(
                    payload.key,
                    RoleInfo {
                        display_name: payload.display_name,
                        group: payload.group,
                    },
                );
            }
            ROLE_REMOVED => {
                let payload: RoleRemovedPayload = event.payload_as()?;
                self.roles.remove(&payload.key);
            }
            GRANT_ADDED => {
                let payload: GrantAddedPayload = event.payload_as()?;
                self.grants.insert(
                    payload.grant_id.clone(),
                    ProjectGrant {
                        id: payload.grant_id,
                        granted_org_id: payload.granted_org_id,
                        role_keys: payload.role_keys,
                        state: GrantState::Active,
                    },
                );
            }
            GRANT_CHANGED => {
                let payload: GrantChangedPayload = event.payload_as()?;
                if let Some(grant) = self.grants.get_mut(&payload.grant_id) {
                    grant.role_keys = payload.role_keys;
                }
            }
            GRANT_DEACTIVATED => {
                let payload: GrantRefPayload = event.payload_as()?;
                if let Some(grant) = self.grants.get_mut(&payload.grant_id) {
                    grant.state = GrantState::Inactive;
                }
            }
            GRANT_REACTIVATED => {
                let payload: GrantRefPayload = event.payload_as()?;
                if let Some(grant) = self.grants.get_mut(&payload.grant_id) {
                    grant.state = GrantState::Active;
                }
            }
            GRANT_REMOVED => {
                let payload: GrantRefPayload = event.payload_as()?;
                self.grants.remove(&payload.grant_id);
                self.grant_members
                    .retain(|(grant_id, _), _| grant_id != &payload.grant_id);
            }
            MEMBER_ADDED | MEMBER_CHANGED => {
                let payload: MemberPayload = event.payload_as()?;
                self.members.insert(payload.user_id, payload.roles);
            }
            MEMBER_REMOVED => {
                let payload: MemberRemovedPayload = event.payload_as()?;
                self.members.remove(&payload.user_id);
            }
            GRANT_MEMBER_ADDED | GRANT_MEMBER_CHANGED => {
                let payload: GrantMemberPayload = event.payload_as()?;
                self.grant_members
                    .insert((payload.grant_id, payload.user_id), payload.roles);
            }
            GRANT_MEMBER_REMOVED => {
                let payload: GrantMemberRemovedPayload = event.payload_as()?;
                self.grant_members
                    .remove(&(payload.grant_id, payload.user_id));
            }
            APP_OIDC_ADDED => {
                let payload: OidcAppAddedPayload = event.payload_as()?;
                self.apps.insert(
                    payload.app_id.clone(),
                    Application {
                        id: payload.app_id,
                        name: payload.name,
                        state: AppState::Active,
                        config: AppConfig::Oidc(payload.config),
                    },
                );
            }
            APP_OIDC_CONFIG_CHANGED => {
                let payload: OidcConfigChangedPayload = event.payload_as()?;
                if let Some(app) = self.apps.get_mut(&payload.app_id) {
                    if let AppConfig::Oidc(config) = &mut app.config {
                        if let Some(redirect_uris) = payload.redirect_uris {
                            config.redirect_uris = redirect_uris;
                        }
                        if let Some(response_types) = payload.response_types {
                            config.response_types = response_types;
                        }
                        if let Some(grant_types) = payload.grant_types {
                            config.grant_types = grant_types;
                        }
                        if let Some(app_type) = payload.app_type {
                            config.app_type = app_type;
                        }
                        if let Some(auth_method) = payload.auth_method {
                            config.auth_method = auth_method;
                        }
                        if let Some(uris) = payload.post_logout_redirect_uris {
                            config.post_logout_redirect_uris = uris;
                        }
                        if let Some(dev_mode) = payload.dev_mode {
                            config.dev_mode = dev_mode;
                        }
                    }
                }
            }
            APP_API_ADDED => {
                let payload: ApiAppAddedPayload = event.payload_as()?;
                self.apps.insert(
                    payload.app_id.clone(),
                    Application {
                        id: payload.app_id,
                        name: payload.name,
                        state: AppState::Active,
                        config: AppConfig::Api(payload.config),
                    },
                );
            }
            APP_API_CONFIG_CHANGED => {
                let payload: ApiConfigChangedPayload = event.payload_as()?;
                if let Some(app) = self.apps.get_mut(&payload.app_id) {
                    if let AppConfig::Api(config) = &mut app.config {
                        if let Some(auth_method) = payload.auth_method {
                            config.auth_method = auth_method;
                        }
                    }
                }
            }
            APP_SAML_ADDED => {
                let payload: SamlAppAddedPayload = event.payload_as()?;
                self.apps.insert(
                    payload.app_id.clone(),
                    Application {
                        id: payload.app_id,
                        name: payload.name,
                        state: AppState::Active,
                        config: AppConfig::Saml(payload.config),
                    },
                );
            }
            APP_SAML_CONFIG_CHANGED => {
                let payload: SamlConfigChangedPayload = event.payload_as()?;
                if let Some(app) = self.apps.get_mut(&payload.app_id) {
                    if let AppConfig::Saml(config) = &mut app.config {
                        if let Some(entity_id) = payload.entity_id {
                            config.entity_id = entity_id;
                        }
                        if let Some(metadata) = payload.metadata {
                            config.metadata = Some(metadata);
                        }
                        if let Some(metadata_url) = payload.metadata_url {
                            config.metadata_url = Some(metadata_url);
                        }
                    }
                }
            }
            APP_DEACTIVATED => {
                let payload: AppRefPayload = event.payload_as()?;
                if let Some(app) = self.apps.get_mut(&payload.app_id) {
                    app.state = AppState::Inactive;
                }
            }
            APP_REACTIVATED => {
                let payload: AppRefPayload = event.payload_as()?;
                if let Some(app) = self.apps.get_mut(&payload.app_id) {
                    app.state = AppState::Active;
                }
            }
            APP_REMOVED => {
                let payload: AppRefPayload = event.payload_as()?;
                self.apps.remove(&payload.app_id);
            }
            APP_SESSIONS_TERMINATED => {}
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
pub struct ProjectAddedPayload {
    pub name: String,
    #[serde(default)]
    pub role_assertion: bool,
    #[serde(default)]
    pub role_check: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_assertion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_check: Option<bool>,
}

impl ProjectChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.role_assertion.is_none() && self.role_check.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePayload {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRemovedPayload {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantAddedPayload {
    pub grant_id: String,
    pub granted_org_id: String,
    pub role_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantChangedPayload {
    pub grant_id: String,
    pub role_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRefPayload {
    pub grant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPayload {
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRemovedPayload {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantMemberPayload {
    pub grant_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantMemberRemovedPayload {
    pub grant_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcAppAddedPayload {
    pub app_id: String,
    pub name: String,
    #[serde(flatten)]
    pub config: OidcConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OidcConfigChangedPayload {
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<OidcAppType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<OidcAuthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uris: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiAppAddedPayload {
    pub app_id: String,
    pub name: String,
    #[serde(flatten)]
    pub config: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfigChangedPayload {
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<ApiAuthMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlAppAddedPayload {
    pub app_id: String,
    pub name: String,
    #[serde(flatten)]
    pub config: SamlConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamlConfigChangedPayload {
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRefPayload {
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSessionsTerminatedPayload {
    pub app_id: String,
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream};
    use serde_json::json;

    #[test]
    fn test_project_roles() {
        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (ROLE_ADDED, json!({"key": "VIEWER"})),
                (ROLE_ADDED, json!({"key": "ADMIN", "display_name": "Admin"})),
                (ROLE_REMOVED, json!({"key": "VIEWER"})),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        assert!(!project.has_role("VIEWER"));
        assert!(project.has_role("ADMIN"));
        assert_eq!(
            project.roles["ADMIN"].display_name.as_deref(),
            Some("Admin")
        );
    }

    #[test]
    fn test_grant_roles_subset_tracking() {
        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (ROLE_ADDED, json!({"key": "VIEWER"})),
                (ROLE_ADDED, json!({"key": "ADMIN"})),
                (
                    GRANT_ADDED,
                    json!({"grant_id": "g1", "granted_org_id": "o2", "role_keys": ["VIEWER"]}),
                ),
                (GRANT_CHANGED, json!({"grant_id": "g1", "role_keys": ["ADMIN", "VIEWER"]})),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        let grant = &project.grants["g1"];
        assert_eq!(grant.role_keys, vec!["ADMIN", "VIEWER"]);
        assert_eq!(grant.state, GrantState::Active);
    }

    #[test]
    fn test_grant_removal_drops_grant_members() {
        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (ROLE_ADDED, json!({"key": "VIEWER"})),
                (
                    GRANT_ADDED,
                    json!({"grant_id": "g1", "granted_org_id": "o2", "role_keys": ["VIEWER"]}),
                ),
                (
                    GRANT_MEMBER_ADDED,
                    json!({"grant_id": "g1", "user_id": "u1", "roles": ["VIEWER"]}),
                ),
                (GRANT_REMOVED, json!({"grant_id": "g1"})),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        assert!(project.grants.is_empty());
        assert!(project.grant_members.is_empty());
    }

    #[test]
    fn test_oidc_app_added_and_changed() {
        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (
                    APP_OIDC_ADDED,
                    json!({
                        "app_id": "a1",
                        "name": "web login",
                        "client_id": "c-42",
                        "redirect_uris": ["https://x/cb"],
                        "app_type": "web",
                        "auth_method": "basic"
                    }),
                ),
                (
                    APP_OIDC_CONFIG_CHANGED,
                    json!({"app_id": "a1", "dev_mode": true}),
                ),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        let app = project.app("a1").unwrap();
        assert_eq!(app.state, AppState::Active);
        match &app.config {
            AppConfig::Oidc(config) => {
                assert_eq!(config.client_id, "c-42");
                assert_eq!(config.redirect_uris, vec!["https://x/cb"]);
                assert!(config.dev_mode);
                assert_eq!(config.app_type, OidcAppType::Web);
            }
            other => panic!("expected oidc config, got {other:?}"),
        }
    }

    #[test]
    fn test_app_deactivate_and_remove() {
        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (
                    APP_API_ADDED,
                    json!({"app_id": "a1", "name": "backend", "client_id": "c-1", "auth_method": "basic"}),
                ),
                (APP_DEACTIVATED, json!({"app_id": "a1"})),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        assert_eq!(project.app("a1").unwrap().state, AppState::Inactive);

        let events = stream(
            "project",
            "p1",
            vec![
                (PROJECT_ADDED, json!({"name": "crm"})),
                (
                    APP_API_ADDED,
                    json!({"app_id": "a1", "name": "backend", "client_id": "c-1", "auth_method": "basic"}),
                ),
                (APP_REMOVED, json!({"app_id": "a1"})),
            ],
        );

        let project: Project = reduce(&events).unwrap();
        assert!(project.app("a1").is_none());
    }
}

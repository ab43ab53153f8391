//! Application commands: OIDC, API and SAML apps inside a project.

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;

use crate::aggregate::project::{
    ApiAppAddedPayload, ApiAuthMethod, ApiConfig, ApiConfigChangedPayload, AppConfig, AppRefPayload,
    AppState, Application, OidcAppAddedPayload, OidcAuthMethod, OidcConfig,
    OidcConfigChangedPayload, OidcAppType, SamlAppAddedPayload, SamlConfig,
    SamlConfigChangedPayload, APP_API_ADDED, APP_API_CONFIG_CHANGED, APP_DEACTIVATED,
    APP_OIDC_ADDED, APP_OIDC_CONFIG_CHANGED, APP_REACTIVATED, APP_REMOVED, APP_SAML_ADDED,
    APP_SAML_CONFIG_CHANGED,
};
use crate::aggregate::{Aggregate, Project};
use crate::domain::validation::{require_non_empty, validate_url};
use crate::error::{AppResult, Error};
use crate::event_store::{EventCommand, UniqueConstraint};

use super::{CommandContext, Commands};

pub(crate) const UNIQUE_CLIENT_IDS: &str = "client_ids";
pub(crate) const UNIQUE_SAML_ENTITY_IDS: &str = "saml_entity_ids";

#[derive(Debug, Clone)]
pub struct AddOidcAppRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub response_types: Vec<String>,
    pub grant_types: Vec<String>,
    pub app_type: OidcAppType,
    pub auth_method: OidcAuthMethod,
    pub post_logout_redirect_uris: Vec<String>,
    pub dev_mode: bool,
}

#[derive(Debug, Clone)]
pub struct AddSamlAppRequest {
    pub name: String,
    pub metadata: Option<String>,
    pub metadata_url: Option<String>,
}

/// IDs assigned to a newly created OIDC/API app.
#[derive(Debug, Clone)]
pub struct OidcAppCreated {
    pub app_id: String,
    pub client_id: String,
}

impl Commands {
    /// Create an OIDC application. Non-native apps need at least one
    /// redirect URI; the client ID is claimed instance-wide.
    pub async fn add_oidc_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        request: AddOidcAppRequest,
    ) -> AppResult<OidcAppCreated> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.name, "APP-001", "app name")?;
        validate_oidc_redirects(request.app_type, &request.redirect_uris)?;

        let app_id = self.next_id();
        let client_id = self.next_id();
        let created = OidcAppCreated {
            app_id: app_id.clone(),
            client_id: client_id.clone(),
        };

        self.retrying(|| {
            let request = request.clone();
            let app_id = app_id.clone();
            let client_id = client_id.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let command = EventCommand::new(Project::aggregate_type(), project_id, APP_OIDC_ADDED)
                    .payload(&OidcAppAddedPayload {
                        app_id,
                        name: request.name,
                        config: OidcConfig {
                            client_id: client_id.clone(),
                            redirect_uris: request.redirect_uris,
                            response_types: request.response_types,
                            grant_types: request.grant_types,
                            app_type: request.app_type,
                            auth_method: request.auth_method,
                            post_logout_redirect_uris: request.post_logout_redirect_uris,
                            dev_mode: request.dev_mode,
                        },
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version())
                    .unique_constraint(UniqueConstraint::add(
                        UNIQUE_CLIENT_IDS,
                        &client_id,
                        "APP-OIDC-002",
                        format!("client id already taken: {client_id}"),
                    ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await?;

        Ok(created)
    }

    pub async fn change_oidc_app_config(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
        changes: OidcConfigChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = existing_app(&project, app_id)?;
                let config = match &app.config {
                    AppConfig::Oidc(config) => config,
                    _ => {
                        return Err(Error::invalid_argument(
                            "APP-OIDC-003",
                            "not an OIDC application",
                        ))
                    }
                };

                let mut effective = changes;
                effective.app_id = app_id.to_string();
                if effective.redirect_uris.as_ref() == Some(&config.redirect_uris) {
                    effective.redirect_uris = None;
                }
                if effective.response_types.as_ref() == Some(&config.response_types) {
                    effective.response_types = None;
                }
                if effective.grant_types.as_ref() == Some(&config.grant_types) {
                    effective.grant_types = None;
                }
                if effective.app_type == Some(config.app_type) {
                    effective.app_type = None;
                }
                if effective.auth_method == Some(config.auth_method) {
                    effective.auth_method = None;
                }
                if effective.post_logout_redirect_uris.as_ref()
                    == Some(&config.post_logout_redirect_uris)
                {
                    effective.post_logout_redirect_uris = None;
                }
                if effective.dev_mode == Some(config.dev_mode) {
                    effective.dev_mode = None;
                }
                if is_noop_oidc_change(&effective) {
                    return Ok(());
                }

                let app_type = effective.app_type.unwrap_or(config.app_type);
                let redirect_uris = effective
                    .redirect_uris
                    .clone()
                    .unwrap_or_else(|| config.redirect_uris.clone());
                validate_oidc_redirects(app_type, &redirect_uris)?;

                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, APP_OIDC_CONFIG_CHANGED)
                        .payload(&effective)?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Create an API application (machine-to-machine client).
    pub async fn add_api_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        name: &str,
        auth_method: ApiAuthMethod,
    ) -> AppResult<OidcAppCreated> {
        self.ensure_deadline(ctx)?;
        require_non_empty(name, "APP-001", "app name")?;

        let app_id = self.next_id();
        let client_id = self.next_id();
        let created = OidcAppCreated {
            app_id: app_id.clone(),
            client_id: client_id.clone(),
        };

        self.retrying(|| {
            let name = name.to_string();
            let app_id = app_id.clone();
            let client_id = client_id.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let command = EventCommand::new(Project::aggregate_type(), project_id, APP_API_ADDED)
                    .payload(&ApiAppAddedPayload {
                        app_id,
                        name,
                        config: ApiConfig {
                            client_id: client_id.clone(),
                            auth_method,
                        },
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version())
                    .unique_constraint(UniqueConstraint::add(
                        UNIQUE_CLIENT_IDS,
                        &client_id,
                        "APP-OIDC-002",
                        format!("client id already taken: {client_id}"),
                    ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await?;

        Ok(created)
    }

    /// Change an API app's auth method. `none`/`post` are OIDC-only.
    pub async fn change_api_app_auth_method(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
        auth_method: OidcAuthMethod,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let auth_method = match auth_method {
            OidcAuthMethod::Basic => ApiAuthMethod::Basic,
            OidcAuthMethod::PrivateKeyJwt => ApiAuthMethod::PrivateKeyJwt,
            OidcAuthMethod::None | OidcAuthMethod::Post => {
                return Err(Error::invalid_argument(
                    "APP-API-002",
                    "invalid auth method for API app",
                ))
            }
        };

        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = existing_app(&project, app_id)?;
                let config = match &app.config {
                    AppConfig::Api(config) => config,
                    _ => {
                        return Err(Error::invalid_argument(
                            "APP-API-003",
                            "not an API application",
                        ))
                    }
                };
                if config.auth_method == auth_method {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, APP_API_CONFIG_CHANGED)
                        .payload(&ApiConfigChangedPayload {
                            app_id: app_id.to_string(),
                            auth_method: Some(auth_method),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Create a SAML application. Metadata or a metadata URL is required;
    /// the entity ID is claimed instance-wide.
    pub async fn add_saml_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        request: AddSamlAppRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.name, "APP-001", "app name")?;
        let entity_id = saml_entity_id(&request.metadata, &request.metadata_url)?;

        let app_id = self.next_id();
        self.retrying(|| {
            let request = request.clone();
            let entity_id = entity_id.clone();
            let app_id = app_id.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let command = EventCommand::new(Project::aggregate_type(), project_id, APP_SAML_ADDED)
                    .payload(&SamlAppAddedPayload {
                        app_id,
                        name: request.name,
                        config: SamlConfig {
                            entity_id: entity_id.clone(),
                            metadata: request.metadata,
                            metadata_url: request.metadata_url,
                        },
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version())
                    .unique_constraint(UniqueConstraint::add(
                        UNIQUE_SAML_ENTITY_IDS,
                        &entity_id,
                        "APP-SAML-002",
                        format!("entity id already taken: {entity_id}"),
                    ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await?;

        Ok(app_id)
    }

    pub async fn change_saml_app_config(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
        metadata: Option<String>,
        metadata_url: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(metadata) = &metadata {
            parse_saml_entity_id(metadata)?;
        }
        if let Some(url) = &metadata_url {
            validate_url(url)?;
        }

        self.retrying(|| {
            let metadata = metadata.clone();
            let metadata_url = metadata_url.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = existing_app(&project, app_id)?;
                let config = match &app.config {
                    AppConfig::Saml(config) => config,
                    _ => {
                        return Err(Error::invalid_argument(
                            "APP-SAML-003",
                            "not a SAML application",
                        ))
                    }
                };

                let metadata_changed = metadata.is_some() && metadata != config.metadata;
                let url_changed = metadata_url.is_some() && metadata_url != config.metadata_url;
                if !metadata_changed && !url_changed {
                    return Ok(());
                }

                let new_entity_id = match &metadata {
                    Some(metadata) => parse_saml_entity_id(metadata)?,
                    None => config.entity_id.clone(),
                };

                let mut command =
                    EventCommand::new(Project::aggregate_type(), project_id, APP_SAML_CONFIG_CHANGED)
                        .payload(&SamlConfigChangedPayload {
                            app_id: app_id.to_string(),
                            entity_id: (new_entity_id != config.entity_id)
                                .then(|| new_entity_id.clone()),
                            metadata: metadata_changed.then(|| metadata.clone().unwrap()),
                            metadata_url: url_changed.then(|| metadata_url.clone().unwrap()),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());

                if new_entity_id != config.entity_id {
                    command = command
                        .unique_constraint(UniqueConstraint::remove(
                            UNIQUE_SAML_ENTITY_IDS,
                            &config.entity_id,
                        ))
                        .unique_constraint(UniqueConstraint::add(
                            UNIQUE_SAML_ENTITY_IDS,
                            &new_entity_id,
                            "APP-SAML-002",
                            format!("entity id already taken: {new_entity_id}"),
                        ));
                }

                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
    ) -> AppResult<()> {
        self.app_state_change(ctx, project_id, app_id, APP_DEACTIVATED, AppState::Active, "active")
            .await
    }

    pub async fn reactivate_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
    ) -> AppResult<()> {
        self.app_state_change(
            ctx,
            project_id,
            app_id,
            APP_REACTIVATED,
            AppState::Inactive,
            "inactive",
        )
        .await
    }

    /// Remove an application, releasing its client/entity ID claim.
    pub async fn remove_app(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = existing_app(&project, app_id)?;

                let mut command = EventCommand::new(Project::aggregate_type(), project_id, APP_REMOVED)
                    .payload(&AppRefPayload {
                        app_id: app_id.to_string(),
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());

                command = match &app.config {
                    AppConfig::Oidc(config) => command.unique_constraint(
                        UniqueConstraint::remove(UNIQUE_CLIENT_IDS, &config.client_id),
                    ),
                    AppConfig::Api(config) => command.unique_constraint(
                        UniqueConstraint::remove(UNIQUE_CLIENT_IDS, &config.client_id),
                    ),
                    AppConfig::Saml(config) => command.unique_constraint(
                        UniqueConstraint::remove(UNIQUE_SAML_ENTITY_IDS, &config.entity_id),
                    ),
                };

                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn app_state_change(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
        event_type: &'static str,
        required: AppState,
        required_name: &'static str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = existing_app(&project, app_id)?;
                if app.state != required {
                    return Err(Error::failed_precondition(
                        "APP-004",
                        format!("application is not {required_name}"),
                    ));
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, event_type)
                    .payload(&AppRefPayload {
                        app_id: app_id.to_string(),
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }
}

fn existing_app<'a>(project: &'a Project, app_id: &str) -> AppResult<&'a Application> {
    project
        .app(app_id)
        .ok_or_else(|| Error::not_found("APP-002", format!("application not found: {app_id}")))
}

fn is_noop_oidc_change(changes: &OidcConfigChangedPayload) -> bool {
    changes.redirect_uris.is_none()
        && changes.response_types.is_none()
        && changes.grant_types.is_none()
        && changes.app_type.is_none()
        && changes.auth_method.is_none()
        && changes.post_logout_redirect_uris.is_none()
        && changes.dev_mode.is_none()
}

/// Non-native OIDC apps need at least one http(s) redirect URI; native
/// apps may use custom schemes.
fn validate_oidc_redirects(app_type: OidcAppType, redirect_uris: &[String]) -> AppResult<()> {
    if app_type != OidcAppType::Native && redirect_uris.is_empty() {
        return Err(Error::invalid_argument(
            "APP-OIDC-001",
            "non-native OIDC apps require at least one redirect uri",
        ));
    }
    if app_type != OidcAppType::Native {
        for uri in redirect_uris {
            validate_url(uri)?;
        }
    }
    Ok(())
}

/// The entity ID for a new SAML app: parsed from the metadata when
/// provided, otherwise the metadata URL itself (the common convention).
fn saml_entity_id(metadata: &Option<String>, metadata_url: &Option<String>) -> AppResult<String> {
    match (metadata, metadata_url) {
        (Some(metadata), _) => parse_saml_entity_id(metadata),
        (None, Some(url)) => {
            validate_url(url)?;
            Ok(url.clone())
        }
        (None, None) => Err(Error::invalid_argument(
            "APP-SAML-001",
            "metadata or metadata_url required",
        )),
    }
}

/// Extract the `entityID` attribute of the `EntityDescriptor` root.
fn parse_saml_entity_id(metadata: &str) -> AppResult<String> {
    let mut reader = Reader::from_str(metadata);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(element)) | Ok(XmlEvent::Empty(element)) => {
                if element.local_name().as_ref() == b"EntityDescriptor" {
                    for attr in element.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"entityID" {
                            let value = String::from_utf8_lossy(&attr.value).into_owned();
                            if value.is_empty() {
                                break;
                            }
                            return Ok(value);
                        }
                    }
                    return Err(Error::invalid_argument(
                        "APP-SAML-004",
                        "metadata has no entityID",
                    ));
                }
            }
            Ok(XmlEvent::Eof) => {
                return Err(Error::invalid_argument(
                    "APP-SAML-004",
                    "metadata has no EntityDescriptor",
                ))
            }
            Err(err) => {
                return Err(Error::invalid_argument(
                    "APP-SAML-005",
                    format!("malformed SAML metadata: {err}"),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_id() {
        let metadata = r#"<?xml version="1.0"?>
            <md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"
                entityID="https://sp.example.com/saml">
            </md:EntityDescriptor>"#;
        assert_eq!(
            parse_saml_entity_id(metadata).unwrap(),
            "https://sp.example.com/saml"
        );
    }

    #[test]
    fn test_parse_entity_id_missing() {
        let metadata = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata"/>"#;
        let err = parse_saml_entity_id(metadata).unwrap_err();
        assert_eq!(err.code, "APP-SAML-004");
    }

    #[test]
    fn test_parse_malformed_metadata_fails() {
        assert!(parse_saml_entity_id("<not-xml").is_err());
        assert!(parse_saml_entity_id("<other/>").is_err());
    }

    #[test]
    fn test_redirect_uri_rules() {
        assert!(validate_oidc_redirects(OidcAppType::Web, &[]).is_err());
        assert!(validate_oidc_redirects(OidcAppType::Native, &[]).is_ok());
        assert!(
            validate_oidc_redirects(OidcAppType::Web, &["https://x/cb".to_string()]).is_ok()
        );
        assert!(validate_oidc_redirects(OidcAppType::Web, &["no-scheme".to_string()]).is_err());
        assert!(validate_oidc_redirects(
            OidcAppType::Native,
            &["app://callback".to_string()]
        )
        .is_ok());
    }

    #[test]
    fn test_saml_entity_id_fallback_to_url() {
        let entity = saml_entity_id(&None, &Some("https://sp/metadata".to_string())).unwrap();
        assert_eq!(entity, "https://sp/metadata");

        let err = saml_entity_id(&None, &None).unwrap_err();
        assert_eq!(err.code, "APP-SAML-001");
    }
}

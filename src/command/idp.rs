//! Identity provider commands at org and instance scope.

use crate::aggregate::idp::{
    idp_event_type, IdpState, JwtIdpChangedPayload, JwtIdpPayload, OidcIdpChangedPayload,
    OidcIdpPayload, SamlIdpChangedPayload, SamlIdpPayload, IDP_JWT_ADDED_SUFFIX,
    IDP_JWT_CHANGED_SUFFIX, IDP_OIDC_ADDED_SUFFIX, IDP_OIDC_CHANGED_SUFFIX, IDP_REMOVED_SUFFIX,
    IDP_SAML_ADDED_SUFFIX, IDP_SAML_CHANGED_SUFFIX,
};
use crate::aggregate::{Aggregate, IdpConfig, Scope};
use crate::domain::validation::{require_non_empty, validate_url};
use crate::error::{AppResult, Error};
use crate::event_store::{EventCommand, UniqueConstraint};

use super::{CommandContext, Commands};

const UNIQUE_IDP_NAMES: &str = "idp_names";

fn idp_name_field(owner: &str, name: &str) -> String {
    format!("{owner}:{name}")
}

#[derive(Debug, Clone)]
pub struct AddOidcIdpRequest {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AddJwtIdpRequest {
    pub name: String,
    pub issuer: String,
    pub jwt_endpoint: String,
    pub keys_endpoint: String,
    pub header_name: String,
}

#[derive(Debug, Clone)]
pub struct AddSamlIdpRequest {
    pub name: String,
    pub metadata: Option<String>,
    pub metadata_url: Option<String>,
}

impl Commands {
    pub async fn add_oidc_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        request: AddOidcIdpRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.name, "IDP-001", "idp name")?;
        require_non_empty(&request.client_id, "IDP-OIDC-001", "client id")?;
        require_non_empty(&request.issuer, "IDP-OIDC-002", "issuer")?;
        validate_url(&request.issuer)?;

        let owner = self.idp_owner(ctx, scope, org_id).await?;
        let idp_id = self.next_id();

        let command = EventCommand::new(
            IdpConfig::aggregate_type(),
            &idp_id,
            &idp_event_type(scope, IDP_OIDC_ADDED_SUFFIX),
        )
        .payload(&OidcIdpPayload {
            name: request.name.clone(),
            issuer: request.issuer,
            client_id: request.client_id,
            client_secret: request.client_secret,
            scopes: request.scopes,
        })?
        .editor(&ctx.editor_user)
        .owner(&owner)
        .expected_version(0)
        .unique_constraint(UniqueConstraint::add(
            UNIQUE_IDP_NAMES,
            &idp_name_field(&owner, &request.name),
            "IDP-002",
            format!("idp name already taken: {}", request.name),
        ));
        self.push(ctx, vec![command]).await?;
        Ok(idp_id)
    }

    pub async fn change_oidc_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        idp_id: &str,
        changes: OidcIdpChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(issuer) = &changes.issuer {
            validate_url(issuer)?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let idp = self.existing_idp(ctx, idp_id).await?;
                let oidc = idp.oidc.as_ref().ok_or_else(|| {
                    Error::invalid_argument("IDP-003", "not an oidc idp")
                })?;

                let mut effective = changes;
                if effective.name.as_deref() == Some(idp.name.as_str()) {
                    effective.name = None;
                }
                if effective.issuer.as_deref() == Some(oidc.issuer.as_str()) {
                    effective.issuer = None;
                }
                if effective.client_id.as_deref() == Some(oidc.client_id.as_str()) {
                    effective.client_id = None;
                }
                if effective.client_secret.as_deref() == Some(oidc.client_secret.as_str()) {
                    effective.client_secret = None;
                }
                if effective.scopes.as_ref() == Some(&oidc.scopes) {
                    effective.scopes = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let mut command = EventCommand::new(
                    IdpConfig::aggregate_type(),
                    idp_id,
                    &idp_event_type(scope, IDP_OIDC_CHANGED_SUFFIX),
                )
                .editor(&ctx.editor_user)
                .owner(&idp.stream().resource_owner)
                .expected_version(idp.version());

                if let Some(new_name) = &effective.name {
                    let owner = idp.stream().resource_owner.clone();
                    command = command
                        .unique_constraint(UniqueConstraint::remove(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, &idp.name),
                        ))
                        .unique_constraint(UniqueConstraint::add(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, new_name),
                            "IDP-002",
                            format!("idp name already taken: {new_name}"),
                        ));
                }

                let command = command.payload(&effective)?;
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn add_jwt_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        request: AddJwtIdpRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.name, "IDP-001", "idp name")?;
        require_non_empty(&request.header_name, "IDP-JWT-001", "header name")?;
        validate_url(&request.issuer)?;
        validate_url(&request.jwt_endpoint)?;
        validate_url(&request.keys_endpoint)?;

        let owner = self.idp_owner(ctx, scope, org_id).await?;
        let idp_id = self.next_id();

        let command = EventCommand::new(
            IdpConfig::aggregate_type(),
            &idp_id,
            &idp_event_type(scope, IDP_JWT_ADDED_SUFFIX),
        )
        .payload(&JwtIdpPayload {
            name: request.name.clone(),
            issuer: request.issuer,
            jwt_endpoint: request.jwt_endpoint,
            keys_endpoint: request.keys_endpoint,
            header_name: request.header_name,
        })?
        .editor(&ctx.editor_user)
        .owner(&owner)
        .expected_version(0)
        .unique_constraint(UniqueConstraint::add(
            UNIQUE_IDP_NAMES,
            &idp_name_field(&owner, &request.name),
            "IDP-002",
            format!("idp name already taken: {}", request.name),
        ));
        self.push(ctx, vec![command]).await?;
        Ok(idp_id)
    }

    pub async fn change_jwt_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        idp_id: &str,
        changes: JwtIdpChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        for url in [&changes.issuer, &changes.jwt_endpoint, &changes.keys_endpoint]
            .into_iter()
            .flatten()
        {
            validate_url(url)?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let idp = self.existing_idp(ctx, idp_id).await?;
                let jwt = idp
                    .jwt
                    .as_ref()
                    .ok_or_else(|| Error::invalid_argument("IDP-004", "not a jwt idp"))?;

                let mut effective = changes;
                if effective.name.as_deref() == Some(idp.name.as_str()) {
                    effective.name = None;
                }
                if effective.issuer.as_deref() == Some(jwt.issuer.as_str()) {
                    effective.issuer = None;
                }
                if effective.jwt_endpoint.as_deref() == Some(jwt.jwt_endpoint.as_str()) {
                    effective.jwt_endpoint = None;
                }
                if effective.keys_endpoint.as_deref() == Some(jwt.keys_endpoint.as_str()) {
                    effective.keys_endpoint = None;
                }
                if effective.header_name.as_deref() == Some(jwt.header_name.as_str()) {
                    effective.header_name = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let mut command = EventCommand::new(
                    IdpConfig::aggregate_type(),
                    idp_id,
                    &idp_event_type(scope, IDP_JWT_CHANGED_SUFFIX),
                )
                .editor(&ctx.editor_user)
                .owner(&idp.stream().resource_owner)
                .expected_version(idp.version());

                if let Some(new_name) = &effective.name {
                    let owner = idp.stream().resource_owner.clone();
                    command = command
                        .unique_constraint(UniqueConstraint::remove(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, &idp.name),
                        ))
                        .unique_constraint(UniqueConstraint::add(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, new_name),
                            "IDP-002",
                            format!("idp name already taken: {new_name}"),
                        ));
                }

                let command = command.payload(&effective)?;
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn add_saml_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
        request: AddSamlIdpRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.name, "IDP-001", "idp name")?;
        if request.metadata.is_none() && request.metadata_url.is_none() {
            return Err(Error::invalid_argument(
                "IDP-SAML-001",
                "metadata or metadata_url required",
            ));
        }
        if let Some(url) = &request.metadata_url {
            validate_url(url)?;
        }

        let owner = self.idp_owner(ctx, scope, org_id).await?;
        let idp_id = self.next_id();

        let command = EventCommand::new(
            IdpConfig::aggregate_type(),
            &idp_id,
            &idp_event_type(scope, IDP_SAML_ADDED_SUFFIX),
        )
        .payload(&SamlIdpPayload {
            name: request.name.clone(),
            metadata: request.metadata,
            metadata_url: request.metadata_url,
        })?
        .editor(&ctx.editor_user)
        .owner(&owner)
        .expected_version(0)
        .unique_constraint(UniqueConstraint::add(
            UNIQUE_IDP_NAMES,
            &idp_name_field(&owner, &request.name),
            "IDP-002",
            format!("idp name already taken: {}", request.name),
        ));
        self.push(ctx, vec![command]).await?;
        Ok(idp_id)
    }

    pub async fn change_saml_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        idp_id: &str,
        changes: SamlIdpChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(url) = &changes.metadata_url {
            validate_url(url)?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let idp = self.existing_idp(ctx, idp_id).await?;
                let saml = idp
                    .saml
                    .as_ref()
                    .ok_or_else(|| Error::invalid_argument("IDP-005", "not a saml idp"))?;

                let mut effective = changes;
                if effective.name.as_deref() == Some(idp.name.as_str()) {
                    effective.name = None;
                }
                if effective.metadata == saml.metadata {
                    effective.metadata = None;
                }
                if effective.metadata_url == saml.metadata_url {
                    effective.metadata_url = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let mut command = EventCommand::new(
                    IdpConfig::aggregate_type(),
                    idp_id,
                    &idp_event_type(scope, IDP_SAML_CHANGED_SUFFIX),
                )
                .editor(&ctx.editor_user)
                .owner(&idp.stream().resource_owner)
                .expected_version(idp.version());

                if let Some(new_name) = &effective.name {
                    let owner = idp.stream().resource_owner.clone();
                    command = command
                        .unique_constraint(UniqueConstraint::remove(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, &idp.name),
                        ))
                        .unique_constraint(UniqueConstraint::add(
                            UNIQUE_IDP_NAMES,
                            &idp_name_field(&owner, new_name),
                            "IDP-002",
                            format!("idp name already taken: {new_name}"),
                        ));
                }

                let command = command.payload(&effective)?;
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Remove any IDP regardless of its type.
    pub async fn remove_idp(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        idp_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let idp = self.existing_idp(ctx, idp_id).await?;
                let owner = idp.stream().resource_owner.clone();
                let command = EventCommand::new(
                    IdpConfig::aggregate_type(),
                    idp_id,
                    &idp_event_type(scope, IDP_REMOVED_SUFFIX),
                )
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(idp.version())
                .unique_constraint(UniqueConstraint::remove(
                    UNIQUE_IDP_NAMES,
                    &idp_name_field(&owner, &idp.name),
                ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn idp_owner(
        &self,
        ctx: &CommandContext,
        scope: Scope,
        org_id: Option<&str>,
    ) -> AppResult<String> {
        match scope {
            Scope::Instance => Ok(ctx.instance_id.clone()),
            Scope::Org => {
                let org_id = org_id.ok_or_else(|| {
                    Error::invalid_argument("IDP-006", "org id required for org idps")
                })?;
                self.existing_org(ctx, org_id).await?;
                Ok(org_id.to_string())
            }
        }
    }

    async fn existing_idp(&self, ctx: &CommandContext, idp_id: &str) -> AppResult<IdpConfig> {
        let idp: IdpConfig = self.load(&ctx.instance_id, idp_id).await?;
        if !idp.exists() || idp.state == IdpState::Removed {
            return Err(Error::not_found(
                "IDP-007",
                format!("idp not found: {idp_id}"),
            ));
        }
        Ok(idp)
    }
}

//! Session commands: classic and OIDC sessions, factor checks, and the
//! bulk termination paths (by user, by org, by client).

use chrono::{DateTime, Utc};

use crate::aggregate::org::{OrgSessionsTerminatedPayload, ORG_SESSIONS_TERMINATED};
use crate::aggregate::project::{AppConfig, AppSessionsTerminatedPayload, APP_SESSIONS_TERMINATED};
use crate::aggregate::session::{
    FactorCheckedPayload, OidcSessionAddedPayload, SessionAddedPayload, SessionState,
    SessionTerminatedPayload, SessionUpdatedPayload, SESSION_ADDED, SESSION_FACTOR_CHECKED,
    SESSION_OIDC_ADDED, SESSION_TERMINATED, SESSION_UPDATED,
};
use crate::aggregate::user::{UserSessionsTerminatedPayload, UserState, USER_SESSIONS_TERMINATED};
use crate::aggregate::{Aggregate, Org, Project, Session, User};
use crate::domain::validate_pkce;
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::app::UNIQUE_CLIENT_IDS;
use super::{CommandContext, Commands};

#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateOidcSessionRequest {
    pub user_id: Option<String>,
    pub client_id: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl Commands {
    /// Start a classic session, optionally bound to a user.
    pub async fn create_session(
        &self,
        ctx: &CommandContext,
        request: CreateSessionRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let owner = self.session_owner(ctx, request.user_id.as_deref()).await?;

        let session_id = self.next_id();
        let command = EventCommand::new(Session::aggregate_type(), &session_id, SESSION_ADDED)
            .payload(&SessionAddedPayload {
                user_id: request.user_id,
            })?
            .editor(&ctx.editor_user)
            .owner(&owner)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(session_id)
    }

    /// Start an OIDC session. The PKCE pair must come together, and the
    /// client ID must be claimed by an application of the instance.
    pub async fn create_oidc_session(
        &self,
        ctx: &CommandContext,
        request: CreateOidcSessionRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        validate_pkce(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;

        let known_client = self
            .store()
            .unique_exists(&ctx.instance_id, UNIQUE_CLIENT_IDS, &request.client_id)
            .await?;
        if !known_client {
            return Err(Error::not_found(
                "SESSION-006",
                format!("unknown client: {}", request.client_id),
            ));
        }

        let owner = self.session_owner(ctx, request.user_id.as_deref()).await?;

        let session_id = self.next_id();
        let command = EventCommand::new(Session::aggregate_type(), &session_id, SESSION_OIDC_ADDED)
            .payload(&OidcSessionAddedPayload {
                user_id: request.user_id,
                client_id: request.client_id,
                code_challenge: request.code_challenge,
                code_challenge_method: request.code_challenge_method,
            })?
            .editor(&ctx.editor_user)
            .owner(&owner)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(session_id)
    }

    /// Update token ID, AMR or auth time; identical values emit nothing.
    pub async fn update_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        changes: SessionUpdatedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let session = self.active_session(ctx, session_id).await?;

                let mut effective = changes;
                if effective.token_id == session.token_id {
                    effective.token_id = None;
                }
                if effective.amr.as_ref() == Some(&session.amr) {
                    effective.amr = None;
                }
                if effective.auth_time == session.auth_time {
                    effective.auth_time = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command =
                    EventCommand::new(Session::aggregate_type(), session_id, SESSION_UPDATED)
                        .payload(&effective)?
                        .editor(&ctx.editor_user)
                        .owner(&session.stream().resource_owner)
                        .expected_version(session.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Record a verified factor on the session.
    pub async fn check_session_factor(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        factor_type: &str,
        checked_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if factor_type.trim().is_empty() {
            return Err(Error::invalid_argument(
                "SESSION-007",
                "factor type must not be empty",
            ));
        }

        let session = self.active_session(ctx, session_id).await?;
        let command = EventCommand::new(Session::aggregate_type(), session_id, SESSION_FACTOR_CHECKED)
            .payload(&FactorCheckedPayload {
                factor_type: factor_type.to_string(),
                checked_at: checked_at.unwrap_or_else(|| self.now()),
            })?
            .editor(&ctx.editor_user)
            .owner(&session.stream().resource_owner)
            .expected_version(session.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    /// Terminate one session; terminating a terminated session is a no-op.
    pub async fn terminate_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let reason = reason.clone();
            Box::pin(async move {
                let session: Session = self.load(&ctx.instance_id, session_id).await?;
                if !session.exists() {
                    return Err(Error::not_found(
                        "SESSION-001",
                        format!("session not found: {session_id}"),
                    ));
                }
                if session.state == SessionState::Terminated {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Session::aggregate_type(), session_id, SESSION_TERMINATED)
                        .payload(&SessionTerminatedPayload { reason })?
                        .editor(&ctx.editor_user)
                        .owner(&session.stream().resource_owner)
                        .expected_version(session.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Global logout for one user: a single event on the user aggregate;
    /// the session projection fans it out to all of the user's sessions.
    pub async fn terminate_all_user_sessions(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let reason = reason.clone();
            Box::pin(async move {
                let user = self.existing_user(ctx, user_id).await?;
                let command =
                    EventCommand::new(User::aggregate_type(), user_id, USER_SESSIONS_TERMINATED)
                        .payload(&UserSessionsTerminatedPayload { reason })?
                        .editor(&ctx.editor_user)
                        .owner(&user.stream().resource_owner)
                        .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Global logout for a whole org.
    pub async fn terminate_all_org_sessions(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let reason = reason.clone();
            Box::pin(async move {
                let org: Org = self.existing_org(ctx, org_id).await?;
                let command =
                    EventCommand::new(Org::aggregate_type(), org_id, ORG_SESSIONS_TERMINATED)
                        .payload(&OrgSessionsTerminatedPayload { reason })?
                        .editor(&ctx.editor_user)
                        .owner(org_id)
                        .expected_version(org.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Backchannel logout for every session of one OIDC client.
    pub async fn terminate_client_sessions(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        app_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let app = project.app(app_id).ok_or_else(|| {
                    Error::not_found("APP-002", format!("application not found: {app_id}"))
                })?;
                let client_id = match &app.config {
                    AppConfig::Oidc(config) => config.client_id.clone(),
                    _ => {
                        return Err(Error::invalid_argument(
                            "APP-OIDC-003",
                            "not an OIDC application",
                        ))
                    }
                };
                let command = EventCommand::new(
                    Project::aggregate_type(),
                    project_id,
                    APP_SESSIONS_TERMINATED,
                )
                .payload(&AppSessionsTerminatedPayload {
                    app_id: app_id.to_string(),
                    client_id,
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

    /// Resource owner for a new session: the user's org when bound to a
    /// user (which must be active), the instance otherwise.
    async fn session_owner(
        &self,
        ctx: &CommandContext,
        user_id: Option<&str>,
    ) -> AppResult<String> {
        match user_id {
            Some(user_id) => {
                let user = self.existing_user(ctx, user_id).await?;
                if matches!(user.state, UserState::Locked | UserState::Inactive) {
                    return Err(Error::failed_precondition(
                        "SESSION-002",
                        "user cannot start sessions in its current state",
                    ));
                }
                Ok(user.stream().resource_owner.clone())
            }
            None => Ok(ctx.instance_id.clone()),
        }
    }

    /// Load a session that must exist and be active.
    async fn active_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
    ) -> AppResult<Session> {
        let session: Session = self.load(&ctx.instance_id, session_id).await?;
        if !session.exists() {
            return Err(Error::not_found(
                "SESSION-001",
                format!("session not found: {session_id}"),
            ));
        }
        if session.state != SessionState::Active {
            return Err(Error::failed_precondition(
                "SESSION-003",
                "session is not active",
            ));
        }
        Ok(session)
    }
}

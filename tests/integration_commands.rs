//! End-to-end command tests: orgs, users, projects, apps and sessions,
//! including the read models they materialize.

use janus_iam::aggregate::project::{OidcAppType, OidcAuthMethod};
use janus_iam::command::{
    AddHumanUserRequest, AddOidcAppRequest, CreateOidcSessionRequest, CreateSessionRequest,
};
use janus_iam::error::ErrorKind;
use janus_iam::event_store::EventFilter;

mod common;

fn human(org_id: &str, username: &str) -> AddHumanUserRequest {
    AddHumanUserRequest {
        org_id: org_id.to_string(),
        username: username.to_string(),
        first_name: "Alice".to_string(),
        last_name: "Smith".to_string(),
        display_name: None,
        preferred_language: Some("en".to_string()),
        email: format!("{username}@example.com"),
        phone: None,
        password: None,
    }
}

fn oidc_app(name: &str) -> AddOidcAppRequest {
    AddOidcAppRequest {
        name: name.to_string(),
        redirect_uris: vec!["https://x/cb".to_string()],
        response_types: vec!["code".to_string()],
        grant_types: vec!["authorization_code".to_string()],
        app_type: OidcAppType::Web,
        auth_method: OidcAuthMethod::Basic,
        post_logout_redirect_uris: vec![],
        dev_mode: false,
    }
}

#[tokio::test]
async fn test_org_lifecycle() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    env.commands
        .change_org(&env.ctx, &org_id, "Acme Corp")
        .await
        .unwrap();
    env.commands.deactivate_org(&env.ctx, &org_id).await.unwrap();
    env.commands.reactivate_org(&env.ctx, &org_id).await.unwrap();

    let events = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", &org_id))
        .await
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["org.added", "org.changed", "org.deactivated", "org.reactivated"]
    );

    env.project().await;
    let org = env
        .queries
        .org_by_id(env.instance_id(), &org_id)
        .await
        .unwrap()
        .expect("org row missing");
    assert_eq!(org.name, "Acme Corp");
    assert_eq!(org.state, "active");
}

#[tokio::test]
async fn test_change_org_to_same_name_emits_nothing() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    env.commands.change_org(&env.ctx, &org_id, "Acme").await.unwrap();

    let events = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", &org_id))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_duplicate_org_names_are_allowed() {
    let env = common::setup().await;

    let first = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let second = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_concurrent_org_changes_both_succeed() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();

    let (a, b) = tokio::join!(
        env.commands.change_org(&env.ctx, &org_id, "Acme One"),
        env.commands.change_org(&env.ctx, &org_id, "Acme Two"),
    );
    a.unwrap();
    b.unwrap();

    let events = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", &org_id))
        .await
        .unwrap();
    assert_eq!(events.len(), 3);
    let versions: Vec<i64> = events.iter().map(|e| e.aggregate_version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_primary_domain_requires_verification() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    env.commands
        .add_org_domain(&env.ctx, &org_id, "acme.com")
        .await
        .unwrap();

    let err = env
        .commands
        .set_primary_domain(&env.ctx, &org_id, "acme.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    assert!(err.message.contains("verified"));
}

#[tokio::test]
async fn test_human_user_email_verification_flow() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let user_id = env
        .commands
        .add_human_user(&env.ctx, human(&org_id, "alice"))
        .await
        .unwrap();

    // Wrong code: a check.failed event is recorded and the call errors.
    let err = env
        .commands
        .verify_email(&env.ctx, &user_id, "000000")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let events = env
        .store
        .query(
            EventFilter::aggregate(env.instance_id(), "user", &user_id)
                .event_types(&["user.human.email.check.failed"]),
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_duplicate_username_in_org_is_rejected() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    env.commands
        .add_human_user(&env.ctx, human(&org_id, "alice"))
        .await
        .unwrap();
    let err = env
        .commands
        .add_human_user(&env.ctx, human(&org_id, "alice"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
    assert_eq!(err.code, "USER-004");
}

#[tokio::test]
async fn test_grant_member_roles_roundtrip() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let granted_org = env.commands.add_org(&env.ctx, "Partner").await.unwrap();
    let user_id = env
        .commands
        .add_human_user(&env.ctx, human(&org_id, "alice"))
        .await
        .unwrap();

    let project_id = env
        .commands
        .add_project(&env.ctx, &org_id, "crm", false, false)
        .await
        .unwrap();
    env.commands
        .add_project_role(&env.ctx, &project_id, "VIEWER", None, None)
        .await
        .unwrap();
    env.commands
        .add_project_role(&env.ctx, &project_id, "ADMIN", None, None)
        .await
        .unwrap();
    let grant_id = env
        .commands
        .add_project_grant(
            &env.ctx,
            &project_id,
            &granted_org,
            vec!["VIEWER".to_string(), "ADMIN".to_string()],
        )
        .await
        .unwrap();

    env.commands
        .add_project_grant_member(
            &env.ctx,
            &project_id,
            &grant_id,
            &user_id,
            vec!["VIEWER".to_string()],
        )
        .await
        .unwrap();
    env.commands
        .change_project_grant_member(
            &env.ctx,
            &project_id,
            &grant_id,
            &user_id,
            vec!["ADMIN".to_string(), "VIEWER".to_string()],
        )
        .await
        .unwrap();

    env.project().await;
    let member = env
        .queries
        .project_grant_member(env.instance_id(), &project_id, &grant_id, &user_id)
        .await
        .unwrap()
        .expect("grant member missing");
    let mut roles = member.roles.clone();
    roles.sort();
    assert_eq!(roles, vec!["ADMIN", "VIEWER"]);

    // A second identical change emits no event.
    let before = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "project", &project_id))
        .await
        .unwrap()
        .len();
    env.commands
        .change_project_grant_member(
            &env.ctx,
            &project_id,
            &grant_id,
            &user_id,
            vec!["VIEWER".to_string(), "ADMIN".to_string()],
        )
        .await
        .unwrap();
    let after = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "project", &project_id))
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_oidc_app_lookup_by_client_id() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let project_id = env
        .commands
        .add_project(&env.ctx, &org_id, "crm", false, false)
        .await
        .unwrap();
    let created = env
        .commands
        .add_oidc_app(&env.ctx, &project_id, oidc_app("web login"))
        .await
        .unwrap();

    env.project().await;
    let (app, config) = env
        .queries
        .oidc_app_by_client_id(env.instance_id(), &created.client_id)
        .await
        .unwrap()
        .expect("oidc app missing");
    assert_eq!(app.app_type, "oidc");
    assert_eq!(app.state, "active");
    assert_eq!(config.redirect_uris, vec!["https://x/cb"]);
}

#[tokio::test]
async fn test_api_app_auth_method_rules() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let project_id = env
        .commands
        .add_project(&env.ctx, &org_id, "crm", false, false)
        .await
        .unwrap();
    let api = env
        .commands
        .add_api_app(
            &env.ctx,
            &project_id,
            "backend",
            janus_iam::aggregate::project::ApiAuthMethod::Basic,
        )
        .await
        .unwrap();
    let oidc = env
        .commands
        .add_oidc_app(&env.ctx, &project_id, oidc_app("web login"))
        .await
        .unwrap();

    let err = env
        .commands
        .change_api_app_auth_method(&env.ctx, &project_id, &api.app_id, OidcAuthMethod::None)
        .await
        .unwrap_err();
    assert!(err.message.contains("invalid auth method for API app"));

    let err = env
        .commands
        .change_api_app_auth_method(
            &env.ctx,
            &project_id,
            &oidc.app_id,
            OidcAuthMethod::PrivateKeyJwt,
        )
        .await
        .unwrap_err();
    assert!(err.message.contains("not an API application"));
}

#[tokio::test]
async fn test_non_native_oidc_app_requires_redirect_uri() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let project_id = env
        .commands
        .add_project(&env.ctx, &org_id, "crm", false, false)
        .await
        .unwrap();

    let mut request = oidc_app("web login");
    request.redirect_uris.clear();
    let err = env
        .commands
        .add_oidc_app(&env.ctx, &project_id, request)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_oidc_session_requires_full_pkce_pair() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let project_id = env
        .commands
        .add_project(&env.ctx, &org_id, "crm", false, false)
        .await
        .unwrap();
    let created = env
        .commands
        .add_oidc_app(&env.ctx, &project_id, oidc_app("web login"))
        .await
        .unwrap();

    let err = env
        .commands
        .create_oidc_session(
            &env.ctx,
            CreateOidcSessionRequest {
                user_id: None,
                client_id: created.client_id.clone(),
                code_challenge: Some("x".to_string()),
                code_challenge_method: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.message.contains("codeChallengeMethod required with codeChallenge"));

    let session_id = env
        .commands
        .create_oidc_session(
            &env.ctx,
            CreateOidcSessionRequest {
                user_id: None,
                client_id: created.client_id,
                code_challenge: Some("x".to_string()),
                code_challenge_method: Some("S256".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(!session_id.is_empty());
}

#[tokio::test]
async fn test_projection_apply_is_idempotent() {
    use janus_iam::projection::{OrgProjection, Projection};

    let env = common::setup().await;
    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    env.commands
        .change_org(&env.ctx, &org_id, "Acme Corp")
        .await
        .unwrap();

    let events = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", &org_id))
        .await
        .unwrap();

    // Applying the same events twice is equivalent to applying them once.
    let projection = OrgProjection;
    let mut tx = env.pool.begin().await.unwrap();
    for _ in 0..2 {
        for event in &events {
            projection.apply(&mut tx, event).await.unwrap();
        }
    }
    tx.commit().await.unwrap();

    let org = env
        .queries
        .org_by_id(env.instance_id(), &org_id)
        .await
        .unwrap()
        .expect("org row missing");
    assert_eq!(org.name, "Acme Corp");
    assert_eq!(org.state, "active");
}

#[tokio::test]
async fn test_global_user_logout() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let user_id = env
        .commands
        .add_human_user(&env.ctx, human(&org_id, "alice"))
        .await
        .unwrap();

    for _ in 0..3 {
        env.commands
            .create_session(
                &env.ctx,
                CreateSessionRequest {
                    user_id: Some(user_id.clone()),
                },
            )
            .await
            .unwrap();
    }

    env.commands
        .terminate_all_user_sessions(&env.ctx, &user_id, Some("security incident".to_string()))
        .await
        .unwrap();

    env.project().await;
    assert_eq!(
        env.queries
            .active_session_count(env.instance_id(), &user_id)
            .await
            .unwrap(),
        0
    );
    let sessions = env
        .queries
        .sessions_by_user(env.instance_id(), &user_id)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| s.state == "terminated"));
}

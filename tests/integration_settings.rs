//! End-to-end tests for instance settings: SMTP/SMS configs, actions,
//! executions, policies, IDPs, web keys and encryption keys.

use janus_iam::aggregate::policy::{PolicyKind, PolicyPayload};
use janus_iam::aggregate::web_key::WebKeyConfig;
use janus_iam::aggregate::Scope;
use janus_iam::command::{AddSmtpConfigRequest, AddOidcIdpRequest};
use janus_iam::crypto::EncryptionKeys;
use janus_iam::domain::PasswordComplexityPolicy;
use janus_iam::error::ErrorKind;
use janus_iam::event_store::EventFilter;

mod common;

fn smtp_request() -> AddSmtpConfigRequest {
    AddSmtpConfigRequest {
        description: Some("primary".to_string()),
        sender_address: "no-reply@acme.com".to_string(),
        sender_name: Some("Acme".to_string()),
        reply_to_address: None,
        host: "smtp.acme.com:587".to_string(),
        user: Some("mailer".to_string()),
        tls: true,
    }
}

#[tokio::test]
async fn test_smtp_activation_is_idempotent() {
    let env = common::setup().await;

    let config_id = env
        .commands
        .add_smtp_config(&env.ctx, smtp_request())
        .await
        .unwrap();
    env.commands
        .activate_smtp_config(&env.ctx, &config_id)
        .await
        .unwrap();

    let before = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "smtp_config", &config_id))
        .await
        .unwrap()
        .len();

    // Second activation emits nothing.
    env.commands
        .activate_smtp_config(&env.ctx, &config_id)
        .await
        .unwrap();
    let after = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "smtp_config", &config_id))
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);

    env.project().await;
    let config = env
        .queries
        .smtp_config_by_id(env.instance_id(), &config_id)
        .await
        .unwrap()
        .expect("smtp config missing");
    assert_eq!(config.state, "active");
}

#[tokio::test]
async fn test_activating_second_smtp_config_deactivates_first() {
    let env = common::setup().await;

    let first = env
        .commands
        .add_smtp_config(&env.ctx, smtp_request())
        .await
        .unwrap();
    let second = env
        .commands
        .add_smtp_config(&env.ctx, smtp_request())
        .await
        .unwrap();

    env.commands.activate_smtp_config(&env.ctx, &first).await.unwrap();
    env.commands.activate_smtp_config(&env.ctx, &second).await.unwrap();

    env.project().await;
    let active = env
        .queries
        .active_smtp_config(env.instance_id())
        .await
        .unwrap()
        .expect("no active smtp config");
    assert_eq!(active.id, second);
}

#[tokio::test]
async fn test_instance_action_lifecycle_rules() {
    let env = common::setup().await;

    env.commands
        .add_instance_action_with_id(&env.ctx, "act-1", "sync", "run()", 10, false)
        .await
        .unwrap();

    // Same ID while live fails.
    let err = env
        .commands
        .add_instance_action_with_id(&env.ctx, "act-1", "sync2", "run()", 10, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
    assert!(err.message.contains("instance action already exists"));

    env.commands
        .deactivate_instance_action(&env.ctx, "act-1")
        .await
        .unwrap();

    // Deactivating a non-active action fails.
    let err = env
        .commands
        .deactivate_instance_action(&env.ctx, "act-1")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    assert!(err.message.contains("instance action is not active"));

    // After removal the ID can be reused.
    env.commands
        .reactivate_instance_action(&env.ctx, "act-1")
        .await
        .unwrap();
    env.commands
        .remove_instance_action(&env.ctx, "act-1")
        .await
        .unwrap();
    env.commands
        .add_instance_action_with_id(&env.ctx, "act-1", "sync", "run()", 10, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_policy_add_change_remove_rules() {
    let env = common::setup().await;

    let policy = PolicyPayload::PasswordComplexity(PasswordComplexityPolicy {
        min_length: 12,
        ..Default::default()
    });

    let err = env
        .commands
        .change_policy(&env.ctx, Scope::Instance, None, policy.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    env.commands
        .add_policy(&env.ctx, Scope::Instance, None, policy.clone())
        .await
        .unwrap();
    let err = env
        .commands
        .add_policy(&env.ctx, Scope::Instance, None, policy.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);

    // Changing to identical values emits nothing.
    let before = env
        .store
        .query(EventFilter::instance(env.instance_id()).event_type_prefix("instance.policy."))
        .await
        .unwrap()
        .len();
    env.commands
        .change_policy(&env.ctx, Scope::Instance, None, policy)
        .await
        .unwrap();
    let after = env
        .store
        .query(EventFilter::instance(env.instance_id()).event_type_prefix("instance.policy."))
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);

    env.commands
        .remove_policy(&env.ctx, Scope::Instance, None, PolicyKind::PasswordComplexity)
        .await
        .unwrap();
    let err = env
        .commands
        .remove_policy(&env.ctx, Scope::Instance, None, PolicyKind::PasswordComplexity)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_org_policy_overrides_instance_default() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();

    env.commands
        .add_policy(
            &env.ctx,
            Scope::Instance,
            None,
            PolicyPayload::PasswordComplexity(PasswordComplexityPolicy {
                min_length: 8,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    env.commands
        .add_policy(
            &env.ctx,
            Scope::Org,
            Some(&org_id),
            PolicyPayload::PasswordComplexity(PasswordComplexityPolicy {
                min_length: 16,
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    env.project().await;
    let effective = env
        .queries
        .effective_policy(env.instance_id(), &org_id, "password.complexity")
        .await
        .unwrap()
        .expect("policy missing");
    assert!(!effective.is_default);
    assert_eq!(effective.payload["min_length"], 16);

    let other_org = env.commands.add_org(&env.ctx, "Other").await.unwrap();
    env.project().await;
    let fallback = env
        .queries
        .effective_policy(env.instance_id(), &other_org, "password.complexity")
        .await
        .unwrap()
        .expect("default policy missing");
    assert!(fallback.is_default);
    assert_eq!(fallback.payload["min_length"], 8);
}

#[tokio::test]
async fn test_idp_roundtrip() {
    let env = common::setup().await;

    let org_id = env.commands.add_org(&env.ctx, "Acme").await.unwrap();
    let idp_id = env
        .commands
        .add_oidc_idp(
            &env.ctx,
            Scope::Org,
            Some(&org_id),
            AddOidcIdpRequest {
                name: "corp sso".to_string(),
                issuer: "https://issuer.example.com".to_string(),
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                scopes: vec!["openid".to_string()],
            },
        )
        .await
        .unwrap();

    env.project().await;
    let idp = env
        .queries
        .idp_by_id(env.instance_id(), &idp_id)
        .await
        .unwrap()
        .expect("idp missing");
    assert_eq!(idp.idp_type, "oidc");
    assert_eq!(idp.name, "corp sso");

    env.commands
        .remove_idp(&env.ctx, Scope::Org, &idp_id)
        .await
        .unwrap();
    env.project().await;
    assert!(env
        .queries
        .idp_by_id(env.instance_id(), &idp_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_web_key_state_machine() {
    let env = common::setup().await;

    let key_id = env
        .commands
        .generate_web_key(
            &env.ctx,
            WebKeyConfig::Rsa {
                bits: 2048,
                hasher: "sha256".to_string(),
            },
        )
        .await
        .unwrap();

    // Cannot deactivate a key that is not active.
    let err = env
        .commands
        .deactivate_web_key(&env.ctx, &key_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);

    env.commands.activate_web_key(&env.ctx, &key_id).await.unwrap();

    // Cannot activate twice or remove while active.
    let err = env
        .commands
        .activate_web_key(&env.ctx, &key_id)
        .await
        .unwrap_err();
    assert!(err.message.contains("already active"));
    let err = env.commands.remove_web_key(&env.ctx, &key_id).await.unwrap_err();
    assert!(err.message.contains("active web key cannot be removed"));

    // Activating a second key rotates the first one out.
    let second = env
        .commands
        .generate_web_key(&env.ctx, WebKeyConfig::Ed25519)
        .await
        .unwrap();
    env.commands.activate_web_key(&env.ctx, &second).await.unwrap();

    env.project().await;
    let active = env
        .queries
        .web_keys_by_state(env.instance_id(), "active")
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second);

    env.commands.remove_web_key(&env.ctx, &key_id).await.unwrap();
}

#[tokio::test]
async fn test_encryption_key_records() {
    let env = common::setup().await;
    let keys = EncryptionKeys::new(env.pool.clone());

    keys.add(env.instance_id(), "signing-v1", "opaque-material")
        .await
        .unwrap();
    let err = keys
        .add(env.instance_id(), "signing-v1", "other")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);

    let key = keys.get(env.instance_id(), "signing-v1").await.unwrap();
    assert_eq!(key.key_data, "opaque-material");

    keys.add(env.instance_id(), "signing-v2", "more-material")
        .await
        .unwrap();
    assert_eq!(keys.list(env.instance_id()).await.unwrap().len(), 2);

    keys.remove(env.instance_id(), "signing-v1").await.unwrap();
    let err = keys.get(env.instance_id(), "signing-v1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

//! Integration tests for the event store

use rust_decimal::Decimal;
use serde_json::json;

use janus_iam::event_store::{EventCommand, EventFilter, EventStoreError, UniqueConstraint};

mod common;

fn org_added(org_id: &str, name: &str) -> EventCommand {
    EventCommand::new("org", org_id, "org.added")
        .payload(&json!({ "name": name }))
        .unwrap()
        .editor("test-admin")
        .owner(org_id)
        .expected_version(0)
}

#[tokio::test]
async fn test_push_and_query() {
    let env = common::setup().await;

    let events = env
        .store
        .push(env.instance_id(), vec![org_added("o1", "Acme")])
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate_version, 1);
    assert_eq!(events[0].in_position_order, 0);
    assert!(events[0].position > Decimal::ZERO);

    let stored = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", "o1"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_type, "org.added");
    assert_eq!(stored[0].payload["name"], "Acme");
    assert_eq!(stored[0].editor_user, "test-admin");
}

#[tokio::test]
async fn test_multi_event_push_shares_position() {
    let env = common::setup().await;

    let commands = vec![
        org_added("o1", "Acme"),
        EventCommand::new("org", "o1", "org.domain.added")
            .payload(&json!({ "domain": "acme.com" }))
            .unwrap()
            .editor("test-admin")
            .owner("o1"),
        EventCommand::new("org", "o1", "org.domain.verified")
            .payload(&json!({ "domain": "acme.com" }))
            .unwrap()
            .editor("test-admin")
            .owner("o1"),
    ];

    let events = env.store.push(env.instance_id(), commands).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.position == events[0].position));
    let orders: Vec<i32> = events.iter().map(|e| e.in_position_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
    let versions: Vec<i64> = events.iter().map(|e| e.aggregate_version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_concurrency_conflict_on_stale_version() {
    let env = common::setup().await;

    env.store
        .push(env.instance_id(), vec![org_added("o1", "Acme")])
        .await
        .unwrap();

    // Stale expectation: aggregate is at version 1, we claim 0.
    let stale = EventCommand::new("org", "o1", "org.changed")
        .payload(&json!({ "name": "Other" }))
        .unwrap()
        .editor("test-admin")
        .owner("o1")
        .expected_version(0);

    let err = env
        .store
        .push(env.instance_id(), vec![stale])
        .await
        .unwrap_err();
    assert!(matches!(err, EventStoreError::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn test_position_strictly_increases() {
    let env = common::setup().await;

    let before = env.store.latest_position(env.instance_id()).await.unwrap();
    env.store
        .push(env.instance_id(), vec![org_added("o1", "Acme")])
        .await
        .unwrap();
    let middle = env.store.latest_position(env.instance_id()).await.unwrap();
    env.store
        .push(env.instance_id(), vec![org_added("o2", "Umbrella")])
        .await
        .unwrap();
    let after = env.store.latest_position(env.instance_id()).await.unwrap();

    assert!(middle > before);
    assert!(after > middle);
}

#[tokio::test]
async fn test_aggregate_versions_have_no_gaps() {
    let env = common::setup().await;

    env.store
        .push(env.instance_id(), vec![org_added("o1", "Acme")])
        .await
        .unwrap();
    for name in ["A", "B", "C"] {
        let change = EventCommand::new("org", "o1", "org.changed")
            .payload(&json!({ "name": name }))
            .unwrap()
            .editor("test-admin")
            .owner("o1");
        env.store.push(env.instance_id(), vec![change]).await.unwrap();
    }

    let events = env
        .store
        .query(EventFilter::aggregate(env.instance_id(), "org", "o1"))
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.aggregate_version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_unknown_instance_is_rejected() {
    let env = common::setup().await;

    let err = env
        .store
        .push("no-such-instance", vec![org_added("o1", "Acme")])
        .await
        .unwrap_err();
    assert!(matches!(err, EventStoreError::TenantMissing(_)));
}

#[tokio::test]
async fn test_unique_constraint_conflict() {
    let env = common::setup().await;

    let claim = |org: &str| {
        org_added(org, "Acme").unique_constraint(UniqueConstraint::add(
            "org_names",
            "acme",
            "ORG-TEST-001",
            "org name already taken",
        ))
    };

    env.store
        .push(env.instance_id(), vec![claim("o1")])
        .await
        .unwrap();
    let err = env
        .store
        .push(env.instance_id(), vec![claim("o2")])
        .await
        .unwrap_err();
    match err {
        EventStoreError::UniqueViolation { code, .. } => assert_eq!(code, "ORG-TEST-001"),
        other => panic!("expected unique violation, got {other:?}"),
    }

    assert!(env
        .store
        .unique_exists(env.instance_id(), "org_names", "acme")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_query_filters() {
    let env = common::setup().await;

    env.store
        .push(
            env.instance_id(),
            vec![
                org_added("o1", "Acme"),
                EventCommand::new("org", "o1", "org.domain.added")
                    .payload(&json!({ "domain": "acme.com" }))
                    .unwrap()
                    .editor("test-admin")
                    .owner("o1"),
            ],
        )
        .await
        .unwrap();
    env.store
        .push(env.instance_id(), vec![org_added("o2", "Umbrella")])
        .await
        .unwrap();

    let domain_events = env
        .store
        .query(
            EventFilter::instance(env.instance_id()).event_type_prefix("org.domain."),
        )
        .await
        .unwrap();
    assert_eq!(domain_events.len(), 1);

    let latest = env
        .store
        .query(EventFilter::instance(env.instance_id()).descending().limit(1))
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].aggregate_id, "o2");

    let by_type = env
        .store
        .query(EventFilter::instance(env.instance_id()).event_types(&["org.added"]))
        .await
        .unwrap();
    assert_eq!(by_type.len(), 2);
}

#[tokio::test]
async fn test_subscription_delivers_catch_up_and_live_events() {
    let env = common::setup().await;

    env.store
        .push(env.instance_id(), vec![org_added("o1", "Acme")])
        .await
        .unwrap();

    let mut stream = env.store.subscribe(env.instance_id(), Decimal::ZERO);

    let first = tokio::time::timeout(std::time::Duration::from_secs(5), stream.recv())
        .await
        .expect("timed out waiting for catch-up event")
        .expect("stream closed");
    assert_eq!(first.event_type, "org.added");

    env.store
        .push(env.instance_id(), vec![org_added("o2", "Umbrella")])
        .await
        .unwrap();

    let second = tokio::time::timeout(std::time::Duration::from_secs(5), stream.recv())
        .await
        .expect("timed out waiting for live event")
        .expect("stream closed");
    assert_eq!(second.aggregate_id, "o2");
}

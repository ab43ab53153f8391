//! Event Store
//!
//! Core implementation of the append-only, totally-ordered event log.
//! Provides atomic multi-event push with optimistic concurrency control,
//! per-instance position allocation and position-based subscriptions.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{broadcast, mpsc};

use super::{Event, EventCommand, EventFilter, EventStoreError, UniqueConstraintAction};

const SUBSCRIPTION_BATCH: i64 = 256;
const SUBSCRIPTION_POLL: Duration = Duration::from_secs(1);

/// Best-effort wakeup fired after a push commits.
#[derive(Debug, Clone)]
pub struct Notification {
    pub instance_id: String,
    pub position: Decimal,
}

/// Event Store for persisting and retrieving events
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
    wakeup: broadcast::Sender<Notification>,
}

impl EventStore {
    /// Create a new EventStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        let (wakeup, _) = broadcast::channel(1024);
        Self { pool, wakeup }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a tenant. Mostly used by setup and tests; production
    /// instances are provisioned out of band.
    pub async fn ensure_instance(&self, instance_id: &str, name: &str) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            INSERT INTO instances (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically append the given commands as events.
    ///
    /// All events share one freshly allocated base position and are ordered
    /// by `in_position_order`. Per aggregate, the first command's
    /// `expected_version` is checked against the stored max version; later
    /// commands for the same aggregate stack on top within the push.
    pub async fn push(
        &self,
        instance_id: &str,
        commands: Vec<EventCommand>,
    ) -> Result<Vec<Event>, EventStoreError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        let known: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM instances WHERE id = $1)")
            .bind(instance_id)
            .fetch_one(&mut *tx)
            .await?;
        if !known {
            return Err(EventStoreError::TenantMissing(instance_id.to_string()));
        }

        // Allocating the base position locks the instance's counter row
        // until commit, which makes positions gap-free and commit-visible
        // in order.
        let position: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO event_positions (instance_id, position)
            VALUES ($1, 1)
            ON CONFLICT (instance_id)
            DO UPDATE SET position = event_positions.position + 1
            RETURNING position
            "#,
        )
        .bind(instance_id)
        .fetch_one(&mut *tx)
        .await?;

        let creation_date = Utc::now();
        let mut versions: HashMap<(String, String), i64> = HashMap::new();
        let mut events = Vec::with_capacity(commands.len());

        for (idx, cmd) in commands.into_iter().enumerate() {
            let key = (cmd.aggregate_type.clone(), cmd.aggregate_id.clone());

            let current = match versions.get(&key) {
                Some(v) => *v,
                None => {
                    let stored = self
                        .current_version(&mut tx, instance_id, &cmd.aggregate_type, &cmd.aggregate_id)
                        .await?;
                    if let Some(expected) = cmd.expected_version {
                        if stored != expected {
                            return Err(EventStoreError::ConcurrencyConflict {
                                aggregate_type: cmd.aggregate_type,
                                aggregate_id: cmd.aggregate_id,
                                expected,
                                actual: stored,
                            });
                        }
                    }
                    stored
                }
            };

            for constraint in &cmd.unique_constraints {
                match constraint.action {
                    UniqueConstraintAction::Add => {
                        let result = sqlx::query(
                            r#"
                            INSERT INTO unique_constraints (instance_id, unique_type, unique_field)
                            VALUES ($1, $2, $3)
                            "#,
                        )
                        .bind(instance_id)
                        .bind(&constraint.unique_type)
                        .bind(&constraint.unique_field)
                        .execute(&mut *tx)
                        .await;

                        match result {
                            Ok(_) => {}
                            Err(e) if is_unique_violation(&e) => {
                                return Err(EventStoreError::UniqueViolation {
                                    code: constraint.error_code,
                                    message: constraint.error_message.clone(),
                                });
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    UniqueConstraintAction::Remove => {
                        sqlx::query(
                            r#"
                            DELETE FROM unique_constraints
                            WHERE instance_id = $1 AND unique_type = $2 AND unique_field = $3
                            "#,
                        )
                        .bind(instance_id)
                        .bind(&constraint.unique_type)
                        .bind(&constraint.unique_field)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }

            let aggregate_version = current + 1;
            versions.insert(key, aggregate_version);

            let event = Event {
                instance_id: instance_id.to_string(),
                aggregate_type: cmd.aggregate_type,
                aggregate_id: cmd.aggregate_id,
                aggregate_version,
                event_type: cmd.event_type,
                revision: cmd.revision,
                payload: cmd.payload,
                editor_user: cmd.editor_user,
                resource_owner: cmd.resource_owner,
                position,
                in_position_order: idx as i32,
                creation_date,
            };

            let insert = sqlx::query(
                r#"
                INSERT INTO events (
                    instance_id, aggregate_type, aggregate_id, aggregate_version,
                    event_type, revision, payload, editor_user, resource_owner,
                    position, in_position_order, creation_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(&event.instance_id)
            .bind(&event.aggregate_type)
            .bind(&event.aggregate_id)
            .bind(event.aggregate_version)
            .bind(&event.event_type)
            .bind(event.revision)
            .bind(&event.payload)
            .bind(&event.editor_user)
            .bind(&event.resource_owner)
            .bind(event.position)
            .bind(event.in_position_order)
            .bind(event.creation_date)
            .execute(&mut *tx)
            .await;

            match insert {
                Ok(_) => {}
                // A racing writer got the version first.
                Err(e) if is_unique_violation(&e) => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_type: event.aggregate_type,
                        aggregate_id: event.aggregate_id,
                        expected: current,
                        actual: aggregate_version,
                    });
                }
                Err(e) => return Err(e.into()),
            }

            events.push(event);
        }

        tx.commit().await?;

        let _ = self.wakeup.send(Notification {
            instance_id: instance_id.to_string(),
            position,
        });

        tracing::debug!(
            instance_id,
            %position,
            count = events.len(),
            "pushed events"
        );

        Ok(events)
    }

    /// Check whether a cross-aggregate uniqueness claim is currently held.
    pub async fn unique_exists(
        &self,
        instance_id: &str,
        unique_type: &str,
        unique_field: &str,
    ) -> Result<bool, EventStoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM unique_constraints
                WHERE instance_id = $1 AND unique_type = $2 AND unique_field = $3
            )
            "#,
        )
        .bind(instance_id)
        .bind(unique_type)
        .bind(unique_field)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Retrieve events matching the filter, in `(position, in_position_order)`
    /// order.
    pub async fn query(&self, filter: EventFilter) -> Result<Vec<Event>, EventStoreError> {
        let mut qb = filter.build_query();
        let events = qb
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    /// Highest position pushed for the instance, zero when empty.
    pub async fn latest_position(&self, instance_id: &str) -> Result<Decimal, EventStoreError> {
        let position: Option<Decimal> =
            sqlx::query_scalar("SELECT MAX(position) FROM events WHERE instance_id = $1")
                .bind(instance_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(position.unwrap_or(Decimal::ZERO))
    }

    /// Post-commit wakeup notifications; best effort, receivers must
    /// still poll to be safe against lagging.
    pub fn wakeups(&self) -> broadcast::Receiver<Notification> {
        self.wakeup.subscribe()
    }

    /// Follow the instance's stream from (exclusive) `from_position`.
    ///
    /// The receiver first drains stored events, then follows live pushes;
    /// dropping it ends the subscription. Resume by subscribing again with
    /// the last seen cursor.
    pub fn subscribe(&self, instance_id: &str, from_position: Decimal) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BATCH as usize);
        let store = self.clone();
        let instance = instance_id.to_string();

        tokio::spawn(async move {
            let mut wakeups = store.wakeup.subscribe();
            // Strictly greater positions only.
            let mut cursor = (from_position, i32::MAX);

            loop {
                if tx.is_closed() {
                    return;
                }

                let filter = EventFilter::instance(&instance)
                    .after(cursor.0, cursor.1)
                    .limit(SUBSCRIPTION_BATCH);

                match store.query(filter).await {
                    Ok(events) if !events.is_empty() => {
                        for event in events {
                            cursor = (event.position, event.in_position_order);
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => {
                        wait_for_wakeup(&mut wakeups, &instance).await;
                    }
                    Err(e) => {
                        tracing::warn!(instance_id = %instance, error = %e, "subscription query failed");
                        tokio::time::sleep(SUBSCRIPTION_POLL).await;
                    }
                }
            }
        });

        rx
    }

    async fn current_version(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        instance_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<i64, EventStoreError> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(aggregate_version) FROM events
            WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
            "#,
        )
        .bind(instance_id)
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(version.unwrap_or(0))
    }
}

/// Block until a push for this instance lands or the poll interval elapses.
async fn wait_for_wakeup(wakeups: &mut broadcast::Receiver<Notification>, instance_id: &str) {
    let _ = tokio::time::timeout(SUBSCRIPTION_POLL, async {
        loop {
            match wakeups.recv().await {
                Ok(n) if n.instance_id == instance_id => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

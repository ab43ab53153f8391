//! Projection supervisor and workers
//!
//! One tokio task per registered projection. A worker drains batches per
//! instance, applying handlers and the cursor advance in one transaction.
//! Errors never advance the cursor; the batch is retried with backoff.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::event_store::{EventFilter, EventStore};

use super::state::{load_cursor, save_cursor, ProjectionCursor};
use super::{all_projections, Projection};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Owns one worker per registered projection.
pub struct Supervisor {
    pool: PgPool,
    store: EventStore,
    projections: Vec<Arc<dyn Projection>>,
    batch_size: i64,
    poll_interval: Duration,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Supervisor over the standard projection set.
    pub fn new(pool: PgPool, store: EventStore) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool,
            store,
            projections: all_projections(),
            batch_size: 200,
            poll_interval: Duration::from_secs(1),
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replace the registered projections (used by tests to run a subset).
    pub fn with_projections(mut self, projections: Vec<Arc<dyn Projection>>) -> Self {
        self.projections = projections;
        self
    }

    /// Spawn one worker per projection.
    pub fn start(&mut self) {
        for projection in &self.projections {
            let worker = Worker {
                pool: self.pool.clone(),
                store: self.store.clone(),
                projection: Arc::clone(projection),
                batch_size: self.batch_size,
                poll_interval: self.poll_interval,
            };
            let shutdown_rx = self.shutdown.subscribe();
            self.handles.push(tokio::spawn(worker.run(shutdown_rx)));
        }
        tracing::info!(count = self.projections.len(), "projection workers started");
    }

    /// Drain every projection to the head of the stream without spawning
    /// workers. Used for initial catch-up and by tests.
    pub async fn catch_up(&self) -> AppResult<()> {
        loop {
            let mut progressed = false;
            for projection in &self.projections {
                let worker = Worker {
                    pool: self.pool.clone(),
                    store: self.store.clone(),
                    projection: Arc::clone(projection),
                    batch_size: self.batch_size,
                    poll_interval: self.poll_interval,
                };
                progressed |= worker.tick().await?;
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Signal shutdown and wait for every worker to finish its batch.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("projection workers stopped");
    }
}

struct Worker {
    pool: PgPool,
    store: EventStore,
    projection: Arc<dyn Projection>,
    batch_size: i64,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut wakeups = self.store.wakeups();

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.tick().await {
                Ok(true) => {
                    // More events may be pending; keep draining.
                }
                Ok(false) => {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = wakeups.recv() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(err) => {
                    tracing::error!(
                        projection = self.projection.name(),
                        error = %err,
                        "projection batch failed"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// Process one batch per instance; returns whether anything advanced.
    async fn tick(&self) -> AppResult<bool> {
        let instances: Vec<String> = sqlx::query_scalar("SELECT id FROM instances ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut progressed = false;
        for instance_id in instances {
            progressed |= self.advance_instance(&instance_id).await?;
        }
        Ok(progressed)
    }

    async fn advance_instance(&self, instance_id: &str) -> AppResult<bool> {
        let cursor = load_cursor(&self.pool, self.projection.name(), instance_id).await?;

        let filter = EventFilter::instance(instance_id)
            .event_types(self.projection.interests())
            .after(cursor.position, cursor.in_position_order)
            .limit(self.batch_size);
        let events = self.store.query(filter).await?;
        if events.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        let mut last = cursor;
        for event in &events {
            self.projection.apply(&mut tx, event).await?;
            last = ProjectionCursor {
                position: event.position,
                in_position_order: event.in_position_order,
            };
        }
        save_cursor(&mut tx, self.projection.name(), instance_id, last).await?;
        tx.commit().await?;

        tracing::debug!(
            projection = self.projection.name(),
            instance_id,
            applied = events.len(),
            position = %last.position,
            "projection advanced"
        );
        Ok(true)
    }
}

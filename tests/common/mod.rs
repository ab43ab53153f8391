//! Common test utilities
//!
//! Every test runs in its own freshly registered tenant, so tests are
//! isolated by instance_id and never need to truncate shared tables.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use janus_iam::command::{CommandContext, Commands};
use janus_iam::event_store::EventStore;
use janus_iam::projection::Supervisor;
use janus_iam::query::Queries;

pub struct TestEnv {
    pub pool: PgPool,
    pub store: EventStore,
    pub commands: Commands,
    pub queries: Queries,
    pub ctx: CommandContext,
}

impl TestEnv {
    pub fn instance_id(&self) -> &str {
        &self.ctx.instance_id
    }

    /// Drain all projections to the head of the stream.
    pub async fn project(&self) {
        Supervisor::new(self.pool.clone(), self.store.clone())
            .catch_up()
            .await
            .expect("projection catch-up failed");
    }
}

/// Connect and register a fresh tenant for this test.
pub async fn setup() -> TestEnv {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let instance_id = format!("inst-{}", Uuid::new_v4());
    let store = EventStore::new(pool.clone());
    store
        .ensure_instance(&instance_id, "test instance")
        .await
        .expect("Failed to register test instance");

    let commands = Commands::new(store.clone());
    let queries = Queries::new(pool.clone());
    let ctx = CommandContext::new(&instance_id, "test-admin");

    TestEnv {
        pool,
        store,
        commands,
        queries,
        ctx,
    }
}

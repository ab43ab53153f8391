//! Aggregate module
//!
//! Write models reduced from event streams. Reducers are pure: they fold
//! events into typed state, ignore unknown event types and never do I/O.

pub mod action;
pub mod idp;
pub mod notify;
pub mod org;
pub mod policy;
pub mod project;
pub mod session;
pub mod user;
pub mod web_key;

use rust_decimal::Decimal;

use crate::error::AppResult;
use crate::event_store::Event;

pub use action::{Execution, InstanceAction};
pub use idp::IdpConfig;
pub use notify::{SmsConfig, SmtpConfig};
pub use org::Org;
pub use policy::PolicySet;
pub use project::Project;
pub use session::Session;
pub use user::User;
pub use web_key::WebKey;

/// Aggregate trait that all write models implement
pub trait Aggregate: Sized + Default {
    /// The aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Bookkeeping shared by every write model
    fn stream(&self) -> &StreamInfo;

    /// Apply an event to update the state. Unknown event types must be
    /// ignored; a payload that fails to decode is corrupted history.
    fn apply(&mut self, event: &Event) -> AppResult<()>;

    /// Current version (last applied aggregate_version)
    fn version(&self) -> i64 {
        self.stream().version
    }

    /// True once at least one event has been applied
    fn exists(&self) -> bool {
        self.stream().version > 0
    }
}

/// Whether a configuration lives on the instance or on one org.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Instance,
    Org,
}

impl Scope {
    /// Event-type prefix (`instance` / `org`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Scope::Instance => "instance",
            Scope::Org => "org",
        }
    }

    /// Aggregate type carrying the scoped events.
    pub fn aggregate_type(&self) -> &'static str {
        self.prefix()
    }
}

/// Last-seen stream coordinates of a write model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub aggregate_id: String,
    pub instance_id: String,
    pub resource_owner: String,
    pub version: i64,
    pub position: Decimal,
}

impl StreamInfo {
    /// Record an applied event.
    pub fn track(&mut self, event: &Event) {
        if self.aggregate_id.is_empty() {
            self.aggregate_id = event.aggregate_id.clone();
            self.instance_id = event.instance_id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = event.resource_owner.clone();
        }
        self.version = event.aggregate_version;
        self.position = event.position;
    }
}

/// Fold an event stream into a fresh write model.
pub fn reduce<A: Aggregate>(events: &[Event]) -> AppResult<A> {
    let mut model = A::default();
    for event in events {
        model.apply(event)?;
    }
    Ok(model)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builders for reducer unit tests.

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::event_store::Event;

    /// Build a stream of events for one aggregate with consecutive
    /// versions and positions.
    pub fn stream(
        aggregate_type: &str,
        aggregate_id: &str,
        entries: Vec<(&str, serde_json::Value)>,
    ) -> Vec<Event> {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (event_type, payload))| Event {
                instance_id: "test-instance".to_string(),
                aggregate_type: aggregate_type.to_string(),
                aggregate_id: aggregate_id.to_string(),
                aggregate_version: (i + 1) as i64,
                event_type: event_type.to_string(),
                revision: 1,
                payload,
                editor_user: "editor".to_string(),
                resource_owner: "owner".to_string(),
                position: Decimal::from((i + 1) as i64),
                in_position_order: 0,
                creation_date: Utc::now(),
            })
            .collect()
    }
}

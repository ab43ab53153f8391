//! Event and push-command records
//!
//! `Event` is the immutable stored fact; `EventCommand` is the intent a
//! command hands to `EventStore::push`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};

use super::EventStoreError;

/// Stored event from the database.
///
/// `position` is the per-instance ordering key; events pushed together share
/// a position and are ordered by `in_position_order`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Event {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub aggregate_version: i64,
    pub event_type: String,
    pub revision: i16,
    pub payload: serde_json::Value,
    pub editor_user: String,
    pub resource_owner: String,
    pub position: Decimal,
    pub in_position_order: i32,
    pub creation_date: DateTime<Utc>,
}

impl Event {
    /// Decode the payload into a typed struct.
    ///
    /// Unknown fields are tolerated; a missing required field means the
    /// stored history is corrupted and surfaces as an error.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EventStoreError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Add or remove a cross-aggregate unique claim alongside a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraintAction {
    Add,
    Remove,
}

/// Cross-aggregate uniqueness claim (e.g. OIDC client ID, SAML entity ID).
///
/// Stored in the `unique_constraints` side table within the push
/// transaction; an existing claim fails the push with `AlreadyExists`
/// carrying the supplied domain code.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub action: UniqueConstraintAction,
    pub unique_type: String,
    pub unique_field: String,
    pub error_code: &'static str,
    pub error_message: String,
}

impl UniqueConstraint {
    pub fn add(
        unique_type: &str,
        unique_field: &str,
        error_code: &'static str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            action: UniqueConstraintAction::Add,
            unique_type: unique_type.to_string(),
            unique_field: unique_field.to_string(),
            error_code,
            error_message: error_message.into(),
        }
    }

    pub fn remove(unique_type: &str, unique_field: &str) -> Self {
        Self {
            action: UniqueConstraintAction::Remove,
            unique_type: unique_type.to_string(),
            unique_field: unique_field.to_string(),
            error_code: "STORE-020",
            error_message: String::new(),
        }
    }
}

/// Intent to append one event, produced by the command engine.
#[derive(Debug, Clone)]
pub struct EventCommand {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub revision: i16,
    pub payload: serde_json::Value,
    pub editor_user: String,
    pub resource_owner: String,
    /// Current aggregate version the decision was based on. `None` skips
    /// the optimistic-concurrency check for this aggregate.
    pub expected_version: Option<i64>,
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl EventCommand {
    pub fn new(aggregate_type: &str, aggregate_id: &str, event_type: &str) -> Self {
        Self {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            revision: 1,
            payload: serde_json::Value::Null,
            editor_user: String::new(),
            resource_owner: String::new(),
            expected_version: None,
            unique_constraints: Vec::new(),
        }
    }

    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, EventStoreError> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    pub fn revision(mut self, revision: i16) -> Self {
        self.revision = revision;
        self
    }

    pub fn editor(mut self, editor_user: &str) -> Self {
        self.editor_user = editor_user.to_string();
        self
    }

    pub fn owner(mut self, resource_owner: &str) -> Self {
        self.resource_owner = resource_owner.to_string();
        self
    }

    pub fn expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn unique_constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct AddedPayload {
        name: String,
    }

    #[test]
    fn test_event_command_builder() {
        let cmd = EventCommand::new("org", "o1", "org.added")
            .payload(&AddedPayload {
                name: "Acme".to_string(),
            })
            .unwrap()
            .editor("u1")
            .owner("o1")
            .expected_version(0);

        assert_eq!(cmd.aggregate_type, "org");
        assert_eq!(cmd.event_type, "org.added");
        assert_eq!(cmd.expected_version, Some(0));
        assert_eq!(cmd.payload["name"], "Acme");
    }

    #[test]
    fn test_payload_decode_tolerates_unknown_fields() {
        let event = Event {
            instance_id: "i1".to_string(),
            aggregate_type: "org".to_string(),
            aggregate_id: "o1".to_string(),
            aggregate_version: 1,
            event_type: "org.added".to_string(),
            revision: 1,
            payload: serde_json::json!({"name": "Acme", "later_addition": true}),
            editor_user: "u1".to_string(),
            resource_owner: "o1".to_string(),
            position: Decimal::ONE,
            in_position_order: 0,
            creation_date: Utc::now(),
        };

        let decoded: AddedPayload = event.payload_as().unwrap();
        assert_eq!(decoded.name, "Acme");
    }

    #[test]
    fn test_payload_decode_fails_on_missing_field() {
        let event = Event {
            instance_id: "i1".to_string(),
            aggregate_type: "org".to_string(),
            aggregate_id: "o1".to_string(),
            aggregate_version: 1,
            event_type: "org.added".to_string(),
            revision: 1,
            payload: serde_json::json!({}),
            editor_user: "u1".to_string(),
            resource_owner: "o1".to_string(),
            position: Decimal::ONE,
            in_position_order: 0,
            creation_date: Utc::now(),
        };

        assert!(event.payload_as::<AddedPayload>().is_err());
    }
}

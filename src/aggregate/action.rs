//! Instance actions and executions
//!
//! Actions are user-defined scripts hooked into flows; executions bind a
//! trigger condition to a list of targets.

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::event_store::Event;

use super::{Aggregate, StreamInfo};

pub const ACTION_ADDED: &str = "instance.action.added";
pub const ACTION_CHANGED: &str = "instance.action.changed";
pub const ACTION_DEACTIVATED: &str = "instance.action.deactivated";
pub const ACTION_REACTIVATED: &str = "instance.action.reactivated";
pub const ACTION_REMOVED: &str = "instance.action.removed";
pub const EXECUTION_SET: &str = "instance.execution.set";
pub const EXECUTION_REMOVED: &str = "instance.execution.removed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Unspecified => "unspecified",
            ActionState::Active => "active",
            ActionState::Inactive => "inactive",
            ActionState::Removed => "removed",
        }
    }
}

/// Instance action write model.
#[derive(Debug, Clone, Default)]
pub struct InstanceAction {
    stream: StreamInfo,
    pub state: ActionState,
    pub name: String,
    pub script: String,
    pub timeout_secs: u64,
    pub allowed_to_fail: bool,
}

impl InstanceAction {
    /// True while the aggregate holds an `added` without a later `removed`.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, ActionState::Unspecified | ActionState::Removed)
    }
}

impl Aggregate for InstanceAction {
    fn aggregate_type() -> &'static str {
        "instance_action"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            ACTION_ADDED => {
                let payload: ActionAddedPayload = event.payload_as()?;
                self.name = payload.name;
                self.script = payload.script;
                self.timeout_secs = payload.timeout_secs;
                self.allowed_to_fail = payload.allowed_to_fail;
                self.state = ActionState::Active;
            }
            ACTION_CHANGED => {
                let payload: ActionChangedPayload = event.payload_as()?;
                if let Some(name) = payload.name {
                    self.name = name;
                }
                if let Some(script) = payload.script {
                    self.script = script;
                }
                if let Some(timeout_secs) = payload.timeout_secs {
                    self.timeout_secs = timeout_secs;
                }
                if let Some(allowed_to_fail) = payload.allowed_to_fail {
                    self.allowed_to_fail = allowed_to_fail;
                }
            }
            ACTION_DEACTIVATED => self.state = ActionState::Inactive,
            ACTION_REACTIVATED => self.state = ActionState::Active,
            ACTION_REMOVED => self.state = ActionState::Removed,
            _ => {}
        }

        self.stream.track(event);
        Ok(())
    }
}

/// One execution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub target_type: String,
    pub target: String,
}

/// Execution write model, keyed by trigger condition.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    stream: StreamInfo,
    pub active: bool,
    pub targets: Vec<ExecutionTarget>,
}

impl Aggregate for Execution {
    fn aggregate_type() -> &'static str {
        "execution"
    }

    fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn apply(&mut self, event: &Event) -> AppResult<()> {
        match event.event_type.as_str() {
            EXECUTION_SET => {
                let payload: ExecutionSetPayload = event.payload_as()?;
                self.targets = payload.targets;
                self.active = true;
            }
            EXECUTION_REMOVED => {
                self.targets.clear();
                self.active = false;
            }
            _ => {}
        }

        self.stream.track(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAddedPayload {
    pub name: String,
    pub script: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allowed_to_fail: bool,
}

fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionChangedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_to_fail: Option<bool>,
}

impl ActionChangedPayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.script.is_none()
            && self.timeout_secs.is_none()
            && self.allowed_to_fail.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSetPayload {
    pub condition: String,
    pub targets: Vec<ExecutionTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRemovedPayload {
    pub condition: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{reduce, testing::stream, Aggregate};
    use serde_json::json;

    #[test]
    fn test_action_state_machine() {
        let events = stream(
            "instance_action",
            "a1",
            vec![
                (
                    ACTION_ADDED,
                    json!({"name": "sync", "script": "run()", "timeout_secs": 5}),
                ),
                (ACTION_DEACTIVATED, json!({})),
                (ACTION_REACTIVATED, json!({})),
            ],
        );

        let action: InstanceAction = reduce(&events).unwrap();
        assert_eq!(action.state, ActionState::Active);
        assert_eq!(action.timeout_secs, 5);
        assert!(action.is_live());
    }

    #[test]
    fn test_removed_action_is_not_live() {
        let events = stream(
            "instance_action",
            "a1",
            vec![
                (ACTION_ADDED, json!({"name": "sync", "script": "run()"})),
                (ACTION_REMOVED, json!({})),
            ],
        );

        let action: InstanceAction = reduce(&events).unwrap();
        assert!(!action.is_live());
        assert!(action.exists());
    }

    #[test]
    fn test_execution_set_and_remove() {
        let events = stream(
            "execution",
            "request.response",
            vec![
                (
                    EXECUTION_SET,
                    json!({
                        "condition": "request.response",
                        "targets": [{"target_type": "webhook", "target": "https://hook/1"}]
                    }),
                ),
                (EXECUTION_REMOVED, json!({"condition": "request.response"})),
            ],
        );

        let execution: Execution = reduce(&events).unwrap();
        assert!(!execution.active);
        assert!(execution.targets.is_empty());
    }
}

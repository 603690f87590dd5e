//! Status condition vocabulary shared by every entity

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CONDITION_TYPE_INITIALIZING: &str = "Initializing";
pub const CONDITION_TYPE_IN_PROGRESS: &str = "InProgress";
pub const CONDITION_TYPE_FAILED: &str = "Failed";
pub const CONDITION_TYPE_READY: &str = "Ready";

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_DEPLOYMENT_IN_PROGRESS: &str = "DeploymentInProgress";
pub const REASON_DEPLOYMENT_DONE: &str = "DeploymentDone";
pub const REASON_DEPLOYMENT_FAILED: &str = "DeploymentFailed";
pub const REASON_RESOURCE_CREATION_FAILED: &str = "ResourceCreationFailed";
pub const REASON_NAMESPACE_CREATION_FAILED: &str = "NamespaceCreationFailed";
pub const REASON_SCHEMA_INVALID: &str = "SchemaInvalid";
pub const REASON_DEPENDENCY_CYCLE: &str = "DependencyCycle";
pub const REASON_UNSUPPORTED_PROVISIONER: &str = "UnsupportedProvisioner";

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// New condition stamped with the current time
    pub fn new(
        type_: impl Into<String>,
        status: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            last_transition_time: Utc::now(),
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }
}

/// Replace or insert a condition by type. The transition time is kept when
/// the status does not change.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) if existing.status == new.status => {
            existing.reason = new.reason;
            existing.message = new.message;
        }
        Some(existing) => *existing = new,
        None => conditions.push(new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_inserts_new_types() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_READY, CONDITION_TRUE, REASON_DEPLOYMENT_DONE, "done"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, CONDITION_TYPE_READY);
    }

    #[test]
    fn set_condition_replaces_same_type() {
        let mut conditions = vec![Condition::new(
            CONDITION_TYPE_READY,
            CONDITION_UNKNOWN,
            REASON_RECONCILING,
            "starting",
        )];
        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_READY, CONDITION_TRUE, REASON_DEPLOYMENT_DONE, "done"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, CONDITION_TRUE);
        assert_eq!(conditions[0].reason.as_deref(), Some(REASON_DEPLOYMENT_DONE));
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let original = Condition::new(
            CONDITION_TYPE_READY,
            CONDITION_TRUE,
            REASON_RECONCILING,
            "first",
        );
        let stamp = original.last_transition_time;
        let mut conditions = vec![original];
        set_condition(
            &mut conditions,
            Condition::new(CONDITION_TYPE_READY, CONDITION_TRUE, REASON_DEPLOYMENT_DONE, "second"),
        );
        assert_eq!(conditions[0].last_transition_time, stamp);
        assert_eq!(conditions[0].message.as_deref(), Some("second"));
    }
}

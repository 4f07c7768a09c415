//! # BtpOperator Status
//!
//! Lifecycle state and the `Ready` condition exposed to users.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type maintained by the operator
pub const READY_CONDITION_TYPE: &str = "Ready";

/// Status of the BtpOperator resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BtpOperatorStatus {
    /// Lifecycle state, empty until the first reconciliation
    #[serde(default)]
    pub state: State,
    /// Conditions represent the latest available observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl BtpOperatorStatus {
    /// Condition of the given type, if present
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

/// Lifecycle state of the module
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum State {
    /// Not reconciled yet
    #[default]
    #[serde(rename = "")]
    Initial,
    Processing,
    Ready,
    Error,
    Deleting,
}

impl State {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Initial => "",
            State::Processing => "Processing",
            State::Ready => "Ready",
            State::Error => "Error",
            State::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Initial => f.write_str("<initial>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_serializes_as_empty_string() {
        let status = BtpOperatorStatus::default();
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "");
        assert!(value.get("conditions").is_none());
    }

    #[test]
    fn test_status_round_trips_from_api_json() {
        let status: BtpOperatorStatus = serde_json::from_value(serde_json::json!({
            "state": "Ready",
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": "2024-01-01T00:00:00Z",
                "reason": "ReconcileSucceeded",
                "message": "Module provisioning succeeded"
            }]
        }))
        .unwrap();

        assert_eq!(status.state, State::Ready);
        let ready = status.condition(READY_CONDITION_TYPE).unwrap();
        assert_eq!(ready.reason.as_deref(), Some("ReconcileSucceeded"));
    }

    #[test]
    fn test_missing_state_defaults_to_initial() {
        let status: BtpOperatorStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.state, State::Initial);
    }
}

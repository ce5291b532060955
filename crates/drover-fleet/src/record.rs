//! Cluster records and the readiness predicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type reporting overall cluster readiness.
pub const READY_CONDITION: &str = "Ready";

/// Truth value of a status condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be evaluated.
    Unknown,
}

/// A single entry in a cluster's status condition set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCondition {
    /// Condition type, e.g. `"Ready"`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Truth value of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message describing the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the condition last changed truth value.
    pub last_transition: DateTime<Utc>,
}

impl ClusterCondition {
    /// Create a condition of the given type and truth value, stamped now.
    #[must_use]
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: None,
            message: None,
            last_transition: Utc::now(),
        }
    }

    /// Attach a machine-readable reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Observed status of a member cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Condition set reported by the cluster agent.
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

impl ClusterStatus {
    /// True iff a condition typed [`READY_CONDITION`] has status `True`.
    ///
    /// `False`, `Unknown`, and an absent condition all count as not ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == READY_CONDITION && c.status == ConditionStatus::True)
    }
}

/// A member cluster as observed through the local cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Cluster name, unique within the fleet.
    pub name: String,
    /// Last observed status.
    #[serde(default)]
    pub status: ClusterStatus,
}

impl ClusterRecord {
    /// Create a record with an empty condition set (not ready).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ClusterStatus::default(),
        }
    }

    /// Set the `Ready` condition to the given truth value, replacing any
    /// existing `Ready` condition.
    #[must_use]
    pub fn with_ready(mut self, ready: bool) -> Self {
        let status = if ready {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        self.status
            .conditions
            .retain(|c| c.condition_type != READY_CONDITION);
        self.status
            .conditions
            .push(ClusterCondition::new(READY_CONDITION, status));
        self
    }

    /// Append an arbitrary condition to the record's status.
    #[must_use]
    pub fn with_condition(mut self, condition: ClusterCondition) -> Self {
        self.status.conditions.push(condition);
        self
    }
}

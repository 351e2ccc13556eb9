//! Condition management helpers following Kubernetes API conventions
//!
//! The unit status is published alongside a small set of standard conditions
//! so that `kubectl` users see the same signal as the host.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::status::UnitStatus;

/// Standard condition types following Kubernetes conventions
pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

/// Standard condition statuses
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "Progressing", "Degraded")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True" or "False"
    pub status: String,
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    pub message: String,
}

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status of an existing condition
/// changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

/// Fold a unit status into the condition list
pub fn apply_unit_status(conditions: &mut Vec<Condition>, status: &UnitStatus) {
    match status {
        UnitStatus::Active => {
            set_condition(
                conditions,
                CONDITION_TYPE_READY,
                CONDITION_STATUS_TRUE,
                "AgentConfigured",
                "Jenkins agent service is configured",
            );
            set_condition(
                conditions,
                CONDITION_TYPE_PROGRESSING,
                CONDITION_STATUS_FALSE,
                "Reconciled",
                "",
            );
            set_condition(
                conditions,
                CONDITION_TYPE_DEGRADED,
                CONDITION_STATUS_FALSE,
                "NoIssues",
                "No degradation detected",
            );
        }
        UnitStatus::Maintenance(message) => {
            set_condition(
                conditions,
                CONDITION_TYPE_READY,
                CONDITION_STATUS_FALSE,
                "Configuring",
                message,
            );
            set_condition(
                conditions,
                CONDITION_TYPE_PROGRESSING,
                CONDITION_STATUS_TRUE,
                "Configuring",
                message,
            );
        }
        UnitStatus::Blocked(message) => {
            set_condition(
                conditions,
                CONDITION_TYPE_READY,
                CONDITION_STATUS_FALSE,
                "MissingConfiguration",
                message,
            );
            set_condition(
                conditions,
                CONDITION_TYPE_PROGRESSING,
                CONDITION_STATUS_FALSE,
                "Blocked",
                message,
            );
            set_condition(
                conditions,
                CONDITION_TYPE_DEGRADED,
                CONDITION_STATUS_TRUE,
                "MissingConfiguration",
                message,
            );
        }
    }
}

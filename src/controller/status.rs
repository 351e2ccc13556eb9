//! Unit status reported to the host

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status shown to the operator after each reconciliation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message")]
pub enum UnitStatus {
    /// Configuration is insufficient; the message lists what is missing
    Blocked(String),
    /// Work is in progress or deferred
    Maintenance(String),
    Active,
}

impl UnitStatus {
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Blocked(_) => "blocked",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Active => "active",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Blocked(message) | UnitStatus::Maintenance(message) => message,
            UnitStatus::Active => "",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Active => write!(f, "active"),
            other => write!(f, "{}: {}", other.name(), other.message()),
        }
    }
}

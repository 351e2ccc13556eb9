//! Controller module for the Jenkins agent unit
//! This module contains the event dispatcher, reconciliation logic,
//! and workload builders for the agent service.

pub mod conditions;
pub mod config_watch;
mod dispatcher;
pub mod reconciler;
pub mod relation;
pub mod resolver;
pub mod resources;
pub mod status;
mod unit;
pub mod validation;

pub use config_watch::watch_static_config;
pub use dispatcher::{error_policy, Dispatcher, Outcome, UnitHandle, DEFAULT_REQUEUE_DELAY};
pub use reconciler::{reconcile, Intent};
pub use relation::HostInfo;
pub use resolver::{resolve, ResolvedEnvironment};
pub use resources::{build_workload_spec, WorkloadSpec};
pub use status::UnitStatus;
pub use unit::{AgentUnit, UnitEvent};
pub use validation::validate;

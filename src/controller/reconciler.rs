//! Reconciliation of the agent service
//!
//! One pass validates the inputs, builds the workload spec and compares it to
//! what the runtime has applied. The pass itself has no side effects: it
//! returns [`Intent`]s that the dispatcher carries out in order.

use tracing::{debug, info};

use crate::config::StaticConfig;
use crate::peers::{AgentAnnouncement, PeerRegistry};
use crate::runtime::RuntimeSnapshot;

use super::resolver::resolve;
use super::resources::{build_workload_spec, WorkloadSpec};
use super::status::UnitStatus;
use super::validation::validate;

pub const WAITING_FOR_RUNTIME: &str = "Waiting for workload runtime";

/// Side effect requested by a handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Replace the service definition, then restart the service
    ApplySpec(WorkloadSpec),
    /// Restart the named service without touching its definition
    Restart(String),
    SetStatus(UnitStatus),
    /// Run a reconciliation pass against a fresh runtime snapshot
    Reconcile,
    /// Re-deliver the current event later
    Defer,
    /// Publish this unit's data to a remote peer
    Publish {
        remote_unit: String,
        announcement: AgentAnnouncement,
    },
}

/// Run one reconciliation pass
pub fn reconcile(
    config: &StaticConfig,
    registry: &PeerRegistry,
    snapshot: &RuntimeSnapshot,
) -> Vec<Intent> {
    if let Err(message) = validate(config, registry) {
        info!("{}", message);
        return vec![Intent::SetStatus(UnitStatus::Blocked(message))];
    }

    if !snapshot.ready {
        info!("Workload runtime not ready, deferring reconciliation");
        return vec![
            Intent::SetStatus(UnitStatus::Maintenance(WAITING_FOR_RUNTIME.to_string())),
            Intent::Defer,
        ];
    }

    let spec = build_workload_spec(&resolve(config, registry), config);

    if snapshot.applied.as_ref() == Some(&spec) {
        if snapshot.restart_pending {
            info!("Workload spec unchanged but {} was not restarted", spec.name);
            return vec![
                Intent::Restart(spec.name),
                Intent::SetStatus(UnitStatus::Active),
            ];
        }
        debug!("Workload spec unchanged");
        return vec![Intent::SetStatus(UnitStatus::Active)];
    }

    match serde_yaml::to_string(&spec.layer()) {
        Ok(layer) => debug!("About to add service layer:\n{}", layer),
        Err(e) => debug!("About to add service layer (unprintable: {})", e),
    }
    info!("Adding new service layer for {}", spec.name);

    vec![
        Intent::ApplySpec(spec),
        Intent::SetStatus(UnitStatus::Active),
    ]
}

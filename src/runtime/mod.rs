//! Container runtime adapters
//!
//! The reconciler never talks to a runtime directly. It reads a
//! [`RuntimeSnapshot`] and emits intents; the dispatcher carries those out
//! through a [`WorkloadRuntime`].

use async_trait::async_trait;

use crate::controller::resources::WorkloadSpec;
use crate::controller::status::UnitStatus;
use crate::error::Result;

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeRuntime;
pub use memory::MemoryRuntime;

/// What the reconciler needs to know about the runtime
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    /// Whether the runtime can accept a spec right now
    pub ready: bool,
    /// The spec currently applied, if any
    pub applied: Option<WorkloadSpec>,
    /// The applied spec has not been followed by a successful restart
    pub restart_pending: bool,
}

#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Whether the runtime is reachable and can accept a spec
    async fn is_ready(&self) -> bool;

    /// The spec the service is currently defined by
    async fn applied_spec(&self) -> Result<Option<WorkloadSpec>>;

    /// Replace the service definition
    async fn apply(&self, spec: &WorkloadSpec) -> Result<()>;

    /// Restart the named service so it picks up its definition
    async fn restart(&self, service: &str) -> Result<()>;

    /// Surface the unit status to the operator
    async fn report_status(&self, status: &UnitStatus) -> Result<()>;
}

/// Take a snapshot of the runtime, skipping the spec lookup when not ready
pub async fn snapshot<R>(runtime: &R) -> Result<RuntimeSnapshot>
where
    R: WorkloadRuntime + ?Sized,
{
    if !runtime.is_ready().await {
        return Ok(RuntimeSnapshot::default());
    }
    Ok(RuntimeSnapshot {
        ready: true,
        applied: runtime.applied_spec().await?,
        restart_pending: false,
    })
}

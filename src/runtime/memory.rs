//! In-process runtime used for dry runs and tests

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::WorkloadRuntime;
use crate::controller::resources::WorkloadSpec;
use crate::controller::status::UnitStatus;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct State {
    ready: bool,
    applied: Option<WorkloadSpec>,
    status: Option<UnitStatus>,
    applies: usize,
    restarts: Vec<String>,
    reject_apply: bool,
    failing_restarts: usize,
}

/// Keeps the applied spec in memory and counts applies and restarts
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
}

impl MemoryRuntime {
    /// A runtime that is ready to accept specs
    pub fn ready() -> Self {
        let runtime = Self::default();
        runtime.set_ready(true);
        runtime
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        // A poisoned lock only means a test panicked mid-update
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn set_ready(&self, ready: bool) {
        self.with_state(|s| s.ready = ready);
    }

    /// Make subsequent applies fail, as a runtime rejecting the spec would
    pub fn set_reject_apply(&self, reject: bool) {
        self.with_state(|s| s.reject_apply = reject);
    }

    /// Make the next `count` restarts fail
    pub fn fail_restarts(&self, count: usize) {
        self.with_state(|s| s.failing_restarts = count);
    }

    pub fn current_spec(&self) -> Option<WorkloadSpec> {
        self.with_state(|s| s.applied.clone())
    }

    pub fn status(&self) -> Option<UnitStatus> {
        self.with_state(|s| s.status.clone())
    }

    pub fn apply_count(&self) -> usize {
        self.with_state(|s| s.applies)
    }

    pub fn restarts(&self) -> Vec<String> {
        self.with_state(|s| s.restarts.clone())
    }
}

#[async_trait]
impl WorkloadRuntime for MemoryRuntime {
    async fn is_ready(&self) -> bool {
        self.with_state(|s| s.ready)
    }

    async fn applied_spec(&self) -> Result<Option<WorkloadSpec>> {
        Ok(self.current_spec())
    }

    async fn apply(&self, spec: &WorkloadSpec) -> Result<()> {
        self.with_state(|s| {
            if s.reject_apply {
                return Err(Error::ApplyError(format!("runtime rejected {}", spec.name)));
            }
            s.applied = Some(spec.clone());
            s.applies += 1;
            Ok(())
        })
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.with_state(|s| {
            if s.failing_restarts > 0 {
                s.failing_restarts -= 1;
                return Err(Error::ApplyError(format!("runtime failed to restart {service}")));
            }
            info!("Restarting service {}", service);
            s.restarts.push(service.to_string());
            Ok(())
        })
    }

    async fn report_status(&self, status: &UnitStatus) -> Result<()> {
        self.with_state(|s| s.status = Some(status.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::controller::resolver::ResolvedEnvironment;
    use crate::controller::resources::build_workload_spec;
    use crate::runtime::snapshot;

    #[test]
    fn test_snapshot_when_not_ready_skips_spec() {
        let runtime = MemoryRuntime::default();
        let snap = tokio_test::block_on(snapshot(&runtime)).unwrap();
        assert!(!snap.ready);
        assert!(snap.applied.is_none());
    }

    #[tokio::test]
    async fn test_apply_records_spec() {
        let runtime = MemoryRuntime::ready();
        let spec = build_workload_spec(&ResolvedEnvironment::default(), &StaticConfig::default());

        runtime.apply(&spec).await.unwrap();
        runtime.restart(&spec.name).await.unwrap();

        let snap = snapshot(&runtime).await.unwrap();
        assert!(snap.ready);
        assert_eq!(snap.applied, Some(spec));
        assert_eq!(runtime.apply_count(), 1);
        assert_eq!(runtime.restarts(), vec!["jenkins-agent".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_apply_leaves_spec_untouched() {
        let runtime = MemoryRuntime::ready();
        runtime.set_reject_apply(true);
        let spec = build_workload_spec(&ResolvedEnvironment::default(), &StaticConfig::default());

        let err = runtime.apply(&spec).await.unwrap_err();
        assert!(matches!(err, Error::ApplyError(_)));
        assert!(runtime.current_spec().is_none());
    }

    #[tokio::test]
    async fn test_failed_restart_is_not_recorded() {
        let runtime = MemoryRuntime::ready();
        runtime.fail_restarts(1);

        assert!(runtime.restart("jenkins-agent").await.is_err());
        assert!(runtime.restarts().is_empty());

        runtime.restart("jenkins-agent").await.unwrap();
        assert_eq!(runtime.restarts().len(), 1);
    }
}

//! Per-unit state and event routing

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StaticConfig;
use crate::peers::{PeerRegistry, RelationData};
use crate::runtime::RuntimeSnapshot;

use super::reconciler::{self, Intent};
use super::relation::{self, HostInfo};
use super::status::UnitStatus;

/// Events delivered by the host, one at a time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UnitEvent {
    Start,
    Upgrade,
    ConfigChanged {
        /// New static configuration; `None` re-runs with the current one
        #[serde(default)]
        config: Option<StaticConfig>,
    },
    PeerJoined {
        unit: String,
    },
    PeerChanged {
        unit: String,
        #[serde(default)]
        data: RelationData,
    },
    PeerDeparted {
        unit: String,
    },
    /// Re-run reconciliation against the current state
    Reconcile,
}

impl UnitEvent {
    /// Short name for logs; relation data may carry secrets
    pub fn kind(&self) -> &'static str {
        match self {
            UnitEvent::Start => "start",
            UnitEvent::Upgrade => "upgrade",
            UnitEvent::ConfigChanged { .. } => "config-changed",
            UnitEvent::PeerJoined { .. } => "peer-joined",
            UnitEvent::PeerChanged { .. } => "peer-changed",
            UnitEvent::PeerDeparted { .. } => "peer-departed",
            UnitEvent::Reconcile => "reconcile",
        }
    }

    /// The event to deliver again after this one was deferred or failed
    ///
    /// Handlers have already folded the payload into the unit state, so only
    /// the reconciliation is repeated. Joins carry no state and are repeated
    /// as they are.
    pub fn retry(&self) -> UnitEvent {
        match self {
            UnitEvent::PeerJoined { .. } => self.clone(),
            _ => UnitEvent::Reconcile,
        }
    }
}

/// Everything the unit knows between events
///
/// Handlers only mutate this struct and return intents; they never touch the
/// runtime or the peer bus themselves.
#[derive(Debug)]
pub struct AgentUnit {
    unit_name: String,
    host: HostInfo,
    config: StaticConfig,
    registry: PeerRegistry,
    status: Option<UnitStatus>,
    /// Set between a successful apply and the restart that follows it
    restart_pending: bool,
}

impl AgentUnit {
    pub fn new(unit_name: impl Into<String>, config: StaticConfig, host: HostInfo) -> Self {
        Self {
            unit_name: unit_name.into(),
            host,
            config,
            registry: PeerRegistry::new(),
            status: None,
            restart_pending: false,
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn config(&self) -> &StaticConfig {
        &self.config
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Last status emitted by a handler
    pub fn status(&self) -> Option<&UnitStatus> {
        self.status.as_ref()
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn set_restart_pending(&mut self, pending: bool) {
        self.restart_pending = pending;
    }

    pub fn handle(&mut self, event: &UnitEvent) -> Vec<Intent> {
        let intents = match event {
            UnitEvent::Start | UnitEvent::Upgrade | UnitEvent::Reconcile => {
                vec![Intent::Reconcile]
            }
            UnitEvent::ConfigChanged { config } => {
                if let Some(config) = config {
                    if *config != self.config {
                        info!("Static configuration changed");
                    }
                    self.config = config.clone();
                }
                vec![Intent::Reconcile]
            }
            UnitEvent::PeerJoined { unit } => {
                relation::on_peer_joined(&self.config, &self.unit_name, &self.host, unit)
            }
            UnitEvent::PeerChanged { unit, data } => {
                relation::on_peer_changed(&self.config, &mut self.registry, unit, data)
            }
            UnitEvent::PeerDeparted { unit } => relation::on_peer_departed(&mut self.registry, unit),
        };
        self.track_status(intents)
    }

    pub fn reconcile(&mut self, snapshot: RuntimeSnapshot) -> Vec<Intent> {
        let snapshot = RuntimeSnapshot {
            restart_pending: self.restart_pending,
            ..snapshot
        };
        let intents = reconciler::reconcile(&self.config, &self.registry, &snapshot);
        self.track_status(intents)
    }

    fn track_status(&mut self, intents: Vec<Intent>) -> Vec<Intent> {
        for intent in &intents {
            if let Intent::SetStatus(status) = intent {
                debug!("Unit {} status -> {}", self.unit_name, status);
                self.status = Some(status.clone());
            }
        }
        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> AgentUnit {
        AgentUnit::new(
            "jenkins-agent-k8s/0",
            StaticConfig::default(),
            HostInfo {
                cpu_count: 2,
                architecture: "x86_64".to_string(),
            },
        )
    }

    #[test]
    fn test_lifecycle_events_request_reconcile() {
        let mut unit = unit();
        assert_eq!(unit.handle(&UnitEvent::Start), vec![Intent::Reconcile]);
        assert_eq!(unit.handle(&UnitEvent::Upgrade), vec![Intent::Reconcile]);
        assert_eq!(unit.handle(&UnitEvent::Reconcile), vec![Intent::Reconcile]);
    }

    #[test]
    fn test_config_changed_replaces_config() {
        let mut unit = unit();
        let config = StaticConfig {
            jenkins_url: "http://test".to_string(),
            ..Default::default()
        };

        let intents = unit.handle(&UnitEvent::ConfigChanged {
            config: Some(config.clone()),
        });
        assert_eq!(intents, vec![Intent::Reconcile]);
        assert_eq!(unit.config(), &config);

        unit.handle(&UnitEvent::ConfigChanged { config: None });
        assert_eq!(unit.config(), &config);
    }

    #[test]
    fn test_reconcile_tracks_status() {
        let mut unit = unit();
        assert!(unit.status().is_none());

        unit.reconcile(RuntimeSnapshot::default());
        assert!(matches!(unit.status(), Some(UnitStatus::Blocked(_))));
    }

    #[test]
    fn test_event_kind_hides_relation_data() {
        let mut data = RelationData::new();
        data.insert("secret".to_string(), "hunter2".to_string());
        let event = UnitEvent::PeerChanged {
            unit: "jenkins/0".to_string(),
            data,
        };
        assert_eq!(event.kind(), "peer-changed");
    }

    #[test]
    fn test_retry_drops_payload() {
        let changed = UnitEvent::ConfigChanged {
            config: Some(StaticConfig {
                jenkins_url: "http://old".to_string(),
                ..Default::default()
            }),
        };
        assert_eq!(changed.retry(), UnitEvent::Reconcile);

        let peer = UnitEvent::PeerChanged {
            unit: "jenkins/0".to_string(),
            data: RelationData::new(),
        };
        assert_eq!(peer.retry(), UnitEvent::Reconcile);
        assert_eq!(UnitEvent::Start.retry(), UnitEvent::Reconcile);

        let joined = UnitEvent::PeerJoined {
            unit: "jenkins/0".to_string(),
        };
        assert_eq!(joined.retry(), joined);
    }

    #[test]
    fn test_pending_restart_reaches_reconciliation() {
        let config = StaticConfig {
            jenkins_url: "http://test".to_string(),
            jenkins_agent_name: "agent-one".to_string(),
            jenkins_agent_token: "token-one".to_string(),
            ..Default::default()
        };
        let mut unit = AgentUnit::new("jenkins-agent-k8s/0", config, HostInfo::detect());
        let spec = crate::controller::resources::build_workload_spec(
            &crate::controller::resolver::resolve(unit.config(), unit.registry()),
            unit.config(),
        );

        unit.set_restart_pending(true);
        let intents = unit.reconcile(RuntimeSnapshot {
            ready: true,
            applied: Some(spec.clone()),
            restart_pending: false,
        });

        assert_eq!(
            intents,
            vec![Intent::Restart(spec.name), Intent::SetStatus(UnitStatus::Active)]
        );
    }
}

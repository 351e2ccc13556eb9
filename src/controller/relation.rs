//! Handlers for peer bus notifications
//!
//! Joining peers get this unit's capabilities; changing peers may hand us a
//! Jenkins url and an agent secret, which go into the [`PeerRegistry`].

use tracing::{debug, info, warn};

use crate::config::StaticConfig;
use crate::peers::{
    normalize_unit_name, AgentAnnouncement, PeerRegistry, RelationData, KEY_SECRET, KEY_URL,
};

use super::reconciler::Intent;
use super::status::UnitStatus;

pub const CONFIGURING_MESSAGE: &str = "Configuring jenkins agent";

/// Facts about the machine the agent runs on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInfo {
    pub cpu_count: usize,
    pub architecture: String,
}

impl HostInfo {
    pub fn detect() -> Self {
        Self {
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Build what this unit announces to a joining peer
pub fn announcement(config: &StaticConfig, unit_name: &str, host: &HostInfo) -> AgentAnnouncement {
    let labels = if config.jenkins_agent_labels.is_empty() {
        host.architecture.clone()
    } else {
        config.jenkins_agent_labels.clone()
    };

    AgentAnnouncement {
        executors: host.cpu_count.to_string(),
        labels,
        slavehost: normalize_unit_name(unit_name),
    }
}

pub fn on_peer_joined(
    config: &StaticConfig,
    unit_name: &str,
    host: &HostInfo,
    remote_unit: &str,
) -> Vec<Intent> {
    info!("Jenkins relation joined by {}", remote_unit);
    vec![Intent::Publish {
        remote_unit: remote_unit.to_string(),
        announcement: announcement(config, unit_name, host),
    }]
}

/// Register the remote peer's url and secret, if it has published both
pub fn on_peer_changed(
    config: &StaticConfig,
    registry: &mut PeerRegistry,
    remote_unit: &str,
    data: &RelationData,
) -> Vec<Intent> {
    info!("Jenkins relation changed for {}", remote_unit);

    for key in [KEY_URL, KEY_SECRET] {
        if !data.contains_key(key) {
            warn!(
                "Expected '{}' key for {} unit in relation data. Skipping setup for now.",
                key, remote_unit
            );
            return Vec::new();
        }
    }

    let url = data.get(KEY_URL).map(String::as_str);
    let secret = data.get(KEY_SECRET).map(String::as_str);
    let Some(registration) = registry.register_or_update(remote_unit, url, secret) else {
        return Vec::new();
    };
    if !registration.changed {
        debug!("Relation data from {} unchanged", remote_unit);
        return Vec::new();
    }

    if !config.jenkins_url.is_empty() {
        warn!("Config option 'jenkins_url' is set and takes precedence; not reconfiguring from relation");
        return Vec::new();
    }

    info!("Setting up jenkins via agent relation");
    vec![
        Intent::SetStatus(UnitStatus::Maintenance(CONFIGURING_MESSAGE.to_string())),
        Intent::Reconcile,
    ]
}

pub fn on_peer_departed(registry: &mut PeerRegistry, remote_unit: &str) -> Vec<Intent> {
    info!("Jenkins relation departed by {}", remote_unit);
    match registry.remove(remote_unit) {
        Some(_) => vec![Intent::Reconcile],
        None => Vec::new(),
    }
}

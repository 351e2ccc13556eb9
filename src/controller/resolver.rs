//! Merge static configuration with peer registrations
//!
//! Once any peer has registered, the peer bus is authoritative: agent names,
//! tokens and the Jenkins url all come from the registry, even when the static
//! configuration is fully populated.

use crate::config::StaticConfig;
use crate::peers::PeerRegistry;

/// Separator used to encode agent and token lists into one variable
pub const LIST_SEPARATOR: &str = ":";

/// The environment the agent workload should run with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    pub agent_names: Vec<String>,
    pub agent_tokens: Vec<String>,
    pub jenkins_url: String,
}

impl ResolvedEnvironment {
    pub fn joined_agent_names(&self) -> String {
        self.agent_names.join(LIST_SEPARATOR)
    }

    pub fn joined_agent_tokens(&self) -> String {
        self.agent_tokens.join(LIST_SEPARATOR)
    }
}

pub fn resolve(config: &StaticConfig, registry: &PeerRegistry) -> ResolvedEnvironment {
    if registry.is_empty() {
        return ResolvedEnvironment {
            agent_names: vec![config.jenkins_agent_name.clone()],
            agent_tokens: vec![config.jenkins_agent_token.clone()],
            jenkins_url: config.jenkins_url.clone(),
        };
    }

    let (agent_names, agent_tokens) = registry
        .entries()
        .iter()
        .map(|e| (e.identity.clone(), e.token.clone()))
        .unzip();

    ResolvedEnvironment {
        agent_names,
        agent_tokens,
        jenkins_url: registry.current_url().to_string(),
    }
}

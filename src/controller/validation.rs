//! Decide whether the unit has enough configuration to run the agent

use crate::config::{StaticConfig, KEY_AGENT_NAME, KEY_AGENT_TOKEN, KEY_JENKINS_URL};
use crate::peers::PeerRegistry;

/// Validate the inputs of a reconciliation
///
/// A unit with at least one registered peer is self-sufficient. Otherwise
/// `jenkins_url`, `jenkins_agent_name` and `jenkins_agent_token` must all be
/// set; the error message names exactly the ones that are empty.
pub fn validate(config: &StaticConfig, registry: &PeerRegistry) -> Result<(), String> {
    if !registry.is_empty() {
        return Ok(());
    }

    let mut missing: Vec<&str> = [
        (KEY_JENKINS_URL, &config.jenkins_url),
        (KEY_AGENT_NAME, &config.jenkins_agent_name),
        (KEY_AGENT_TOKEN, &config.jenkins_agent_token),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(key, _)| key)
    .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    Err(format!(
        "Missing required configuration: {}",
        missing.join(" ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 3] = [KEY_JENKINS_URL, KEY_AGENT_NAME, KEY_AGENT_TOKEN];

    fn config(url: &str, name: &str, token: &str) -> StaticConfig {
        StaticConfig {
            jenkins_url: url.to_string(),
            jenkins_agent_name: name.to_string(),
            jenkins_agent_token: token.to_string(),
            ..Default::default()
        }
    }

    fn assert_missing_exactly(message: &str, expected: &[&str]) {
        for key in REQUIRED {
            assert_eq!(
                message.contains(key),
                expected.contains(&key),
                "key {key} in message {message:?}"
            );
        }
    }

    #[test]
    fn test_all_fields_empty() {
        let message = validate(&config("", "", ""), &PeerRegistry::new()).unwrap_err();
        assert_eq!(
            message,
            "Missing required configuration: jenkins_agent_name jenkins_agent_token jenkins_url"
        );
    }

    #[test]
    fn test_only_url_set() {
        let message = validate(&config("http://test", "", ""), &PeerRegistry::new()).unwrap_err();
        assert_missing_exactly(&message, &[KEY_AGENT_NAME, KEY_AGENT_TOKEN]);
    }

    #[test]
    fn test_name_and_token_set() {
        let message =
            validate(&config("", "agent 1", "token 1"), &PeerRegistry::new()).unwrap_err();
        assert_eq!(message, "Missing required configuration: jenkins_url");
    }

    #[test]
    fn test_only_token_missing() {
        let message =
            validate(&config("http://test", "agent", ""), &PeerRegistry::new()).unwrap_err();
        assert_missing_exactly(&message, &[KEY_AGENT_TOKEN]);
    }

    #[test]
    fn test_fully_configured_is_valid() {
        assert!(validate(&config("http://test", "agent 1", "token 1"), &PeerRegistry::new()).is_ok());
    }

    #[test]
    fn test_registered_peer_is_valid_without_config() {
        let mut registry = PeerRegistry::new();
        registry.register_or_update("jenkins/0", Some("http://peer"), Some("token"));

        assert!(validate(&config("", "", ""), &registry).is_ok());
        assert!(validate(&config("http://test", "", ""), &registry).is_ok());
    }
}

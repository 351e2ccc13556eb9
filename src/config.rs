//! Operator-declared static configuration
//!
//! The static configuration is a flat set of string options. It can be read
//! from a YAML file or from the `data` map of a Kubernetes ConfigMap; every
//! option is individually optional and defaults to an empty string.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_IMAGE: &str = "jenkins-agent-operator";

pub const KEY_IMAGE: &str = "image";
pub const KEY_JENKINS_URL: &str = "jenkins_url";
pub const KEY_AGENT_NAME: &str = "jenkins_agent_name";
pub const KEY_AGENT_TOKEN: &str = "jenkins_agent_token";
pub const KEY_AGENT_LABELS: &str = "jenkins_agent_labels";

/// Snapshot of the static configuration used for one reconciliation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub image: String,
    pub jenkins_url: String,
    pub jenkins_agent_name: String,
    pub jenkins_agent_token: String,
    pub jenkins_agent_labels: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            jenkins_url: String::new(),
            jenkins_agent_name: String::new(),
            jenkins_agent_token: String::new(),
            jenkins_agent_labels: String::new(),
        }
    }
}

impl StaticConfig {
    /// Load the configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        debug!("Loaded static configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document is a valid, fully-defaulted configuration
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Build the configuration from a ConfigMap `data` map
    ///
    /// Unknown keys are ignored so that the ConfigMap may carry unrelated
    /// settings.
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Self {
        let mut config = Self::default();
        for (key, value) in data {
            if config.set(key, value).is_err() {
                debug!("Ignoring unknown configuration key {}", key);
            }
        }
        config
    }

    /// Set a single option by its configuration key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let slot = match key {
            KEY_IMAGE => &mut self.image,
            KEY_JENKINS_URL => &mut self.jenkins_url,
            KEY_AGENT_NAME => &mut self.jenkins_agent_name,
            KEY_AGENT_TOKEN => &mut self.jenkins_agent_token,
            KEY_AGENT_LABELS => &mut self.jenkins_agent_labels,
            other => {
                return Err(Error::ConfigError(format!(
                    "unknown configuration option '{other}'"
                )))
            }
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Apply `key=value` overrides, as given on the command line
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for entry in overrides {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                Error::ConfigError(format!("expected key=value override, got '{entry}'"))
            })?;
            self.set(key.trim(), value)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_empty_except_image() {
        let config = StaticConfig::default();
        assert_eq!(config.image, DEFAULT_IMAGE);
        assert!(config.jenkins_url.is_empty());
        assert!(config.jenkins_agent_name.is_empty());
        assert!(config.jenkins_agent_token.is_empty());
        assert!(config.jenkins_agent_labels.is_empty());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = StaticConfig::from_yaml("jenkins_url: http://test\nimage: image-name\n")
            .unwrap();
        assert_eq!(config.jenkins_url, "http://test");
        assert_eq!(config.image, "image-name");
        assert!(config.jenkins_agent_name.is_empty());
    }

    #[test]
    fn test_from_yaml_empty_document() {
        assert_eq!(StaticConfig::from_yaml("  \n").unwrap(), StaticConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "jenkins_agent_name: agent-one").unwrap();
        writeln!(file, "jenkins_agent_token: token-one").unwrap();

        let config = StaticConfig::from_file(file.path()).unwrap();
        assert_eq!(config.jenkins_agent_name, "agent-one");
        assert_eq!(config.jenkins_agent_token, "token-one");
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_from_config_map_data_ignores_unknown_keys() {
        let mut data = BTreeMap::new();
        data.insert("jenkins_url".to_string(), "http://test".to_string());
        data.insert("jenkins_agent_labels".to_string(), "x86,linux".to_string());
        data.insert("unrelated".to_string(), "value".to_string());

        let config = StaticConfig::from_config_map_data(&data);
        assert_eq!(config.jenkins_url, "http://test");
        assert_eq!(config.jenkins_agent_labels, "x86,linux");
        assert_eq!(config.image, DEFAULT_IMAGE);
    }

    #[test]
    fn test_overrides() {
        let config = StaticConfig::default()
            .with_overrides(["jenkins_url=http://a=b", "image=custom"])
            .unwrap();
        assert_eq!(config.jenkins_url, "http://a=b");
        assert_eq!(config.image, "custom");

        assert!(StaticConfig::default().with_overrides(["no-equals"]).is_err());
        assert!(StaticConfig::default().with_overrides(["bogus=1"]).is_err());
    }
}

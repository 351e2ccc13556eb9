//! Error types for the Jenkins agent operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Filesystem or stdio error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid process or static configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The container runtime rejected a spec or failed to restart the service
    #[error("Apply error: {0}")]
    ApplyError(String),

    /// The unit dispatcher is no longer accepting events
    #[error("Unit event channel closed")]
    ChannelClosed,
}

impl Error {
    /// Whether the host should retry the failed attempt soon
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::KubeError(_) | Error::IoError(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

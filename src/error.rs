//! Error types for the CRD mirror

use std::fmt;

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while mirroring definitions and resources
#[derive(Debug)]
pub enum MirrorError {
    /// A list/get/create/update/delete/watch call against the API server failed
    Remote(String),
    /// A watch stream delivered an error or an event kind we do not handle
    Protocol(String),
    /// Connection or credential configuration error
    Configuration(String),
    /// Kind is not present in the client's type registry
    UnknownType(String),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorError::Remote(msg) => write!(f, "Remote API error: {}", msg),
            MirrorError::Protocol(msg) => write!(f, "Watch protocol error: {}", msg),
            MirrorError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            MirrorError::UnknownType(msg) => write!(f, "Unknown resource type: {}", msg),
            MirrorError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for MirrorError {}

impl From<kube::Error> for MirrorError {
    fn from(err: kube::Error) -> Self {
        MirrorError::Remote(err.to_string())
    }
}

impl From<kube::config::KubeconfigError> for MirrorError {
    fn from(err: kube::config::KubeconfigError) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}

impl From<kube::config::InferConfigError> for MirrorError {
    fn from(err: kube::config::InferConfigError) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Serialization(err.to_string())
    }
}

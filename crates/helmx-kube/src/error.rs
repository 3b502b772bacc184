//! Error types for helmx-kube

use thiserror::Error;

/// Result type for helmx-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reading releases or touching live objects
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No stored revision for this release
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Adoption stopped part way; earlier resources stay adopted
    #[error(
        "adopted {} resource(s) before '{failed}' failed: {reason}{}",
        .adopted.len(),
        not_attempted(.remaining)
    )]
    AdoptionPartialFailure {
        adopted: Vec<String>,
        failed: String,
        reason: String,
        remaining: Vec<String>,
    },

    /// A resource reference that is not `kind/name`
    #[error("invalid resource reference '{reference}': expected KIND/NAME")]
    InvalidResourceRef { reference: String },

    /// The cluster does not serve this kind
    #[error("unknown resource kind '{kind}'")]
    UnknownResourceKind { kind: String },

    /// Malformed storage object
    #[error("storage error: {0}")]
    Storage(String),

    /// Release payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Kubeconfig could not be loaded
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn not_attempted(remaining: &[String]) -> String {
    if remaining.is_empty() {
        String::new()
    } else {
        format!(" ({} not attempted: {})", remaining.len(), remaining.join(", "))
    }
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<helmx_core::CoreError> for KubeError {
    fn from(e: helmx_core::CoreError) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

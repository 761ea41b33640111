//! Error types shared across the operator.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the actuator and the admission webhook.
#[derive(Debug, Error)]
pub enum Error {
    /// The extension's provider config could not be decoded
    #[error("failed to decode provider config: {0}")]
    ConfigDecode(#[source] serde_json::Error),

    /// The cluster is missing its tenant annotation
    #[error("cluster {cluster} has no tenant annotation")]
    MissingTenant { cluster: String },

    /// A logical image name is not registered in the image vector
    #[error("failed to find image {0} in the image vector")]
    ImageResolution(String),

    /// Applying or deleting a managed resource bundle failed
    #[error("failed to apply managed resource {namespace}/{name}: {source}")]
    BundleApply {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// A managed resource was not removed within the bounded wait
    #[error("managed resource {namespace}/{name} was not deleted within {timeout:?}")]
    DeletionTimeout {
        namespace: String,
        name: String,
        timeout: Duration,
    },

    /// The enclosing call was cancelled while waiting
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Mutating the kube-apiserver deployment failed; the admission request is rejected
    #[error("admission mutation failed: {0}")]
    AdmissionMutation(String),

    /// Invalid or incomplete controller configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing object metadata (name or namespace)
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// Finalizer management on the extension resource failed
    #[error("finalizer error: {0}")]
    Finalizer(String),
}

//! Error types for the MiniCloneSet operator.

use crate::crd::ConversionError;
use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error (transport or unclassified server error).
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// Create rejected because an object with the same name exists.
    #[error("Resource already exists: {kind}/{name} in namespace {namespace}")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// Optimistic-concurrency violation (stale resourceVersion).
    #[error("Conflict writing {kind}/{name} in namespace {namespace}")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// The reconciliation pass exceeded its deadline and was cancelled.
    #[error("Reconciliation pass timed out after {seconds}s")]
    Timeout {
        /// Deadline that expired.
        seconds: u64,
    },

    /// Schema conversion contract violation.
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The observed resource lacks fields the controller relies on.
    #[error("Invalid resource {name}: {reason}")]
    InvalidResource {
        /// Resource name.
        name: String,
        /// What is missing or malformed.
        reason: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Store backend error (in-memory store lock poisoning, injected faults).
    #[error("Store error: {0}")]
    StoreError(String),
}

impl OperatorError {
    /// Classify a kube client error for the given object.
    ///
    /// 404 becomes [`OperatorError::NotFound`], 409 becomes
    /// [`OperatorError::AlreadyExists`] or [`OperatorError::Conflict`]
    /// depending on the reason, anything else is kept as a transport error.
    pub fn from_kube(err: kube::Error, kind: &str, name: &str, namespace: &str) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => OperatorError::NotFound {
                kind: kind.into(),
                name: name.into(),
                namespace: namespace.into(),
            },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                OperatorError::AlreadyExists {
                    kind: kind.into(),
                    name: name.into(),
                    namespace: namespace.into(),
                }
            }
            kube::Error::Api(resp) if resp.code == 409 => OperatorError::Conflict {
                kind: kind.into(),
                name: name.into(),
                namespace: namespace.into(),
            },
            _ => OperatorError::KubeError(err),
        }
    }

    /// Whether a later pass can succeed without anybody changing the resource.
    ///
    /// Contract violations and malformed resources are not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OperatorError::Conversion(_)
                | OperatorError::InvalidConfig(_)
                | OperatorError::InvalidResource { .. }
                | OperatorError::SerializationError(_)
        )
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

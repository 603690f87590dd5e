//! Error types for the klaudio operator

use thiserror::Error;

use crate::expression::ExpressionError;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Property expression error
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// The resource dependency graph is not acyclic
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// Invalid user-authored spec (duplicate resource, malformed apiVersion, ...)
    #[error("Spec error: {0}")]
    Spec(String),

    /// A referenced object is missing or not ready yet; transient
    #[error("Reference not ready: {0}")]
    RefNotReady(String),

    /// The ResourceRef names a provisioner this operator does not support
    #[error("Unsupported provisioner: {0}")]
    UnsupportedProvisioner(String),

    /// Backend error surfaced from a provisioner
    #[error("Provisioner error: {0}")]
    Provisioner(String),

    /// Optimistic concurrency retries exhausted
    #[error("Update conflict retries exhausted for '{0}'")]
    Conflict(String),
}

impl Error {
    /// Create a spec error
    pub fn spec(msg: impl Into<String>) -> Self {
        Error::Spec(msg.into())
    }

    /// Create a transient reference error
    pub fn ref_not_ready(msg: impl Into<String>) -> Self {
        Error::RefNotReady(msg.into())
    }

    /// Create a provisioner error
    pub fn provisioner(msg: impl Into<String>) -> Self {
        Error::Provisioner(msg.into())
    }
}

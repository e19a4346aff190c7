//! Kubernetes error types
//!
//! Separates "object does not exist" from transport and auth failures so
//! callers can treat a missing object as a normal outcome.

use thiserror::Error;

/// Kubernetes-specific errors
#[derive(Debug, Error)]
pub enum K8sError {
    /// Kubernetes resource not found
    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    /// Error from kube-rs client
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid kubeconfig
    #[error("Invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    /// Anything else the gateway could not complete
    #[error("Internal error: {0}")]
    Internal(String),
}

impl K8sError {
    /// Whether the API server reported the object as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            K8sError::NotFound { .. } => true,
            K8sError::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Convert a 404 from kube-rs into [`K8sError::NotFound`], leave the rest as-is
    pub(crate) fn from_lookup(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => K8sError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            other => K8sError::KubeError(other),
        }
    }
}

/// Result type alias for Kubernetes operations
pub type K8sResult<T> = std::result::Result<T, K8sError>;

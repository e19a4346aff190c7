//! Provisioning errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::naming::RandomSourceError;
use super::readiness::ReadinessError;
use super::types::{ProvisioningOutcome, ResourceKind, Tier};
use crate::kubernetes::K8sError;

/// Gateway operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAction {
    Lookup,
    Create,
}

impl std::fmt::Display for GatewayAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayAction::Lookup => write!(f, "look up"),
            GatewayAction::Create => write!(f, "create"),
        }
    }
}

/// Why a provisioning request did not complete
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Bad or missing request fields
    #[error("{0}")]
    Validation(String),

    /// Entropy could not be read
    #[error("Could not generate random values: {0}")]
    RandomSource(#[from] RandomSourceError),

    /// Cluster credentials could not be resolved
    #[error("Could not initialize Kubernetes client: {0}")]
    ClientInit(#[source] K8sError),

    /// A create/get call against the cluster failed
    #[error("Failed to {action} {kind} {name}: {source}")]
    Gateway {
        action: GatewayAction,
        kind: ResourceKind,
        name: String,
        #[source]
        source: K8sError,
    },

    /// A workload never reported a ready replica
    #[error("{} deployment {name} failed to become ready: {source}", .tier.product())]
    Readiness {
        tier: Tier,
        name: String,
        #[source]
        source: ReadinessError,
    },

    /// The pipeline reached a stage without its prerequisites
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    pub fn gateway(
        action: GatewayAction,
        kind: ResourceKind,
        name: impl Into<String>,
        source: K8sError,
    ) -> Self {
        ProvisionError::Gateway {
            action,
            kind,
            name: name.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProvisionError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<stackpress_common::Error> for ProvisionError {
    fn from(err: stackpress_common::Error) -> Self {
        match err {
            stackpress_common::Error::Validation(msg) => ProvisionError::Validation(msg),
            stackpress_common::Error::System(msg) => ProvisionError::Internal(msg),
        }
    }
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let body = ProvisioningOutcome::failure(&self).to_response();
        (self.status_code(), Json(body)).into_response()
    }
}

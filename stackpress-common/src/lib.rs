//! Common types shared between the stackpress API server and its clients

use serde::{Deserialize, Serialize};

/// Body of a `POST /create-wordpress` request
///
/// Every field is optional on the wire; the server applies defaults and
/// rejects a missing namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionPayload {
    /// Path to a kubeconfig file; in-cluster or default config when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// Target namespace (required)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Application volume size in GB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_disk_size: Option<i64>,
    /// Database volume size in GB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_disk_size: Option<i64>,
    /// Prefix for every generated resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
}

/// Response envelope for provisioning requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionResponse {
    pub success: bool,
    pub message: String,
    /// Created resources, in creation order ("PV: wp-ab12c-db-pv")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

impl ProvisionResponse {
    pub fn ok(message: impl Into<String>, resources: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            resources,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            resources: Vec::new(),
        }
    }
}

/// Shared error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, Error>;

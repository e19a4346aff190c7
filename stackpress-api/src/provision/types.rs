//! Provisioning data model

use std::fmt;
use std::num::NonZeroU32;

use stackpress_common::{ProvisionPayload, ProvisionResponse};

use super::error::ProvisionError;
use super::naming::{build_name, new_credential, EntropySource, RandomSourceError};
use crate::config::ProvisioningConfig;
use crate::validation;

/// Database created inside MySQL for the application
pub const DATABASE_NAME: &str = "wordpressdb";

/// MySQL account the application connects with
pub const APP_USERNAME: &str = "wordpress";

/// One of the two managed workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Database,
    Application,
}

impl Tier {
    /// Product name used in resource summaries and messages
    pub fn product(&self) -> &'static str {
        match self {
            Tier::Database => "MySQL",
            Tier::Application => "WordPress",
        }
    }
}

/// Kind of cluster object recorded in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespace,
    Volume,
    VolumeClaim,
    CredentialStore,
    Workload(Tier),
    NetworkEndpoint(Tier),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Namespace => write!(f, "Namespace"),
            ResourceKind::Volume => write!(f, "PV"),
            ResourceKind::VolumeClaim => write!(f, "PVC"),
            ResourceKind::CredentialStore => write!(f, "Secret"),
            ResourceKind::Workload(tier) => write!(f, "{} Deployment", tier.product()),
            ResourceKind::NetworkEndpoint(tier) => write!(f, "{} Service", tier.product()),
        }
    }
}

/// A cluster object that was successfully created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: ResourceKind,
    pub name: String,
}

impl ManifestEntry {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.name)
    }
}

/// A validated provisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub namespace: String,
    pub deployment_prefix: String,
    pub persistence_size_gb: NonZeroU32,
    pub database_size_gb: NonZeroU32,
    pub cluster_credentials_ref: Option<String>,
}

impl ProvisionRequest {
    /// Validate a wire payload and fill in defaults
    pub fn from_payload(
        payload: ProvisionPayload,
        defaults: &ProvisioningConfig,
    ) -> Result<Self, ProvisionError> {
        let namespace = payload.namespace.unwrap_or_default().trim().to_string();
        validation::validate_namespace(&namespace)?;

        let deployment_prefix = match payload.deployment_name.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => {
                validation::validate_deployment_prefix(prefix)?;
                prefix.to_string()
            }
            _ => defaults.default_prefix.clone(),
        };

        let persistence_size_gb = validation::disk_size_or_default(
            "persistence_disk_size",
            payload.persistence_disk_size,
            defaults.default_disk_size_gb,
        )?;
        let database_size_gb = validation::disk_size_or_default(
            "database_disk_size",
            payload.database_disk_size,
            defaults.default_disk_size_gb,
        )?;

        let cluster_credentials_ref = payload
            .kubeconfig
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            namespace,
            deployment_prefix,
            persistence_size_gb,
            database_size_gb,
            cluster_credentials_ref,
        })
    }
}

/// Names of every object in one stack, all sharing the request suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackNames {
    pub db_volume: String,
    pub db_claim: String,
    pub db_workload: String,
    pub db_endpoint: String,
    pub credential_store: String,
    pub app_volume: String,
    pub app_claim: String,
    pub app_workload: String,
    pub app_endpoint: String,
}

impl StackNames {
    pub fn derive(prefix: &str, suffix: &str) -> Self {
        Self {
            db_volume: build_name(prefix, "db-pv", suffix),
            db_claim: build_name(prefix, "db-pvc", suffix),
            db_workload: build_name(prefix, "db", suffix),
            db_endpoint: build_name(prefix, "db-svc", suffix),
            credential_store: build_name(prefix, "db-secret", suffix),
            app_volume: build_name(prefix, "wp-pv", suffix),
            app_claim: build_name(prefix, "wp-pvc", suffix),
            app_workload: build_name(prefix, "wp", suffix),
            app_endpoint: build_name(prefix, "wp-svc", suffix),
        }
    }

    pub fn volume(&self, tier: Tier) -> &str {
        match tier {
            Tier::Database => &self.db_volume,
            Tier::Application => &self.app_volume,
        }
    }

    pub fn claim(&self, tier: Tier) -> &str {
        match tier {
            Tier::Database => &self.db_claim,
            Tier::Application => &self.app_claim,
        }
    }

    pub fn workload(&self, tier: Tier) -> &str {
        match tier {
            Tier::Database => &self.db_workload,
            Tier::Application => &self.app_workload,
        }
    }

    pub fn endpoint(&self, tier: Tier) -> &str {
        match tier {
            Tier::Database => &self.db_endpoint,
            Tier::Application => &self.app_endpoint,
        }
    }
}

/// Generated secrets for one stack
///
/// Lives only long enough to be written into the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub admin_password: String,
    pub app_user_password: String,
    pub database_name: &'static str,
    pub app_username: &'static str,
}

impl CredentialSet {
    pub fn generate(
        entropy: &dyn EntropySource,
        length: usize,
    ) -> Result<Self, RandomSourceError> {
        Ok(Self {
            admin_password: new_credential(entropy, length)?,
            app_user_password: new_credential(entropy, length)?,
            database_name: DATABASE_NAME,
            app_username: APP_USERNAME,
        })
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("admin_password", &"[REDACTED]")
            .field("app_user_password", &"[REDACTED]")
            .field("database_name", &self.database_name)
            .field("app_username", &self.app_username)
            .finish()
    }
}

/// Terminal result of one provisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningOutcome {
    pub success: bool,
    pub message: String,
    pub resources: Vec<ManifestEntry>,
}

impl ProvisioningOutcome {
    pub fn success(resources: Vec<ManifestEntry>) -> Self {
        Self {
            success: true,
            message: "WordPress + MySQL stack created successfully. \
                      Strong random credentials have been set for MySQL."
                .to_string(),
            resources,
        }
    }

    /// Failed outcomes never carry a partial resource list
    pub fn failure(err: &ProvisionError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            resources: Vec::new(),
        }
    }

    pub fn to_response(&self) -> ProvisionResponse {
        let resources = self.resources.iter().map(ToString::to_string).collect();
        if self.success {
            ProvisionResponse::ok(self.message.clone(), resources)
        } else {
            ProvisionResponse::failure(self.message.clone())
        }
    }
}

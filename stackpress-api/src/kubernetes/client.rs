//! Kubernetes client wrapper
//!
//! Resolves cluster credentials the same way for every request: an explicit
//! kubeconfig path when the caller supplies one, otherwise in-cluster config
//! with a fallback to the default kubeconfig.

use std::path::{Path, PathBuf};

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use super::error::{K8sError, K8sResult};

/// Wrapper around kube-rs Client with the API server it talks to
#[derive(Clone)]
pub struct K8sClient {
    inner: Client,
    api_server: String,
}

impl K8sClient {
    /// Create client from an optional kubeconfig path
    pub async fn connect(kubeconfig_path: Option<&str>) -> K8sResult<Self> {
        match kubeconfig_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_kubeconfig_file(Path::new(path)).await,
            None => match Self::from_incluster() {
                Ok(client) => Ok(client),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not use in-cluster config, falling back to default kubeconfig");
                    Self::from_default_kubeconfig().await
                }
            },
        }
    }

    /// Create client from a kubeconfig file, using its current context
    pub async fn from_kubeconfig_file(path: &Path) -> K8sResult<Self> {
        let path = absolute_path(path)?;

        let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| {
            K8sError::InvalidKubeconfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| K8sError::InvalidKubeconfig(format!("Failed to create config: {}", e)))?;

        Self::from_config(config)
    }

    /// Create client from in-cluster configuration (for running inside K8s)
    pub fn from_incluster() -> K8sResult<Self> {
        let config = Config::incluster().map_err(|e| {
            K8sError::InvalidKubeconfig(format!("Failed to get in-cluster config: {}", e))
        })?;

        Self::from_config(config)
    }

    /// Create client from `$KUBECONFIG` or `~/.kube/config`
    pub async fn from_default_kubeconfig() -> K8sResult<Self> {
        let config = Config::from_kubeconfig(&KubeConfigOptions::default())
            .await
            .map_err(|e| {
                K8sError::InvalidKubeconfig(format!("Failed to load default kubeconfig: {}", e))
            })?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> K8sResult<Self> {
        let api_server = config.cluster_url.to_string();

        let client = Client::try_from(config)
            .map_err(|e| K8sError::InvalidKubeconfig(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            inner: client,
            api_server,
        })
    }

    /// Get the inner kube-rs Client
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Get API server URL
    pub fn api_server(&self) -> &str {
        &self.api_server
    }
}

impl std::fmt::Debug for K8sClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8sClient")
            .field("api_server", &self.api_server)
            .finish()
    }
}

fn absolute_path(path: &Path) -> K8sResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| K8sError::InvalidKubeconfig(format!("invalid kubeconfig path: {}", e)))?;
    Ok(cwd.join(path))
}

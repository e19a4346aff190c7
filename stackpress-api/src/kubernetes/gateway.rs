//! Cluster gateway
//!
//! The narrow create/get surface the provisioning pipeline needs from the
//! control plane. Production code talks to a real API server through
//! [`KubeGateway`]; tests substitute an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Namespace, PersistentVolume, PersistentVolumeClaim, Secret, Service,
};
use kube::api::{Api, PostParams};

use super::client::K8sClient;
use super::error::{K8sError, K8sResult};

/// Replica counts reported by a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
}

impl WorkloadStatus {
    /// A workload is ready once at least one replica reports healthy
    pub fn is_ready(&self) -> bool {
        self.ready_replicas >= 1
    }
}

/// Create/get operations against the control plane
///
/// Every method fails with [`K8sError`]; lookups report a missing object as
/// [`K8sError::NotFound`] so it can be told apart from transport errors.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn get_namespace(&self, name: &str) -> K8sResult<()>;

    async fn create_namespace(&self, namespace: &Namespace) -> K8sResult<()>;

    async fn create_volume(&self, volume: &PersistentVolume) -> K8sResult<()>;

    async fn create_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> K8sResult<()>;

    async fn create_credential_store(&self, namespace: &str, secret: &Secret) -> K8sResult<()>;

    async fn create_workload(&self, namespace: &str, deployment: &Deployment) -> K8sResult<()>;

    async fn create_network_endpoint(&self, namespace: &str, service: &Service) -> K8sResult<()>;

    async fn get_workload_status(&self, namespace: &str, name: &str)
        -> K8sResult<WorkloadStatus>;
}

/// Produces a gateway for one request's cluster credentials
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, kubeconfig: Option<&str>) -> K8sResult<Arc<dyn ClusterGateway>>;
}

/// Connector that builds a kube-rs client per request
#[derive(Debug, Default, Clone)]
pub struct KubeConnector;

#[async_trait]
impl GatewayConnector for KubeConnector {
    async fn connect(&self, kubeconfig: Option<&str>) -> K8sResult<Arc<dyn ClusterGateway>> {
        let client = K8sClient::connect(kubeconfig).await?;
        tracing::info!(api_server = %client.api_server(), "Kubernetes client initialized");
        Ok(Arc::new(KubeGateway::new(client)))
    }
}

/// [`ClusterGateway`] backed by a live API server
#[derive(Debug, Clone)]
pub struct KubeGateway {
    client: K8sClient,
}

impl KubeGateway {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn cluster_api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::all(self.client.inner().clone())
    }

    fn namespaced_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.inner().clone(), namespace)
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get_namespace(&self, name: &str) -> K8sResult<()> {
        let namespaces: Api<Namespace> = self.cluster_api();
        namespaces
            .get(name)
            .await
            .map_err(|e| K8sError::from_lookup(e, "Namespace", name))?;
        Ok(())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> K8sResult<()> {
        let namespaces: Api<Namespace> = self.cluster_api();
        namespaces.create(&PostParams::default(), namespace).await?;
        Ok(())
    }

    async fn create_volume(&self, volume: &PersistentVolume) -> K8sResult<()> {
        let pvs: Api<PersistentVolume> = self.cluster_api();
        pvs.create(&PostParams::default(), volume).await?;
        Ok(())
    }

    async fn create_volume_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> K8sResult<()> {
        let pvcs: Api<PersistentVolumeClaim> = self.namespaced_api(namespace);
        pvcs.create(&PostParams::default(), claim).await?;
        Ok(())
    }

    async fn create_credential_store(&self, namespace: &str, secret: &Secret) -> K8sResult<()> {
        let secrets: Api<Secret> = self.namespaced_api(namespace);
        secrets.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn create_workload(&self, namespace: &str, deployment: &Deployment) -> K8sResult<()> {
        let deployments: Api<Deployment> = self.namespaced_api(namespace);
        deployments.create(&PostParams::default(), deployment).await?;
        Ok(())
    }

    async fn create_network_endpoint(&self, namespace: &str, service: &Service) -> K8sResult<()> {
        let services: Api<Service> = self.namespaced_api(namespace);
        services.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn get_workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> K8sResult<WorkloadStatus> {
        let deployments: Api<Deployment> = self.namespaced_api(namespace);
        let deployment = deployments
            .get(name)
            .await
            .map_err(|e| K8sError::from_lookup(e, "Deployment", name))?;

        let status = deployment.status.unwrap_or_default();
        Ok(WorkloadStatus {
            replicas: status.replicas.unwrap_or(0),
            ready_replicas: status.ready_replicas.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_ready_needs_one_replica() {
        assert!(!WorkloadStatus::default().is_ready());
        assert!(!WorkloadStatus { replicas: 1, ready_replicas: 0 }.is_ready());
        assert!(WorkloadStatus { replicas: 1, ready_replicas: 1 }.is_ready());
        assert!(WorkloadStatus { replicas: 3, ready_replicas: 2 }.is_ready());
    }
}

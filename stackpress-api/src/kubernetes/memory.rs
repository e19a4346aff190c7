//! In-memory cluster gateway
//!
//! Records every call and stores created objects so pipeline behavior can be
//! checked without an API server. Failures and readiness are scripted per
//! name pattern.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Namespace, PersistentVolume, PersistentVolumeClaim, Secret, Service,
};

use super::error::{K8sError, K8sResult};
use super::gateway::{ClusterGateway, GatewayConnector, WorkloadStatus};

/// Gateway operation, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    GetNamespace,
    CreateNamespace,
    CreateVolume,
    CreateVolumeClaim,
    CreateCredentialStore,
    CreateWorkload,
    CreateNetworkEndpoint,
    GetWorkloadStatus,
}

impl GatewayOp {
    pub fn is_create(&self) -> bool {
        !matches!(self, GatewayOp::GetNamespace | GatewayOp::GetWorkloadStatus)
    }
}

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub op: GatewayOp,
    pub name: String,
}

#[derive(Default)]
struct State {
    namespaces: HashSet<String>,
    calls: Vec<RecordedCall>,

    volumes: BTreeMap<String, PersistentVolume>,
    claims: BTreeMap<String, PersistentVolumeClaim>,
    secrets: BTreeMap<String, Secret>,
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,

    failures: Vec<(GatewayOp, String)>,
    never_ready: Vec<String>,
    namespace_lookup_error: Option<String>,
    ready_after_polls: u32,
    failing_status_fetches: u32,
    status_polls: BTreeMap<String, u32>,
}

/// [`ClusterGateway`] that keeps everything in process memory
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGateway")
            .field("calls", &self.lock().calls.len())
            .finish()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `name` already exists in the cluster
    pub fn with_namespace(self, name: &str) -> Self {
        self.lock().namespaces.insert(name.to_string());
        self
    }

    /// Fail `op` for any object whose name contains `pattern`
    pub fn fail_on(self, op: GatewayOp, pattern: &str) -> Self {
        self.lock().failures.push((op, pattern.to_string()));
        self
    }

    /// Make namespace lookups fail with something other than not-found
    pub fn failing_namespace_lookup(self, message: &str) -> Self {
        self.lock().namespace_lookup_error = Some(message.to_string());
        self
    }

    /// Workloads whose name contains `pattern` never report a ready replica
    pub fn never_ready(self, pattern: &str) -> Self {
        self.lock().never_ready.push(pattern.to_string());
        self
    }

    /// Each workload reports zero ready replicas for its first `polls` checks
    pub fn ready_after_polls(self, polls: u32) -> Self {
        self.lock().ready_after_polls = polls;
        self
    }

    /// The first `count` status fetches fail with a transport error
    pub fn failing_status_fetches(self, count: u32) -> Self {
        self.lock().failing_status_fetches = count;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: GatewayOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Number of create calls of any kind
    pub fn create_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.op.is_create()).count()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.lock().namespaces.contains(name)
    }

    pub fn volume(&self, name: &str) -> Option<PersistentVolume> {
        self.lock().volumes.get(name).cloned()
    }

    pub fn claim(&self, name: &str) -> Option<PersistentVolumeClaim> {
        self.lock().claims.get(name).cloned()
    }

    pub fn secrets(&self) -> Vec<Secret> {
        self.lock().secrets.values().cloned().collect()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.lock().deployments.values().cloned().collect()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.lock().deployments.get(name).cloned()
    }

    pub fn services(&self) -> Vec<Service> {
        self.lock().services.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, then apply any scripted failure
    fn record(&self, op: GatewayOp, name: &str) -> K8sResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            op,
            name: name.to_string(),
        });

        let scripted = state
            .failures
            .iter()
            .any(|(failing_op, pattern)| *failing_op == op && name.contains(pattern.as_str()));
        if scripted {
            return Err(K8sError::Internal(format!("scripted failure for {}", name)));
        }

        Ok(state)
    }
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn get_namespace(&self, name: &str) -> K8sResult<()> {
        let state = self.record(GatewayOp::GetNamespace, name)?;
        if let Some(message) = &state.namespace_lookup_error {
            return Err(K8sError::Internal(message.clone()));
        }
        if state.namespaces.contains(name) {
            Ok(())
        } else {
            Err(K8sError::NotFound {
                kind: "Namespace".to_string(),
                name: name.to_string(),
            })
        }
    }

    async fn create_namespace(&self, namespace: &Namespace) -> K8sResult<()> {
        let name = object_name(&namespace.metadata);
        let mut state = self.record(GatewayOp::CreateNamespace, &name)?;
        state.namespaces.insert(name);
        Ok(())
    }

    async fn create_volume(&self, volume: &PersistentVolume) -> K8sResult<()> {
        let name = object_name(&volume.metadata);
        let mut state = self.record(GatewayOp::CreateVolume, &name)?;
        state.volumes.insert(name, volume.clone());
        Ok(())
    }

    async fn create_volume_claim(
        &self,
        _namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> K8sResult<()> {
        let name = object_name(&claim.metadata);
        let mut state = self.record(GatewayOp::CreateVolumeClaim, &name)?;
        state.claims.insert(name, claim.clone());
        Ok(())
    }

    async fn create_credential_store(&self, _namespace: &str, secret: &Secret) -> K8sResult<()> {
        let name = object_name(&secret.metadata);
        let mut state = self.record(GatewayOp::CreateCredentialStore, &name)?;
        state.secrets.insert(name, secret.clone());
        Ok(())
    }

    async fn create_workload(&self, _namespace: &str, deployment: &Deployment) -> K8sResult<()> {
        let name = object_name(&deployment.metadata);
        let mut state = self.record(GatewayOp::CreateWorkload, &name)?;
        state.deployments.insert(name, deployment.clone());
        Ok(())
    }

    async fn create_network_endpoint(&self, _namespace: &str, service: &Service) -> K8sResult<()> {
        let name = object_name(&service.metadata);
        let mut state = self.record(GatewayOp::CreateNetworkEndpoint, &name)?;
        state.services.insert(name, service.clone());
        Ok(())
    }

    async fn get_workload_status(
        &self,
        _namespace: &str,
        name: &str,
    ) -> K8sResult<WorkloadStatus> {
        let mut state = self.record(GatewayOp::GetWorkloadStatus, name)?;

        if state.failing_status_fetches > 0 {
            state.failing_status_fetches -= 1;
            return Err(K8sError::Internal("connection reset by peer".to_string()));
        }

        let polls = state.status_polls.entry(name.to_string()).or_insert(0);
        *polls += 1;
        let polls = *polls;

        let blocked = state.never_ready.iter().any(|p| name.contains(p.as_str()));
        let ready = !blocked && polls > state.ready_after_polls;

        Ok(WorkloadStatus {
            replicas: 1,
            ready_replicas: i32::from(ready),
        })
    }
}

/// Connector that hands out one shared [`InMemoryGateway`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    gateway: InMemoryGateway,
    connect_error: Option<String>,
    seen_kubeconfigs: Arc<Mutex<Vec<Option<String>>>>,
}

impl InMemoryConnector {
    pub fn new(gateway: InMemoryGateway) -> Self {
        Self {
            gateway,
            ..Default::default()
        }
    }

    /// Every connect attempt fails with an invalid kubeconfig error
    pub fn failing(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn gateway(&self) -> &InMemoryGateway {
        &self.gateway
    }

    /// Kubeconfig references passed to `connect`, in order
    pub fn seen_kubeconfigs(&self) -> Vec<Option<String>> {
        self.seen_kubeconfigs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GatewayConnector for InMemoryConnector {
    async fn connect(&self, kubeconfig: Option<&str>) -> K8sResult<Arc<dyn ClusterGateway>> {
        self.seen_kubeconfigs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kubeconfig.map(str::to_string));

        if let Some(message) = &self.connect_error {
            return Err(K8sError::InvalidKubeconfig(message.clone()));
        }
        Ok(Arc::new(self.gateway.clone()))
    }
}

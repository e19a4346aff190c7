//! Provisioning pipeline
//!
//! Runs a fixed list of stages for one request, strictly in order. The first
//! failing stage ends the run; nothing created before it is rolled back, and
//! the objects left behind are only reported in the logs.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::descriptors;
use super::error::{GatewayAction, ProvisionError};
use super::naming::{new_suffix, EntropySource};
use super::readiness::ReadinessPoller;
use super::types::{
    CredentialSet, ManifestEntry, ProvisionRequest, ProvisioningOutcome, ResourceKind, StackNames,
    Tier,
};
use crate::config::ProvisioningConfig;
use crate::kubernetes::ClusterGateway;

/// One step of the provisioning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnsureNamespace,
    DeriveIdentity,
    DatabaseStorage,
    AppStorage,
    CredentialStore,
    DatabaseTier,
    DatabaseReadiness,
    AppTier,
    AppReadiness,
}

impl Stage {
    /// Execution order
    pub const PIPELINE: [Stage; 9] = [
        Stage::EnsureNamespace,
        Stage::DeriveIdentity,
        Stage::DatabaseStorage,
        Stage::AppStorage,
        Stage::CredentialStore,
        Stage::DatabaseTier,
        Stage::DatabaseReadiness,
        Stage::AppTier,
        Stage::AppReadiness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::EnsureNamespace => "ensure_namespace",
            Stage::DeriveIdentity => "derive_identity",
            Stage::DatabaseStorage => "database_storage",
            Stage::AppStorage => "app_storage",
            Stage::CredentialStore => "credential_store",
            Stage::DatabaseTier => "database_tier",
            Stage::DatabaseReadiness => "database_readiness",
            Stage::AppTier => "app_tier",
            Stage::AppReadiness => "app_readiness",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names and secrets derived once per request
#[derive(Debug)]
struct StackPlan {
    names: StackNames,
    credentials: CredentialSet,
}

/// Mutable state of one pipeline run
struct PipelineRun<'a> {
    request: &'a ProvisionRequest,
    plan: Option<StackPlan>,
    created: Vec<ManifestEntry>,
}

fn require_plan(plan: &Option<StackPlan>, stage: Stage) -> Result<&StackPlan, ProvisionError> {
    plan.as_ref().ok_or_else(|| {
        ProvisionError::Internal(format!("stage {} ran before names were derived", stage))
    })
}

/// Manifest entries as logged, e.g. `PV: wp-ab12c-db-pv`
fn manifest_labels(created: &[ManifestEntry]) -> Vec<String> {
    created.iter().map(ToString::to_string).collect()
}

fn record(created: &mut Vec<ManifestEntry>, kind: ResourceKind, name: &str) {
    info!(kind = %kind, name = %name, "Resource created");
    created.push(ManifestEntry::new(kind, name));
}

/// Settings the pipeline reads from configuration
#[derive(Debug, Clone)]
struct StackSettings {
    credential_length: usize,
    host_path_root: String,
    database_image: String,
    app_image: String,
}

impl StackSettings {
    fn image(&self, tier: Tier) -> &str {
        match tier {
            Tier::Database => &self.database_image,
            Tier::Application => &self.app_image,
        }
    }
}

/// Drives one request through every [`Stage`]
pub struct Sequencer {
    gateway: Arc<dyn ClusterGateway>,
    entropy: Arc<dyn EntropySource>,
    settings: StackSettings,
    poller: ReadinessPoller,
}

impl Sequencer {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        entropy: Arc<dyn EntropySource>,
        config: &ProvisioningConfig,
    ) -> Self {
        Self {
            gateway,
            entropy,
            settings: StackSettings {
                credential_length: config.credential_length,
                host_path_root: config.host_path_root.clone(),
                database_image: config.database_image.clone(),
                app_image: config.app_image.clone(),
            },
            poller: ReadinessPoller::new(
                config.readiness_poll_interval(),
                config.readiness_timeout(),
            ),
        }
    }

    /// Replace the readiness poller, e.g. to attach a shutdown signal
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Run the whole pipeline for `request`
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisioningOutcome, ProvisionError> {
        let mut run = PipelineRun {
            request,
            plan: None,
            created: Vec::new(),
        };

        for stage in Stage::PIPELINE {
            info!(namespace = %request.namespace, stage = %stage, "Running provisioning stage");

            if let Err(e) = self.run_stage(stage, &mut run).await {
                error!(
                    namespace = %request.namespace,
                    stage = %stage,
                    error = %e,
                    created = ?manifest_labels(&run.created),
                    "Provisioning aborted; created resources were left in place"
                );
                return Err(e);
            }
        }

        info!(
            namespace = %request.namespace,
            count = run.created.len(),
            resources = ?manifest_labels(&run.created),
            "WordPress + MySQL stack provisioned"
        );
        Ok(ProvisioningOutcome::success(run.created))
    }

    async fn run_stage(&self, stage: Stage, run: &mut PipelineRun<'_>) -> Result<(), ProvisionError> {
        let request = run.request;
        match stage {
            Stage::EnsureNamespace => self.ensure_namespace(&request.namespace, &mut run.created).await,
            Stage::DeriveIdentity => {
                run.plan = Some(self.derive_identity(request)?);
                Ok(())
            }
            Stage::DatabaseStorage => {
                let plan = require_plan(&run.plan, stage)?;
                self.create_storage(request, plan, Tier::Database, &mut run.created)
                    .await
            }
            Stage::AppStorage => {
                let plan = require_plan(&run.plan, stage)?;
                self.create_storage(request, plan, Tier::Application, &mut run.created)
                    .await
            }
            Stage::CredentialStore => {
                let plan = require_plan(&run.plan, stage)?;
                self.create_credential_store(request, plan, &mut run.created)
                    .await
            }
            Stage::DatabaseTier => {
                let plan = require_plan(&run.plan, stage)?;
                self.create_tier(request, plan, Tier::Database, &mut run.created)
                    .await
            }
            Stage::DatabaseReadiness => {
                let plan = require_plan(&run.plan, stage)?;
                self.await_tier(request, plan, Tier::Database).await
            }
            Stage::AppTier => {
                let plan = require_plan(&run.plan, stage)?;
                self.create_tier(request, plan, Tier::Application, &mut run.created)
                    .await
            }
            Stage::AppReadiness => {
                let plan = require_plan(&run.plan, stage)?;
                self.await_tier(request, plan, Tier::Application).await
            }
        }
    }

    /// Get the namespace, creating it only when the lookup says not-found
    async fn ensure_namespace(
        &self,
        namespace: &str,
        created: &mut Vec<ManifestEntry>,
    ) -> Result<(), ProvisionError> {
        match self.gateway.get_namespace(namespace).await {
            Ok(()) => {
                info!(namespace = %namespace, "Namespace already exists");
            }
            Err(e) if e.is_not_found() => {
                self.gateway
                    .create_namespace(&descriptors::namespace(namespace))
                    .await
                    .map_err(|e| {
                        ProvisionError::gateway(
                            GatewayAction::Create,
                            ResourceKind::Namespace,
                            namespace,
                            e,
                        )
                    })?;
                info!(namespace = %namespace, "Namespace created");
            }
            Err(e) => {
                return Err(ProvisionError::gateway(
                    GatewayAction::Lookup,
                    ResourceKind::Namespace,
                    namespace,
                    e,
                ));
            }
        }

        // Listed either way so the manifest always names the target namespace
        created.push(ManifestEntry::new(ResourceKind::Namespace, namespace));
        Ok(())
    }

    fn derive_identity(&self, request: &ProvisionRequest) -> Result<StackPlan, ProvisionError> {
        let suffix = new_suffix(self.entropy.as_ref())?;
        let names = StackNames::derive(&request.deployment_prefix, &suffix);
        let credentials =
            CredentialSet::generate(self.entropy.as_ref(), self.settings.credential_length)?;

        info!(
            namespace = %request.namespace,
            prefix = %request.deployment_prefix,
            suffix = %suffix,
            "Derived resource names and credentials"
        );
        Ok(StackPlan { names, credentials })
    }

    async fn create_storage(
        &self,
        request: &ProvisionRequest,
        plan: &StackPlan,
        tier: Tier,
        created: &mut Vec<ManifestEntry>,
    ) -> Result<(), ProvisionError> {
        let namespace = &request.namespace;
        let size_gb = match tier {
            Tier::Database => request.database_size_gb,
            Tier::Application => request.persistence_size_gb,
        };
        let volume_name = plan.names.volume(tier);
        let claim_name = plan.names.claim(tier);

        let host_path = descriptors::host_path_for(&self.settings.host_path_root, namespace, volume_name);
        self.gateway
            .create_volume(&descriptors::host_volume(volume_name, &host_path, size_gb))
            .await
            .map_err(|e| {
                ProvisionError::gateway(GatewayAction::Create, ResourceKind::Volume, volume_name, e)
            })?;
        record(created, ResourceKind::Volume, volume_name);

        self.gateway
            .create_volume_claim(
                namespace,
                &descriptors::volume_claim(namespace, claim_name, volume_name, size_gb),
            )
            .await
            .map_err(|e| {
                ProvisionError::gateway(
                    GatewayAction::Create,
                    ResourceKind::VolumeClaim,
                    claim_name,
                    e,
                )
            })?;
        record(created, ResourceKind::VolumeClaim, claim_name);

        Ok(())
    }

    async fn create_credential_store(
        &self,
        request: &ProvisionRequest,
        plan: &StackPlan,
        created: &mut Vec<ManifestEntry>,
    ) -> Result<(), ProvisionError> {
        let name = &plan.names.credential_store;
        let secret = descriptors::credential_store(
            &request.namespace,
            name,
            &plan.credentials,
            &plan.names.db_endpoint,
        );

        self.gateway
            .create_credential_store(&request.namespace, &secret)
            .await
            .map_err(|e| {
                ProvisionError::gateway(GatewayAction::Create, ResourceKind::CredentialStore, name, e)
            })?;
        record(created, ResourceKind::CredentialStore, name);

        Ok(())
    }

    /// Create a tier's deployment and then its service
    async fn create_tier(
        &self,
        request: &ProvisionRequest,
        plan: &StackPlan,
        tier: Tier,
        created: &mut Vec<ManifestEntry>,
    ) -> Result<(), ProvisionError> {
        let namespace = &request.namespace;
        let workload_name = plan.names.workload(tier);
        let endpoint_name = plan.names.endpoint(tier);

        let deployment = descriptors::workload(
            namespace,
            workload_name,
            plan.names.claim(tier),
            &plan.names.credential_store,
            self.settings.image(tier),
            tier,
        );
        self.gateway
            .create_workload(namespace, &deployment)
            .await
            .map_err(|e| {
                ProvisionError::gateway(
                    GatewayAction::Create,
                    ResourceKind::Workload(tier),
                    workload_name,
                    e,
                )
            })?;
        record(created, ResourceKind::Workload(tier), workload_name);

        let service = descriptors::endpoint(namespace, endpoint_name, workload_name, tier);
        self.gateway
            .create_network_endpoint(namespace, &service)
            .await
            .map_err(|e| {
                ProvisionError::gateway(
                    GatewayAction::Create,
                    ResourceKind::NetworkEndpoint(tier),
                    endpoint_name,
                    e,
                )
            })?;
        record(created, ResourceKind::NetworkEndpoint(tier), endpoint_name);

        Ok(())
    }

    async fn await_tier(
        &self,
        request: &ProvisionRequest,
        plan: &StackPlan,
        tier: Tier,
    ) -> Result<(), ProvisionError> {
        let name = plan.names.workload(tier);
        match self
            .poller
            .await_healthy(self.gateway.as_ref(), &request.namespace, name)
            .await
        {
            Ok(status) => {
                info!(
                    deployment = %name,
                    ready_replicas = status.ready_replicas,
                    "{} deployment is ready",
                    tier.product()
                );
                Ok(())
            }
            Err(source) => {
                warn!(deployment = %name, error = %source, "{} deployment did not become ready", tier.product());
                Err(ProvisionError::Readiness {
                    tier,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::memory::{GatewayOp, InMemoryGateway};
    use crate::provision::naming::{OsEntropy, RandomSourceError};
    use crate::provision::readiness::ReadinessError;
    use std::num::NonZeroU32;
    use std::time::Duration;

    struct FailingEntropy;

    impl EntropySource for FailingEntropy {
        fn fill_bytes(&self, _dest: &mut [u8]) -> Result<(), RandomSourceError> {
            Err(RandomSourceError("entropy pool closed".to_string()))
        }
    }

    fn request(namespace: &str, prefix: &str) -> ProvisionRequest {
        ProvisionRequest {
            namespace: namespace.to_string(),
            deployment_prefix: prefix.to_string(),
            persistence_size_gb: NonZeroU32::new(5).unwrap(),
            database_size_gb: NonZeroU32::new(5).unwrap(),
            cluster_credentials_ref: None,
        }
    }

    fn sequencer(gateway: &InMemoryGateway) -> Sequencer {
        Sequencer::new(
            Arc::new(gateway.clone()),
            Arc::new(OsEntropy),
            &ProvisioningConfig::default(),
        )
        .with_poller(ReadinessPoller::new(
            Duration::from_millis(2),
            Duration::from_millis(60),
        ))
    }

    fn labels(outcome: &ProvisioningOutcome) -> Vec<String> {
        outcome.resources.iter().map(|r| r.kind.to_string()).collect()
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(Stage::PIPELINE.first(), Some(&Stage::EnsureNamespace));
        assert_eq!(Stage::PIPELINE.last(), Some(&Stage::AppReadiness));
        let db_ready = Stage::PIPELINE.iter().position(|s| *s == Stage::DatabaseReadiness);
        let app_tier = Stage::PIPELINE.iter().position(|s| *s == Stage::AppTier);
        assert!(db_ready < app_tier);
    }

    #[tokio::test]
    async fn test_full_stack_records_ten_resources_in_order() {
        let gateway = InMemoryGateway::new();
        let outcome = sequencer(&gateway).provision(&request("demo", "site")).await.unwrap();

        assert!(outcome.success);
        assert_eq!(
            labels(&outcome),
            vec![
                "Namespace",
                "PV",
                "PVC",
                "PV",
                "PVC",
                "Secret",
                "MySQL Deployment",
                "MySQL Service",
                "WordPress Deployment",
                "WordPress Service",
            ]
        );
        assert_eq!(outcome.resources[0].name, "demo");

        let suffix = &outcome.resources[1].name["site-".len().."site-".len() + 5];
        for entry in &outcome.resources[1..] {
            assert!(entry.name.starts_with(&format!("site-{}-", suffix)), "{}", entry.name);
        }
    }

    #[tokio::test]
    async fn test_logged_resources_match_the_response() {
        let gateway = InMemoryGateway::new();
        let outcome = sequencer(&gateway).provision(&request("demo", "site")).await.unwrap();

        let logged = manifest_labels(&outcome.resources);
        assert_eq!(logged.len(), 10);
        assert_eq!(logged[0], "Namespace: demo");
        assert_eq!(logged, outcome.to_response().resources);
    }

    #[tokio::test]
    async fn test_sizes_reach_the_volumes() {
        let gateway = InMemoryGateway::new();
        let mut req = request("demo", "site");
        req.database_size_gb = NonZeroU32::new(8).unwrap();
        req.persistence_size_gb = NonZeroU32::new(20).unwrap();
        let outcome = sequencer(&gateway).provision(&req).await.unwrap();

        let capacity = |name: &str| {
            let pv = gateway.volume(name).unwrap();
            pv.spec.unwrap().capacity.unwrap()["storage"].0.clone()
        };
        assert_eq!(capacity(&outcome.resources[1].name), "8Gi");
        assert_eq!(capacity(&outcome.resources[3].name), "20Gi");
    }

    #[tokio::test]
    async fn test_secret_points_app_at_database_service() {
        let gateway = InMemoryGateway::new();
        let outcome = sequencer(&gateway).provision(&request("demo", "site")).await.unwrap();

        let db_service = outcome
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::NetworkEndpoint(Tier::Database))
            .unwrap();
        let secrets = gateway.secrets();
        assert_eq!(secrets.len(), 1);
        let data = secrets[0].data.clone().unwrap();
        assert_eq!(data["WORDPRESS_DB_HOST"].0, db_service.name.as_bytes());
        assert_eq!(data["MYSQL_ROOT_PASSWORD"].0.len(), 16);
    }

    #[tokio::test]
    async fn test_database_never_ready_stops_before_app_tier() {
        let gateway = InMemoryGateway::new().never_ready("-db");
        let err = sequencer(&gateway)
            .provision(&request("demo", "site"))
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Readiness { tier, source, .. } => {
                assert_eq!(*tier, Tier::Database);
                assert!(matches!(source, ReadinessError::Timeout { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("MySQL deployment"));
        // Only the database workload was created
        assert_eq!(gateway.count(GatewayOp::CreateWorkload), 1);
        assert_eq!(gateway.count(GatewayOp::CreateNetworkEndpoint), 1);
        assert!(gateway.deployments().iter().all(|d| {
            d.metadata.name.as_deref().is_some_and(|n| n.ends_with("-db"))
        }));
    }

    #[tokio::test]
    async fn test_app_never_ready_fails_after_everything_is_created() {
        let gateway = InMemoryGateway::new().never_ready("-wp");
        let err = sequencer(&gateway)
            .provision(&request("demo", "site"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Readiness { tier: Tier::Application, .. }));
        assert_eq!(gateway.count(GatewayOp::CreateWorkload), 2);
        assert_eq!(gateway.count(GatewayOp::CreateNetworkEndpoint), 2);
    }

    #[tokio::test]
    async fn test_existing_namespace_is_not_recreated() {
        let gateway = InMemoryGateway::new().with_namespace("demo");
        let outcome = sequencer(&gateway).provision(&request("demo", "site")).await.unwrap();

        assert_eq!(gateway.count(GatewayOp::GetNamespace), 1);
        assert_eq!(gateway.count(GatewayOp::CreateNamespace), 0);
        assert_eq!(outcome.resources.len(), 10);
    }

    #[tokio::test]
    async fn test_database_claim_failure_aborts_immediately() {
        let gateway = InMemoryGateway::new().fail_on(GatewayOp::CreateVolumeClaim, "-db-pvc");
        let err = sequencer(&gateway)
            .provision(&request("demo", "site"))
            .await
            .unwrap_err();

        match &err {
            ProvisionError::Gateway { action, kind, .. } => {
                assert_eq!(*action, GatewayAction::Create);
                assert_eq!(*kind, ResourceKind::VolumeClaim);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(gateway.count(GatewayOp::CreateVolume), 1);
        assert_eq!(gateway.count(GatewayOp::CreateCredentialStore), 0);
        assert_eq!(gateway.count(GatewayOp::CreateWorkload), 0);
        assert_eq!(gateway.count(GatewayOp::CreateNetworkEndpoint), 0);
    }

    #[tokio::test]
    async fn test_namespace_lookup_error_is_fatal() {
        let gateway = InMemoryGateway::new().failing_namespace_lookup("forbidden");
        let err = sequencer(&gateway)
            .provision(&request("demo", "site"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Gateway { action: GatewayAction::Lookup, kind: ResourceKind::Namespace, .. }
        ));
        assert_eq!(gateway.create_count(), 0);
    }

    #[tokio::test]
    async fn test_entropy_failure_happens_after_namespace_only() {
        let gateway = InMemoryGateway::new();
        let sequencer = Sequencer::new(
            Arc::new(gateway.clone()),
            Arc::new(FailingEntropy),
            &ProvisioningConfig::default(),
        );
        let err = sequencer.provision(&request("demo", "site")).await.unwrap_err();

        assert!(matches!(err, ProvisionError::RandomSource(_)));
        assert_eq!(gateway.create_count(), 1);
        assert_eq!(gateway.count(GatewayOp::CreateNamespace), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_do_not_collide() {
        let gateway = InMemoryGateway::new().with_namespace("demo");
        let sequencer = Arc::new(sequencer(&gateway));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sequencer = sequencer.clone();
                tokio::spawn(async move { sequencer.provision(&request("demo", "site")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let names: std::collections::HashSet<_> = gateway
            .deployments()
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .collect();
        assert_eq!(names.len(), 16);
    }
}

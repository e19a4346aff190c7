//! Cluster object builders
//!
//! Pure functions: every input is already validated and named, nothing here
//! touches the network.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, HTTPGetAction, HostPathVolumeSource, Namespace,
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PersistentVolumeSpec, PodSpec, PodTemplateSpec, Probe,
    Secret, SecretEnvSource, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;

use super::types::{CredentialSet, Tier};

const APP_LABEL: &str = "app";
const READ_WRITE_ONCE: &str = "ReadWriteOnce";

/// Container layout for one tier
struct TierProfile {
    container: &'static str,
    port: i32,
    port_name: &'static str,
    mount_path: &'static str,
    volume: &'static str,
    /// HTTP probe path; `None` probes the port over TCP
    http_probe_path: Option<&'static str>,
}

fn profile(tier: Tier) -> TierProfile {
    match tier {
        Tier::Database => TierProfile {
            container: "mysql",
            port: 3306,
            port_name: "mysql",
            mount_path: "/var/lib/mysql",
            volume: "mysql-persistent-storage",
            http_probe_path: None,
        },
        Tier::Application => TierProfile {
            container: "wordpress",
            port: 80,
            port_name: "http",
            mount_path: "/var/www/html",
            volume: "wordpress-persistent-storage",
            http_probe_path: Some("/"),
        },
    }
}

fn app_labels(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), value.to_string())])
}

fn storage(size_gb: NonZeroU32) -> BTreeMap<String, Quantity> {
    BTreeMap::from([("storage".to_string(), Quantity(format!("{}Gi", size_gb)))])
}

fn meta(name: &str, namespace: Option<&str>, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels,
        ..Default::default()
    }
}

/// Host directory backing a volume: `<root>/<namespace>/<volume>_data`
pub fn host_path_for(root: &str, namespace: &str, volume: &str) -> String {
    format!("{}/{}/{}_data", root.trim_end_matches('/'), namespace, volume)
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(name, None, None),
        ..Default::default()
    }
}

/// Cluster-scoped hostPath volume, labelled so its claim can select it
pub fn host_volume(name: &str, host_path: &str, size_gb: NonZeroU32) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name, None, Some(app_labels(name))),
        spec: Some(PersistentVolumeSpec {
            access_modes: Some(vec![READ_WRITE_ONCE.to_string()]),
            persistent_volume_reclaim_policy: Some("Retain".to_string()),
            capacity: Some(storage(size_gb)),
            host_path: Some(HostPathVolumeSource {
                path: host_path.to_string(),
                type_: Some("DirectoryOrCreate".to_string()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Claim bound to `volume_name` by label selector
///
/// The empty storage class keeps a default dynamic provisioner from
/// grabbing the claim before it binds to the static volume.
pub fn volume_claim(
    namespace: &str,
    name: &str,
    volume_name: &str,
    size_gb: NonZeroU32,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(name, Some(namespace), Some(app_labels(name))),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![READ_WRITE_ONCE.to_string()]),
            storage_class_name: Some(String::new()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(storage(size_gb)),
                limits: None,
            }),
            selector: Some(LabelSelector {
                match_labels: Some(app_labels(volume_name)),
                match_expressions: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Opaque secret holding both tiers' connection settings
pub fn credential_store(
    namespace: &str,
    name: &str,
    credentials: &CredentialSet,
    db_host: &str,
) -> Secret {
    let entries = [
        ("MYSQL_ROOT_PASSWORD", credentials.admin_password.as_str()),
        ("MYSQL_DATABASE", credentials.database_name),
        ("MYSQL_USER", credentials.app_username),
        ("MYSQL_PASSWORD", credentials.app_user_password.as_str()),
        ("WORDPRESS_DB_HOST", db_host),
        ("WORDPRESS_DB_USER", credentials.app_username),
        ("WORDPRESS_DB_PASSWORD", credentials.app_user_password.as_str()),
        ("WORDPRESS_DB_NAME", credentials.database_name),
    ];

    let data = entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
        .collect();

    Secret {
        metadata: meta(name, Some(namespace), None),
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

fn probe(profile: &TierProfile, initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    let port = IntOrString::Int(profile.port);
    let (tcp_socket, http_get) = match profile.http_probe_path {
        Some(path) => (
            None,
            Some(HTTPGetAction {
                path: Some(path.to_string()),
                port,
                ..Default::default()
            }),
        ),
        None => (
            Some(TCPSocketAction {
                port,
                ..Default::default()
            }),
            None,
        ),
    };

    Probe {
        tcp_socket,
        http_get,
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

/// Single-replica deployment for `tier`
///
/// The container's whole environment comes from `secret_name`; no value is
/// inlined into the pod spec.
pub fn workload(
    namespace: &str,
    name: &str,
    claim_name: &str,
    secret_name: &str,
    image: &str,
    tier: Tier,
) -> Deployment {
    let profile = profile(tier);
    let labels = app_labels(name);

    let container = Container {
        name: profile.container.to_string(),
        image: Some(image.to_string()),
        ports: Some(vec![ContainerPort {
            container_port: profile.port,
            name: Some(profile.port_name.to_string()),
            ..Default::default()
        }]),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret_name.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: profile.volume.to_string(),
            mount_path: profile.mount_path.to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(probe(&profile, 10, 5)),
        liveness_probe: Some(probe(&profile, 30, 10)),
        ..Default::default()
    };

    Deployment {
        metadata: meta(name, Some(namespace), Some(labels.clone())),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: profile.volume.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: claim_name.to_string(),
                            read_only: None,
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service in front of `workload_name`
pub fn endpoint(namespace: &str, name: &str, workload_name: &str, tier: Tier) -> Service {
    let profile = profile(tier);

    Service {
        metadata: meta(name, Some(namespace), Some(app_labels(workload_name))),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(app_labels(workload_name)),
            ports: Some(vec![ServicePort {
                name: Some(profile.port_name.to_string()),
                protocol: Some("TCP".to_string()),
                port: profile.port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

//! Kubernetes integration for Stackpress
//!
//! Provides:
//! - Cluster connection via kubeconfig or in-cluster config
//! - The create/get gateway used by the provisioning pipeline
//! - An in-memory gateway for exercising the pipeline without a cluster

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;

pub use client::K8sClient;
pub use error::{K8sError, K8sResult};
pub use gateway::{ClusterGateway, GatewayConnector, KubeConnector, KubeGateway, WorkloadStatus};
pub use memory::{GatewayOp, InMemoryConnector, InMemoryGateway};

//! Application State
//!
//! Shared, read-only state for the Stackpress API server. Each request builds
//! its own gateway and sequencer from these pieces.

use std::sync::Arc;

use crate::config::StackpressConfig;
use crate::kubernetes::{GatewayConnector, KubeConnector};
use crate::provision::{EntropySource, OsEntropy};
use crate::shutdown::ShutdownCoordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StackpressConfig>,
    pub connector: Arc<dyn GatewayConnector>,
    pub entropy: Arc<dyn EntropySource>,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(
        config: StackpressConfig,
        connector: Arc<dyn GatewayConnector>,
        entropy: Arc<dyn EntropySource>,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            entropy,
            shutdown,
        }
    }

    /// Live cluster connector and the OS random source
    pub fn production(config: StackpressConfig, shutdown: ShutdownCoordinator) -> Self {
        Self::new(config, Arc::new(KubeConnector), Arc::new(OsEntropy), shutdown)
    }
}

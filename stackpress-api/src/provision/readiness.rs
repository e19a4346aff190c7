//! Workload readiness polling
//!
//! Blocks a provisioning pipeline until a deployment reports a ready replica.
//! Fetch errors while polling are treated as "not ready yet"; only the
//! deadline or a shutdown signal ends the wait with an error.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::kubernetes::{ClusterGateway, WorkloadStatus};

/// Default time between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time a workload has to become ready
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The deadline passed without a ready replica
    #[error("not ready after {waited:?}{}", last_error_suffix(.last_error))]
    Timeout {
        waited: Duration,
        /// Most recent transient fetch failure, if any
        last_error: Option<String>,
    },

    /// The server is shutting down
    #[error("wait cancelled by shutdown")]
    Cancelled,
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {})", e),
        None => String::new(),
    }
}

/// Polls a workload's status until it is ready or the deadline passes
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT)
    }
}

impl ReadinessPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            shutdown: None,
        }
    }

    /// Abort waits once the receiver observes `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `namespace/name` reports at least one ready replica
    pub async fn await_healthy(
        &self,
        gateway: &dyn ClusterGateway,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadStatus, ReadinessError> {
        info!(namespace = %namespace, deployment = %name, "Checking readiness for deployment");

        let deadline = Instant::now() + self.timeout;
        let mut last_error = None;

        let outcome = {
            let polling = tokio::time::timeout_at(
                deadline,
                self.poll_until_ready(gateway, namespace, name, &mut last_error),
            );
            tokio::select! {
                biased;
                _ = wait_for_shutdown(self.shutdown.clone()) => return Err(ReadinessError::Cancelled),
                result = polling => result,
            }
        };

        match outcome {
            Ok(status) => Ok(status),
            Err(_elapsed) => {
                warn!(
                    namespace = %namespace,
                    deployment = %name,
                    timeout_secs = self.timeout.as_secs(),
                    "Deployment not ready in time"
                );
                Err(ReadinessError::Timeout {
                    waited: self.timeout,
                    last_error,
                })
            }
        }
    }

    async fn poll_until_ready(
        &self,
        gateway: &dyn ClusterGateway,
        namespace: &str,
        name: &str,
        last_error: &mut Option<String>,
    ) -> WorkloadStatus {
        loop {
            match gateway.get_workload_status(namespace, name).await {
                Ok(status) if status.is_ready() => return status,
                Ok(status) => {
                    debug!(
                        deployment = %name,
                        ready_replicas = status.ready_replicas,
                        replicas = status.replicas,
                        "Deployment not ready yet"
                    );
                }
                Err(e) => {
                    warn!(deployment = %name, error = %e, "Error fetching deployment status");
                    *last_error = Some(e.to_string());
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Resolves once shutdown is signalled; never resolves without a receiver
async fn wait_for_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = shutdown else {
        return std::future::pending().await;
    };

    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // Sender gone without signalling
            return std::future::pending().await;
        }
    }
}

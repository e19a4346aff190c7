//! Common test utilities and helpers

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use stackpress_api::config::StackpressConfig;
use stackpress_api::kubernetes::InMemoryConnector;
use stackpress_api::provision::{EntropySource, OsEntropy};
use stackpress_api::shutdown::ShutdownCoordinator;
use stackpress_api::{router, AppState};
use tower::ServiceExt;

/// Config with the shortest readiness budget the validator accepts
pub fn test_config() -> StackpressConfig {
    let mut config = StackpressConfig::default();
    config.provisioning.readiness_timeout_secs = 1;
    config.provisioning.readiness_poll_interval_secs = 1;
    config
}

pub fn app_with(connector: InMemoryConnector, entropy: Arc<dyn EntropySource>) -> Router {
    let state = AppState::new(
        test_config(),
        Arc::new(connector),
        entropy,
        ShutdownCoordinator::new(),
    );
    router(Arc::new(state))
}

pub fn app(connector: InMemoryConnector) -> Router {
    app_with(connector, Arc::new(OsEntropy))
}

pub fn post_json(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/create-wordpress")
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

/// Send a request and decode the JSON response body
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

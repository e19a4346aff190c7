//! HTTP API Tests
//! Drives the router end to end against the in-memory gateway

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use stackpress_api::kubernetes::{GatewayOp, InMemoryConnector, InMemoryGateway};
use stackpress_api::provision::{EntropySource, RandomSourceError};

use common::{app, app_with, post_json, send};

struct NoEntropy;

impl EntropySource for NoEntropy {
    fn fill_bytes(&self, _dest: &mut [u8]) -> Result<(), RandomSourceError> {
        Err(RandomSourceError("entropy device unavailable".to_string()))
    }
}

fn volume_capacity(gateway: &InMemoryGateway, entry: &str) -> String {
    let name = entry.split_once(": ").unwrap().1;
    let pv = gateway.volume(name).unwrap();
    pv.spec.unwrap().capacity.unwrap()["storage"].0.clone()
}

// ============== Provisioning ==============

#[tokio::test]
async fn test_full_stack_with_defaults() {
    let connector = InMemoryConnector::new(InMemoryGateway::new());
    let (status, body) = send(
        app(connector.clone()),
        post_json(json!({"namespace": "demo", "deployment_name": "site"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("created successfully"));

    let resources: Vec<&str> = body["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert_eq!(resources.len(), 10);
    assert_eq!(resources[0], "Namespace: demo");
    assert!(resources[1].starts_with("PV: site-"));
    assert!(resources[5].starts_with("Secret: site-"));
    assert!(resources[9].starts_with("WordPress Service: site-"));

    let gateway = connector.gateway();
    assert_eq!(volume_capacity(gateway, resources[1]), "5Gi");
    assert_eq!(volume_capacity(gateway, resources[3]), "5Gi");
    assert_eq!(connector.seen_kubeconfigs(), vec![None]);
}

#[tokio::test]
async fn test_non_positive_sizes_use_default() {
    let connector = InMemoryConnector::new(InMemoryGateway::new());
    let (status, body) = send(
        app(connector.clone()),
        post_json(
            json!({
                "namespace": "demo",
                "persistence_disk_size": 0,
                "database_disk_size": -4
            })
            .to_string(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let resources = body["resources"].as_array().unwrap();
    for index in [1, 3] {
        let entry = resources[index].as_str().unwrap();
        assert!(entry.starts_with("PV: wp-"), "{}", entry);
        assert_eq!(volume_capacity(connector.gateway(), entry), "5Gi");
    }
}

#[tokio::test]
async fn test_explicit_sizes_and_kubeconfig_are_used() {
    let connector = InMemoryConnector::new(InMemoryGateway::new());
    let (status, body) = send(
        app(connector.clone()),
        post_json(
            json!({
                "kubeconfig": "/etc/stackpress/cluster.yaml",
                "namespace": "demo",
                "persistence_disk_size": 20,
                "database_disk_size": 8
            })
            .to_string(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let resources = body["resources"].as_array().unwrap();
    let db_pv = resources[1].as_str().unwrap();
    let wp_pv = resources[3].as_str().unwrap();
    assert_eq!(volume_capacity(connector.gateway(), db_pv), "8Gi");
    assert_eq!(volume_capacity(connector.gateway(), wp_pv), "20Gi");
    assert_eq!(
        connector.seen_kubeconfigs(),
        vec![Some("/etc/stackpress/cluster.yaml".to_string())]
    );
}

#[tokio::test]
async fn test_existing_namespace_is_reused() {
    let connector = InMemoryConnector::new(InMemoryGateway::new().with_namespace("demo"));
    let (status, body) = send(
        app(connector.clone()),
        post_json(json!({"namespace": "demo"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"].as_array().unwrap().len(), 10);
    assert_eq!(connector.gateway().count(GatewayOp::CreateNamespace), 0);
}

// ============== Validation ==============

#[tokio::test]
async fn test_empty_namespace_makes_no_cluster_calls() {
    for payload in [json!({"namespace": ""}), json!({"namespace": "   "}), json!({})] {
        let connector = InMemoryConnector::new(InMemoryGateway::new());
        let (status, body) = send(app(connector.clone()), post_json(payload.to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "namespace is required");
        assert!(body.get("resources").is_none());
        assert!(connector.seen_kubeconfigs().is_empty());
        assert!(connector.gateway().calls().is_empty());
    }
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    for payload in [
        json!({"namespace": "Demo"}),
        json!({"namespace": "demo", "deployment_name": "My Site"}),
        json!({"namespace": "demo", "deployment_name": "9lives"}),
    ] {
        let connector = InMemoryConnector::new(InMemoryGateway::new());
        let (status, body) = send(app(connector.clone()), post_json(payload.to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(connector.gateway().calls().is_empty());
    }
}

#[tokio::test]
async fn test_malformed_json() {
    let connector = InMemoryConnector::new(InMemoryGateway::new());
    let (status, body) = send(app(connector.clone()), post_json("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid JSON payload");
    assert!(connector.seen_kubeconfigs().is_empty());
}

#[tokio::test]
async fn test_non_post_is_rejected() {
    for method in ["GET", "PUT", "DELETE"] {
        let connector = InMemoryConnector::new(InMemoryGateway::new());
        let request = Request::builder()
            .method(method)
            .uri("/create-wordpress")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(connector.clone()), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Only POST is allowed");
        assert!(connector.seen_kubeconfigs().is_empty());
    }
}

// ============== Failures ==============

#[tokio::test]
async fn test_database_never_ready() {
    let connector = InMemoryConnector::new(InMemoryGateway::new().never_ready("-db"));
    let (status, body) = send(
        app(connector.clone()),
        post_json(json!({"namespace": "demo", "deployment_name": "site"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("MySQL deployment site-"));
    assert!(body.get("resources").is_none());

    let gateway = connector.gateway();
    assert_eq!(gateway.count(GatewayOp::CreateWorkload), 1);
    assert_eq!(gateway.deployments().len(), 1);
}

#[tokio::test]
async fn test_database_claim_failure() {
    let connector = InMemoryConnector::new(
        InMemoryGateway::new().fail_on(GatewayOp::CreateVolumeClaim, "-db-pvc"),
    );
    let (status, body) = send(
        app(connector.clone()),
        post_json(json!({"namespace": "demo"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to create PVC wp-"));

    let gateway = connector.gateway();
    assert_eq!(gateway.count(GatewayOp::CreateWorkload), 0);
    assert_eq!(gateway.count(GatewayOp::CreateNetworkEndpoint), 0);
    assert_eq!(gateway.count(GatewayOp::CreateCredentialStore), 0);
}

#[tokio::test]
async fn test_client_init_failure() {
    let connector = InMemoryConnector::failing("no such file");
    let (status, body) = send(
        app(connector.clone()),
        post_json(json!({"kubeconfig": "/missing", "namespace": "demo"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Could not initialize Kubernetes client"));
    assert!(connector.gateway().calls().is_empty());
}

#[tokio::test]
async fn test_entropy_failure() {
    let connector = InMemoryConnector::new(InMemoryGateway::new());
    let (status, body) = send(
        app_with(connector.clone(), Arc::new(NoEntropy)),
        post_json(json!({"namespace": "demo"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("entropy device unavailable"));
    assert_eq!(connector.gateway().count(GatewayOp::CreateVolume), 0);
}

// ============== Health ==============

#[tokio::test]
async fn test_liveness_probe() {
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(InMemoryConnector::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

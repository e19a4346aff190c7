//! HTTP surface
//!
//! `POST /create-wordpress` runs one provisioning pipeline; `GET /healthz` is
//! a liveness probe.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stackpress_common::{ProvisionPayload, ProvisionResponse};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::provision::{ProvisionError, ProvisionRequest, ReadinessPoller, Sequencer};
use crate::state::AppState;

/// Liveness probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: i64,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/create-wordpress",
            post(create_wordpress).fallback(method_not_allowed),
        )
        .route("/healthz", get(liveness_probe))
        .with_state(state)
}

async fn liveness_probe() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        alive: true,
        timestamp: chrono::Utc::now().timestamp(),
    })
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ProvisionResponse::failure("Only POST is allowed")),
    )
        .into_response()
}

/// Provision a WordPress + MySQL stack
async fn create_wordpress(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProvisionPayload>, JsonRejection>,
) -> Result<Json<ProvisionResponse>, ProvisionError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected provisioning request body");
        ProvisionError::Validation("Invalid JSON payload".to_string())
    })?;

    let request = ProvisionRequest::from_payload(payload, &state.config.provisioning)
        .inspect_err(|e| warn!(error = %e, "Rejected provisioning request"))?;

    let span = info_span!(
        "provision",
        request_id = %Uuid::new_v4(),
        namespace = %request.namespace,
        prefix = %request.deployment_prefix,
    );

    async move {
        info!(
            persistence_size_gb = request.persistence_size_gb.get(),
            database_size_gb = request.database_size_gb.get(),
            "Provisioning request accepted"
        );

        let gateway = state
            .connector
            .connect(request.cluster_credentials_ref.as_deref())
            .await
            .map_err(|e| {
                warn!(error = %e, "Could not initialize Kubernetes client");
                ProvisionError::ClientInit(e)
            })?;

        let provisioning = &state.config.provisioning;
        let poller = ReadinessPoller::new(
            provisioning.readiness_poll_interval(),
            provisioning.readiness_timeout(),
        )
        .with_shutdown(state.shutdown.subscribe());

        let outcome = Sequencer::new(gateway, state.entropy.clone(), provisioning)
            .with_poller(poller)
            .provision(&request)
            .await?;

        Ok::<_, ProvisionError>(Json(outcome.to_response()))
    }
    .instrument(span)
    .await
}

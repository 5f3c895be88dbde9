//! Tenant provisioning and health endpoints.

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

/// Provision storage for the request's tenant. `POST /settings/tenant`
///
/// Idempotent; the gateway calls this when a tenant is enabled for the
/// module, and again on upgrades.
pub async fn init_tenant(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<StatusCode> {
    state.store.init_tenant(&identity.tenant).await?;
    tracing::info!(tenant = %identity.tenant, "tenant storage provisioned");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check. `GET /health`
///
/// Intentionally unauthenticated for load balancers and k8s probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.health_check().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

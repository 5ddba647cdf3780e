//! # API Handlers
//!
//! Thin HTTP glue over the orchestrator operations.

pub mod cache;
pub mod devices;
pub mod erp;

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cache::TopologyState;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Health report; never calls the vendor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub service: ServiceInfo,
    pub topology_state: TopologyState,
    pub erp_enabled: bool,
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness and cache state
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse, example = json!({
            "status": "ok",
            "service": "device-bridge",
            "version": "0.1.0",
            "topology_state": "fresh",
            "erp_enabled": false
        }))
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: ServiceInfo::default(),
        topology_state: state.orchestrator.topology_state().await,
        erp_enabled: state.erp.is_some(),
    })
}

#[cfg(test)]
mod tests;

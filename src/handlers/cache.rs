//! # Cache Handlers

use axum::{extract::State, response::Json};

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::orchestrator::{CacheCleared, CacheStatus};
use crate::server::AppState;

/// Reports topology state and per-cluster snapshot freshness
#[utoipa::path(
    get,
    path = "/cache/status",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cache state", body = CacheStatus),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "cache"
)]
pub async fn cache_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Json<CacheStatus> {
    Json(state.orchestrator.cache_status().await)
}

/// Drops all cached topology and device data.
///
/// The next request runs a full vendor discovery; meant for recovery only.
#[utoipa::path(
    post,
    path = "/cache/clear",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caches cleared", body = CacheCleared),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "cache"
)]
pub async fn cache_clear(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Json<CacheCleared> {
    Json(state.orchestrator.cache_clear().await)
}

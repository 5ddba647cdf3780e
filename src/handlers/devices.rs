//! # Device Handlers
//!
//! List, create, update and delete devices across the vendor clusters.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::models::{CreateDeviceRequest, DevicePatch};
use crate::orchestrator::{CreatedDevice, DeletedDevice, DeviceListing, UpdatedDevice};
use crate::server::AppState;

/// Lists every device of every discovered cluster
#[utoipa::path(
    get,
    path = "/devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Devices with per-cluster summary", body = DeviceListing),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "Vendor read failed", body = ApiError),
        (status = 503, description = "Cluster topology unavailable", body = ApiError),
        (status = 504, description = "Vendor timed out", body = ApiError)
    ),
    tag = "devices"
)]
pub async fn list_devices(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<DeviceListing>, ApiError> {
    Ok(Json(state.orchestrator.list_devices().await?))
}

/// Creates a device in the cluster hosting its type
#[utoipa::path(
    post,
    path = "/devices",
    security(("bearer_auth" = [])),
    request_body(content = CreateDeviceRequest, example = json!({
        "customer": "Golden Crust Manchester",
        "site": "Manchester Production",
        "area": "Flour Storage Silo A",
        "erp_reference": "ERP024_025_01",
        "device_type": "rodent_sensor"
    })),
    responses(
        (status = 201, description = "Device created", body = CreatedDevice),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "Vendor rejected the cluster write", body = ApiError),
        (status = 503, description = "Cluster topology unavailable", body = ApiError)
    ),
    tag = "devices"
)]
pub async fn create_device(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<CreateDeviceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedDevice>), ApiError> {
    let Json(request) = payload?;
    let created = state.orchestrator.create_device(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Applies a partial update to a device
#[utoipa::path(
    put,
    path = "/devices/{guid}",
    security(("bearer_auth" = [])),
    params(("guid" = String, Path, description = "Device GUID assigned by this service")),
    request_body = DevicePatch,
    responses(
        (status = 200, description = "Device updated", body = UpdatedDevice),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown GUID", body = ApiError),
        (status = 502, description = "Vendor rejected the cluster write", body = ApiError)
    ),
    tag = "devices"
)]
pub async fn update_device(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(guid): Path<String>,
    payload: Result<Json<DevicePatch>, JsonRejection>,
) -> Result<Json<UpdatedDevice>, ApiError> {
    let Json(patch) = payload?;
    Ok(Json(state.orchestrator.update_device(&guid, patch).await?))
}

/// Removes a device from its cluster
#[utoipa::path(
    delete,
    path = "/devices/{guid}",
    security(("bearer_auth" = [])),
    params(("guid" = String, Path, description = "Device GUID assigned by this service")),
    responses(
        (status = 200, description = "Device deleted", body = DeletedDevice),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown GUID", body = ApiError),
        (status = 502, description = "Vendor rejected the cluster write", body = ApiError)
    ),
    tag = "devices"
)]
pub async fn delete_device(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(guid): Path<String>,
) -> Result<Json<DeletedDevice>, ApiError> {
    Ok(Json(state.orchestrator.delete_device(&guid).await?))
}

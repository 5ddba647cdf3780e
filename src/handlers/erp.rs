//! # ERP Handlers
//!
//! Inspection point views and mapping reports. Answer 503 when no ERP is configured.

use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde_json::json;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, ErrorType};
use crate::models::{InspectionPointView, MappingReport, UnmappedPoint};
use crate::orchestrator::ErpMappingService;
use crate::server::AppState;

fn erp_service(state: &AppState) -> Result<Arc<ErpMappingService>, ApiError> {
    state.erp.clone().ok_or_else(|| {
        ApiError::from(ErrorType::ServiceUnavailable)
            .with_details(json!({ "reason": "ERP integration is not configured" }))
    })
}

/// Lists ERP inspection points with their derived device location
#[utoipa::path(
    get,
    path = "/erp/inspection-points",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Inspection points", body = [InspectionPointView]),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "ERP call failed", body = ApiError),
        (status = 503, description = "ERP not configured", body = ApiError)
    ),
    tag = "erp"
)]
pub async fn list_inspection_points(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<Vec<InspectionPointView>>, ApiError> {
    let service = erp_service(&state)?;
    Ok(Json(service.list_inspection_points().await?))
}

/// Maps inspection points to devices by ERP reference
#[utoipa::path(
    get,
    path = "/erp/mapping",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Mapping report", body = MappingReport),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "ERP or vendor call failed", body = ApiError),
        (status = 503, description = "ERP not configured or topology unavailable", body = ApiError)
    ),
    tag = "erp"
)]
pub async fn mapping_report(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<MappingReport>, ApiError> {
    let service = erp_service(&state)?;
    Ok(Json(service.mapping_report().await?))
}

/// Inspection points without a device, with create templates
#[utoipa::path(
    get,
    path = "/erp/unmapped",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unmapped inspection points", body = [UnmappedPoint]),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "ERP or vendor call failed", body = ApiError),
        (status = 503, description = "ERP not configured or topology unavailable", body = ApiError)
    ),
    tag = "erp"
)]
pub async fn unmapped_inspection_points(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<Vec<UnmappedPoint>>, ApiError> {
    let service = erp_service(&state)?;
    Ok(Json(service.unmapped_inspection_points().await?))
}

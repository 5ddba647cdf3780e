//! ERP inspection points and the mapping report built from them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::device::{CreateDeviceRequest, LocationFields};

/// Product record from the ERP inspection-point category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InspectionPoint {
    pub id: i64,
    pub name: String,
    /// ERP reference (`default_code`), the join key against device locations
    pub reference: String,
    /// Barcode printed on the point, usually the device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_identifier: Option<String>,
    pub active: bool,
}

/// Inspection point with the location a device for it would carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InspectionPointView {
    pub inspection_point: InspectionPoint,
    pub derived_location: LocationFields,
    pub proposed_location: Vec<String>,
}

/// Suggested follow-up for an inspection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    None,
    CreateDeviceWithSentinelId,
}

/// Mapping outcome of a single inspection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointMapping {
    pub inspection_point: InspectionPoint,
    pub derived_location: LocationFields,
    pub mapped: bool,
    /// GUID of the first matching device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub ambiguous_mapping: bool,
    /// Every device GUID matching the point when more than one does
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_guids: Vec<String>,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MappingSummary {
    pub total_inspection_points: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub ambiguous: usize,
    /// Percentage of points with at least one matching device, rounded to one decimal
    pub coverage_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MappingReport {
    pub summary: MappingSummary,
    pub points: Vec<PointMapping>,
}

/// Inspection point lacking a device, with a ready-to-submit creation template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnmappedPoint {
    pub inspection_point: InspectionPoint,
    pub create_request: CreateDeviceRequest,
}

//! # Data Models
//!
//! Vendor cluster documents, canonical device views and ERP inspection points.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod device;
pub mod inspection_point;

pub use device::{
    CanonicalDevice, ClusterData, CreateDeviceRequest, DeviceCluster, DevicePatch,
    DeviceStatus, DeviceType, GATEWAY_RECORD_TYPE, GUID_PREFIX, LocationFields, RawDevice,
    SENSOR_RECORD_TYPE, SENTINEL_DEVICE_ID, is_valid_erp_reference,
};
pub use inspection_point::{
    InspectionPoint, InspectionPointView, MappingReport, MappingSummary, PointMapping,
    RecommendedAction, UnmappedPoint,
};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "device-bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

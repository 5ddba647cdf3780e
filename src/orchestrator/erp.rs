//! ERP inspection point views and device mapping.
//!
//! Read-only: combines the ERP's inspection points with the current device
//! listing; nothing here writes to either side.

use std::sync::Arc;

use tracing::{info, instrument};

use super::DeviceOrchestrator;
use crate::connectors::InspectionPointSource;
use crate::error::{BridgeError, OperationContext};
use crate::mapping::erp::{self, LocationDefaults};
use crate::models::{InspectionPoint, InspectionPointView, MappingReport, UnmappedPoint};

pub struct ErpMappingService {
    source: Arc<dyn InspectionPointSource>,
    orchestrator: Arc<DeviceOrchestrator>,
    defaults: LocationDefaults,
}

impl ErpMappingService {
    pub fn new(
        source: Arc<dyn InspectionPointSource>,
        orchestrator: Arc<DeviceOrchestrator>,
        defaults: LocationDefaults,
    ) -> Self {
        Self {
            source,
            orchestrator,
            defaults,
        }
    }

    /// ERP inspection points with their derived location.
    #[instrument(skip(self), fields(operation = "list_inspection_points"))]
    pub async fn list_inspection_points(&self) -> Result<Vec<InspectionPointView>, BridgeError> {
        let points = self.points("list_inspection_points").await?;
        Ok(erp::inspection_point_views(&points, &self.defaults))
    }

    /// Join inspection points to devices by ERP reference.
    #[instrument(skip(self), fields(operation = "mapping_report"))]
    pub async fn mapping_report(&self) -> Result<MappingReport, BridgeError> {
        let points = self.points("mapping_report").await?;
        let listing = self.orchestrator.list_devices().await?;
        let report = erp::build_report(&points, &listing.devices, &self.defaults);
        info!(
            total = report.summary.total_inspection_points,
            mapped = report.summary.mapped,
            ambiguous = report.summary.ambiguous,
            coverage_percent = report.summary.coverage_percent,
            "Built ERP mapping report"
        );
        Ok(report)
    }

    /// Inspection points without a device, each with a ready-made create request.
    pub async fn unmapped_inspection_points(&self) -> Result<Vec<UnmappedPoint>, BridgeError> {
        let report = self.mapping_report().await?;
        Ok(erp::unmapped_points(&report))
    }

    async fn points(&self, operation: &'static str) -> Result<Vec<InspectionPoint>, BridgeError> {
        self.source
            .inspection_points()
            .await
            .map_err(|source| BridgeError::Erp {
                context: OperationContext::new(operation, "inspection points"),
                source,
            })
    }
}

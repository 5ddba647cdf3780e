//! Collaborator trait definitions
//!
//! Defines the interfaces the orchestrator consumes: the IoT vendor cluster
//! store and the read-only ERP inspection point source.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DeviceCluster, InspectionPoint};
use crate::retry::Retryable;

/// Vendor call failures, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VendorError {
    /// Request exceeded its deadline; a write may or may not have been applied
    #[error("vendor request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Transport failure; `not_applied` is set when the request never reached the vendor
    #[error("vendor network error: {details}")]
    Network { details: String, not_applied: bool },

    #[error("vendor returned HTTP {status}: {body}")]
    Http {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },

    #[error("vendor rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("malformed vendor response: {details}")]
    MalformedResponse { details: String },

    #[error("cluster {cluster_id} not found at vendor")]
    ClusterNotFound { cluster_id: String },
}

impl VendorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, VendorError::Timeout { .. })
    }
}

impl Retryable for VendorError {
    fn is_retryable(&self) -> bool {
        match self {
            VendorError::Timeout { .. } | VendorError::Network { .. } => true,
            VendorError::Http { status, .. } => *status == 429 || *status >= 500,
            VendorError::Unauthorized { .. }
            | VendorError::MalformedResponse { .. }
            | VendorError::ClusterNotFound { .. } => false,
        }
    }

    fn confirmed_not_applied(&self) -> bool {
        match self {
            VendorError::Network { not_applied, .. } => *not_applied,
            VendorError::Http { status, .. } => *status == 429 || *status == 503,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            VendorError::Http {
                retry_after: Some(seconds),
                ..
            } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

/// ERP collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErpError {
    #[error("ERP authentication failed for user {username}")]
    AuthenticationFailed { username: String },

    #[error("ERP request failed: {details}")]
    Transport { details: String },

    #[error("ERP returned HTTP {status}")]
    Http { status: u16 },

    #[error("ERP fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("malformed ERP response: {details}")]
    MalformedResponse { details: String },
}

/// Vendor device cluster store.
///
/// Writes are whole-cluster: there is no partial update at the vendor.
#[async_trait]
pub trait DeviceCloud: Send + Sync {
    /// Full-scan discovery of every cluster, all record types. Expensive.
    async fn discover_all_clusters(&self) -> Result<Vec<DeviceCluster>, VendorError>;

    /// Read one cluster.
    async fn get_cluster(
        &self,
        cluster_id: &str,
        record_type: &str,
    ) -> Result<DeviceCluster, VendorError>;

    /// Replace one cluster with `cluster`, addressed by its id and record type.
    async fn put_cluster(&self, cluster: &DeviceCluster) -> Result<(), VendorError>;
}

/// Read-only source of ERP inspection points.
#[async_trait]
pub trait InspectionPointSource: Send + Sync {
    async fn inspection_points(&self) -> Result<Vec<InspectionPoint>, ErpError>;
}

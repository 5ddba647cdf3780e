//! In-process caches owned by the orchestrator
//!
//! - [`TopologyCache`]: device type → hosting cluster, long TTL, single-flight discovery
//! - [`DeviceDataCache`]: cluster id → cluster snapshot, short TTL, surgical deltas

pub mod device_data;
pub mod topology;

use thiserror::Error;

pub use device_data::{ClusterCacheStatus, ClusterLock, DeviceDataCache, DeviceDataStatus};
pub use topology::{ClusterRef, TopologyCache, TopologyState, TopologyStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Discovery failed and no fresh topology is available
    #[error("cluster topology unavailable: {cause}")]
    TopologyUnavailable { cause: String },

    /// Discovery succeeded but found no cluster for the record type
    #[error("no cluster with record type {record_type} was discovered")]
    NoClusterForType { record_type: String },

    #[error("cluster {cluster_id} has no cached snapshot")]
    ClusterNotCached { cluster_id: String },

    /// The GUID is absent from the cached snapshot
    #[error("device {guid} is not in the cached snapshot of cluster {cluster_id}")]
    StaleMutationTarget { cluster_id: String, guid: String },

    #[error("cluster {cluster_id} has unsupported record type {record_type}")]
    UnsupportedRecordType {
        cluster_id: String,
        record_type: String,
    },
}

//! Per-cluster device snapshot cache
//!
//! Snapshots hold the whole vendor cluster document so a write-back can be
//! built from them without losing vendor fields. After a successful vendor
//! write the orchestrator applies the same single-device delta here instead of
//! re-fetching, which keeps every other device in the cluster warm.
//!
//! Mutations of one cluster are serialized through [`DeviceDataCache::lock_cluster`].
//! Readers never take that lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;
use utoipa::ToSchema;

use super::CacheError;
use crate::models::{DeviceCluster, DevicePatch, DeviceType, RawDevice};
use crate::normalization;

/// Exclusive right to mutate one cluster, held from fetch through cache update.
pub type ClusterLock = OwnedMutexGuard<()>;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClusterCacheStatus {
    pub cluster_id: String,
    pub cluster_name: String,
    pub record_type: String,
    pub device_count: usize,
    pub age_seconds: u64,
    pub valid: bool,
    /// Deltas applied since the snapshot was last fetched
    pub surgical_updates: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceDataStatus {
    pub ttl_seconds: u64,
    pub cached_clusters: usize,
    pub valid_clusters: usize,
    pub clusters: Vec<ClusterCacheStatus>,
}

#[derive(Debug)]
struct CacheEntry {
    cluster: DeviceCluster,
    stored_at: Instant,
    surgical_updates: u64,
}

pub struct DeviceDataCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquire the mutation lock for a cluster.
    pub async fn lock_cluster(&self, cluster_id: &str) -> ClusterLock {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(cluster_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Snapshot of a cluster if one is cached and within TTL.
    pub async fn get_cluster_snapshot(&self, cluster_id: &str) -> Option<DeviceCluster> {
        let entries = self.entries.read().await;
        match entries.get(cluster_id) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                counter!("device_cache_hits_total").increment(1);
                Some(entry.cluster.clone())
            }
            _ => {
                counter!("device_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Store a freshly fetched cluster, replacing any previous snapshot and its deltas.
    pub async fn put_cluster_snapshot(&self, cluster: DeviceCluster) {
        debug!(
            cluster_id = %cluster.id,
            device_count = cluster.devices().len(),
            "Caching cluster snapshot"
        );
        self.entries.write().await.insert(
            cluster.id.clone(),
            CacheEntry {
                cluster,
                stored_at: Instant::now(),
                surgical_updates: 0,
            },
        );
    }

    /// Append a device that the vendor has accepted.
    pub async fn apply_insert(&self, cluster_id: &str, device: RawDevice) -> Result<(), CacheError> {
        self.apply(cluster_id, "insert", |cluster| {
            cluster.data.devices.push(device);
            Ok(())
        })
        .await
    }

    /// Apply a patch the vendor has accepted, returning the updated entry.
    pub async fn apply_update(
        &self,
        cluster_id: &str,
        guid: &str,
        patch: &DevicePatch,
    ) -> Result<RawDevice, CacheError> {
        self.apply(cluster_id, "update", |cluster| {
            let device_type = device_type_of(cluster)?;
            let index = position(cluster, guid)?;
            let device = &mut cluster.data.devices[index];
            normalization::apply_patch(device, patch, device_type);
            Ok(device.clone())
        })
        .await
    }

    /// Remove a device the vendor no longer holds, returning the removed entry.
    pub async fn apply_remove(&self, cluster_id: &str, guid: &str) -> Result<RawDevice, CacheError> {
        self.apply(cluster_id, "remove", |cluster| {
            let index = position(cluster, guid)?;
            Ok(cluster.data.devices.remove(index))
        })
        .await
    }

    pub async fn invalidate(&self, cluster_id: &str) {
        self.entries.write().await.remove(cluster_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn status(&self) -> DeviceDataStatus {
        let entries = self.entries.read().await;
        let mut clusters: Vec<ClusterCacheStatus> = entries
            .values()
            .map(|entry| {
                let age = entry.stored_at.elapsed();
                ClusterCacheStatus {
                    cluster_id: entry.cluster.id.clone(),
                    cluster_name: entry.cluster.name.clone(),
                    record_type: entry.cluster.record_type.clone(),
                    device_count: entry.cluster.devices().len(),
                    age_seconds: age.as_secs(),
                    valid: age < self.ttl,
                    surgical_updates: entry.surgical_updates,
                }
            })
            .collect();
        clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

        DeviceDataStatus {
            ttl_seconds: self.ttl.as_secs(),
            cached_clusters: clusters.len(),
            valid_clusters: clusters.iter().filter(|cluster| cluster.valid).count(),
            clusters,
        }
    }

    async fn apply<T>(
        &self,
        cluster_id: &str,
        kind: &'static str,
        delta: impl FnOnce(&mut DeviceCluster) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(cluster_id)
            .ok_or_else(|| CacheError::ClusterNotCached {
                cluster_id: cluster_id.to_string(),
            })?;

        let outcome = delta(&mut entry.cluster)?;
        entry.stored_at = Instant::now();
        entry.surgical_updates += 1;
        counter!("device_cache_surgical_updates_total", "kind" => kind).increment(1);
        debug!(cluster_id, kind, "Applied surgical cache update");
        Ok(outcome)
    }
}

fn position(cluster: &DeviceCluster, guid: &str) -> Result<usize, CacheError> {
    cluster
        .position_of(guid)
        .ok_or_else(|| CacheError::StaleMutationTarget {
            cluster_id: cluster.id.clone(),
            guid: guid.to_string(),
        })
}

fn device_type_of(cluster: &DeviceCluster) -> Result<DeviceType, CacheError> {
    cluster
        .device_type()
        .ok_or_else(|| CacheError::UnsupportedRecordType {
            cluster_id: cluster.id.clone(),
            record_type: cluster.record_type.clone(),
        })
}

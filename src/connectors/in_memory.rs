//! In-memory vendor cluster store
//!
//! A process-local [`DeviceCloud`] for local development and tests. It keeps
//! seeded clusters, counts calls per method and can be told to fail the next
//! call of a given kind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use super::trait_::{DeviceCloud, VendorError};
use crate::models::{DeviceCluster, GATEWAY_RECORD_TYPE, SENSOR_RECORD_TYPE};

#[derive(Debug, Default)]
struct Faults {
    discovery: Option<VendorError>,
    get: Option<VendorError>,
    put: Option<VendorError>,
}

#[derive(Debug, Default)]
pub struct InMemoryDeviceCloud {
    clusters: Mutex<BTreeMap<String, DeviceCluster>>,
    faults: Mutex<Faults>,
    latency: Option<Duration>,
    discovery_calls: AtomicUsize,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl InMemoryDeviceCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the given clusters.
    pub fn with_clusters(clusters: impl IntoIterator<Item = DeviceCluster>) -> Self {
        let store = clusters
            .into_iter()
            .map(|cluster| (cluster.id.clone(), cluster))
            .collect();
        Self {
            clusters: Mutex::new(store),
            ..Self::default()
        }
    }

    /// Delay every call, widening concurrency windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// One empty sensor cluster and one empty gateway cluster.
    pub fn local_fixture() -> Self {
        let cluster = |id: &str, record_type: &str, name: &str| DeviceCluster {
            id: id.to_string(),
            record_type: record_type.to_string(),
            name: name.to_string(),
            data: Default::default(),
            extra: json!({"tags": ["local"]})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };
        Self::with_clusters([
            cluster("local-sensors", SENSOR_RECORD_TYPE, "Local rodent sensors"),
            cluster("local-gateways", GATEWAY_RECORD_TYPE, "Local gateways"),
        ])
    }

    pub async fn insert_cluster(&self, cluster: DeviceCluster) {
        self.clusters.lock().await.insert(cluster.id.clone(), cluster);
    }

    /// Current stored state of a cluster.
    pub async fn cluster(&self, cluster_id: &str) -> Option<DeviceCluster> {
        self.clusters.lock().await.get(cluster_id).cloned()
    }

    pub async fn fail_next_discovery(&self, error: VendorError) {
        self.faults.lock().await.discovery = Some(error);
    }

    pub async fn fail_next_get(&self, error: VendorError) {
        self.faults.lock().await.get = Some(error);
    }

    pub async fn fail_next_put(&self, error: VendorError) {
        self.faults.lock().await.put = Some(error);
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DeviceCloud for InMemoryDeviceCloud {
    async fn discover_all_clusters(&self) -> Result<Vec<DeviceCluster>, VendorError> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.faults.lock().await.discovery.take() {
            return Err(error);
        }
        Ok(self.clusters.lock().await.values().cloned().collect())
    }

    async fn get_cluster(
        &self,
        cluster_id: &str,
        record_type: &str,
    ) -> Result<DeviceCluster, VendorError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.faults.lock().await.get.take() {
            return Err(error);
        }
        self.clusters
            .lock()
            .await
            .get(cluster_id)
            .filter(|cluster| cluster.record_type == record_type)
            .cloned()
            .ok_or_else(|| VendorError::ClusterNotFound {
                cluster_id: cluster_id.to_string(),
            })
    }

    async fn put_cluster(&self, cluster: &DeviceCluster) -> Result<(), VendorError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.faults.lock().await.put.take() {
            return Err(error);
        }

        let mut clusters = self.clusters.lock().await;
        match clusters.get_mut(&cluster.id) {
            Some(stored) if stored.record_type == cluster.record_type => {
                *stored = cluster.clone();
                debug!(cluster_id = %cluster.id, "Stored cluster in memory");
                Ok(())
            }
            _ => Err(VendorError::ClusterNotFound {
                cluster_id: cluster.id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let cloud = InMemoryDeviceCloud::local_fixture();
        cloud
            .fail_next_discovery(VendorError::Timeout { timeout_ms: 10 })
            .await;

        assert!(cloud.discover_all_clusters().await.is_err());
        assert_eq!(cloud.discover_all_clusters().await.unwrap().len(), 2);
        assert_eq!(cloud.discovery_calls(), 2);
    }

    #[tokio::test]
    async fn put_replaces_stored_cluster() {
        let cloud = InMemoryDeviceCloud::local_fixture();
        let mut cluster = cloud
            .get_cluster("local-sensors", SENSOR_RECORD_TYPE)
            .await
            .unwrap();
        cluster.name = "Renamed".to_string();

        cloud.put_cluster(&cluster).await.unwrap();
        assert_eq!(cloud.cluster("local-sensors").await.unwrap().name, "Renamed");
        assert_eq!(cloud.get_calls(), 1);
        assert_eq!(cloud.put_calls(), 1);
    }

    #[tokio::test]
    async fn record_type_must_match() {
        let cloud = InMemoryDeviceCloud::local_fixture();
        let err = cloud
            .get_cluster("local-sensors", GATEWAY_RECORD_TYPE)
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::ClusterNotFound { .. }));
    }
}

//! Cluster-topology cache
//!
//! Maps each device type to the vendor cluster hosting it. Population goes
//! through one expensive discovery call; concurrent callers that find the cache
//! cold or stale queue on a single refresh gate and share the outcome of the
//! discovery that ran while they waited, whether it succeeded or failed.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::CacheError;
use crate::models::{DeviceCluster, DeviceType};

/// Reference to a vendor cluster of a known device type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClusterRef {
    pub cluster_id: String,
    pub record_type: String,
    pub cluster_name: String,
    pub device_type: DeviceType,
    /// Devices in the cluster at discovery time
    pub device_count: usize,
}

impl ClusterRef {
    /// `None` for clusters whose record type is not a device type this service manages.
    pub fn from_cluster(cluster: &DeviceCluster) -> Option<Self> {
        Some(Self {
            cluster_id: cluster.id.clone(),
            record_type: cluster.record_type.clone(),
            cluster_name: cluster.name.clone(),
            device_type: cluster.device_type()?,
            device_count: cluster.devices().len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TopologyState {
    Cold,
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopologyStatus {
    pub state: TopologyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub ttl_seconds: u64,
    pub cluster_count: usize,
    pub clusters: Vec<ClusterRef>,
    /// Completed discovery attempts since start, successful or not
    pub discovery_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Topology {
    by_type: HashMap<DeviceType, ClusterRef>,
    clusters: Vec<ClusterRef>,
    populated_at: Option<Instant>,
    last_error: Option<String>,
}

impl Topology {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.populated_at
            .is_some_and(|populated_at| populated_at.elapsed() < ttl)
    }
}

pub struct TopologyCache {
    ttl: Duration,
    topology: RwLock<Topology>,
    refresh_gate: Mutex<()>,
    attempts: AtomicU64,
}

impl TopologyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            topology: RwLock::new(Topology::default()),
            refresh_gate: Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cluster hosting `device_type`, only while the topology is fresh.
    pub async fn get(&self, device_type: DeviceType) -> Option<ClusterRef> {
        let topology = self.topology.read().await;
        if !topology.is_fresh(self.ttl) {
            return None;
        }
        topology.by_type.get(&device_type).cloned()
    }

    /// Replace the topology with a freshly discovered cluster list.
    ///
    /// The first cluster seen for a device type becomes its hosting cluster.
    pub async fn populate(&self, clusters: Vec<ClusterRef>) {
        let mut by_type = HashMap::new();
        for cluster in &clusters {
            by_type
                .entry(cluster.device_type)
                .or_insert_with(|| cluster.clone());
        }

        let mut topology = self.topology.write().await;
        topology.by_type = by_type;
        topology.clusters = clusters;
        topology.populated_at = Some(Instant::now());
        topology.last_error = None;
    }

    pub async fn is_stale(&self) -> bool {
        !self.topology.read().await.is_fresh(self.ttl)
    }

    /// Clusters known from the last successful discovery, regardless of freshness.
    pub async fn known_clusters(&self) -> Vec<ClusterRef> {
        self.topology.read().await.clusters.clone()
    }

    /// Return the fresh cluster list, running `discover` at most once across
    /// all concurrent callers when the topology is cold or stale.
    pub async fn ensure_fresh<F, Fut, E>(&self, discover: F) -> Result<Vec<ClusterRef>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ClusterRef>, E>>,
        E: Display,
    {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(clusters) = self.fresh_clusters().await {
            return Ok(clusters);
        }

        let _gate = self.refresh_gate.lock().await;

        if let Some(clusters) = self.fresh_clusters().await {
            debug!("Topology refreshed by a concurrent caller");
            return Ok(clusters);
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            let cause = self
                .topology
                .read()
                .await
                .last_error
                .clone()
                .unwrap_or_else(|| "concurrent topology discovery failed".to_string());
            return Err(CacheError::TopologyUnavailable { cause });
        }

        info!("Discovering vendor cluster topology");
        let started = Instant::now();
        let outcome = discover().await;

        match outcome {
            Ok(clusters) => {
                self.populate(clusters.clone()).await;
                self.attempts.fetch_add(1, Ordering::AcqRel);
                counter!("topology_discovery_total", "outcome" => "success").increment(1);
                info!(
                    cluster_count = clusters.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cluster topology populated"
                );
                Ok(clusters)
            }
            Err(err) => {
                let cause = err.to_string();
                self.topology.write().await.last_error = Some(cause.clone());
                self.attempts.fetch_add(1, Ordering::AcqRel);
                counter!("topology_discovery_total", "outcome" => "failure").increment(1);
                warn!(error = %cause, "Cluster topology discovery failed");
                Err(CacheError::TopologyUnavailable { cause })
            }
        }
    }

    /// Hosting cluster for `device_type`, refreshing the topology if needed.
    pub async fn resolve<F, Fut, E>(
        &self,
        device_type: DeviceType,
        discover: F,
    ) -> Result<ClusterRef, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ClusterRef>, E>>,
        E: Display,
    {
        let clusters = self.ensure_fresh(discover).await?;
        clusters
            .into_iter()
            .find(|cluster| cluster.device_type == device_type)
            .ok_or_else(|| CacheError::NoClusterForType {
                record_type: device_type.record_type().to_string(),
            })
    }

    /// Drop the topology; the next access rediscovers.
    pub async fn invalidate(&self) {
        let mut topology = self.topology.write().await;
        topology.by_type.clear();
        topology.clusters.clear();
        topology.populated_at = None;
    }

    pub fn discovery_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> TopologyStatus {
        let topology = self.topology.read().await;
        let state = match topology.populated_at {
            None => TopologyState::Cold,
            Some(_) if topology.is_fresh(self.ttl) => TopologyState::Fresh,
            Some(_) => TopologyState::Stale,
        };

        TopologyStatus {
            state,
            age_seconds: topology
                .populated_at
                .map(|populated_at| populated_at.elapsed().as_secs()),
            ttl_seconds: self.ttl.as_secs(),
            cluster_count: topology.clusters.len(),
            clusters: topology.clusters.clone(),
            discovery_attempts: self.discovery_attempts(),
            last_error: topology.last_error.clone(),
        }
    }

    async fn fresh_clusters(&self) -> Option<Vec<ClusterRef>> {
        let topology = self.topology.read().await;
        topology
            .is_fresh(self.ttl)
            .then(|| topology.clusters.clone())
    }
}

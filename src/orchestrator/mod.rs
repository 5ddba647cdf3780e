//! # Device Orchestrator
//!
//! Runs every device operation through the same stages:
//! resolve the hosting cluster, load its data, mutate a working copy, write
//! the whole cluster back to the vendor and only then apply the delta to the
//! cache. Mutations of one cluster are serialized by the cluster lock, which
//! travels with the commit so that a dropped caller cannot release it before
//! the vendor write and cache update have finished.

pub mod erp;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::cache::{
    CacheError, ClusterLock, ClusterRef, DeviceDataCache, DeviceDataStatus, TopologyCache,
    TopologyState, TopologyStatus,
};
use crate::connectors::{DeviceCloud, VendorError};
use crate::error::{BridgeError, OperationContext};
use crate::mapping::erp::ambiguous_references;
use crate::models::{
    CanonicalDevice, CreateDeviceRequest, DeviceCluster, DevicePatch, DeviceType, RawDevice,
    is_valid_erp_reference,
};
use crate::normalization::{self, ClusterContext};
use crate::retry::{CallKind, RetryPolicy};

pub use erp::ErpMappingService;

/// Stage an operation is in, reported on log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStage {
    ResolveCluster,
    FetchClusterData,
    ApplyMutation,
    WriteBack,
    UpdateCache,
}

impl fmt::Display for OperationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStage::ResolveCluster => "resolve_cluster",
            OperationStage::FetchClusterData => "fetch_cluster_data",
            OperationStage::ApplyMutation => "apply_mutation",
            OperationStage::WriteBack => "write_back",
            OperationStage::UpdateCache => "update_cache",
        };
        f.write_str(name)
    }
}

/// Per-cluster summary returned alongside a device listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClusterInfo {
    pub cluster_id: String,
    pub cluster_name: String,
    pub record_type: String,
    pub device_type: DeviceType,
    pub device_count: usize,
    /// Served from the device-data cache without a vendor read
    pub from_cache: bool,
    /// Devices whose generated GUID could not be persisted yet
    #[serde(default)]
    pub guid_pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceListing {
    pub devices: Vec<CanonicalDevice>,
    pub clusters_info: Vec<ClusterInfo>,
    /// Some ERP reference is shared by more than one sensor of a customer
    pub ambiguous_mapping: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_references: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedDevice {
    pub device: CanonicalDevice,
    pub ambiguous_mapping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatedDevice {
    pub guid: String,
    pub updated_fields: Vec<String>,
    pub device: CanonicalDevice,
    pub ambiguous_mapping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeletedDevice {
    pub guid: String,
    pub success: bool,
    pub cluster_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheStatus {
    pub topology: TopologyStatus,
    pub device_data: DeviceDataStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheCleared {
    pub success: bool,
    /// Cluster snapshots dropped, valid or not
    pub cleared_clusters: usize,
    pub message: String,
}

/// Single-device change replayed onto the cached snapshot after a successful write.
#[derive(Debug, Clone)]
enum Delta {
    Insert(RawDevice),
    Update { guid: String, patch: DevicePatch },
    Remove { guid: String },
}

impl Delta {
    async fn apply(self, cache: &DeviceDataCache, cluster_id: &str) -> Result<(), CacheError> {
        match self {
            Delta::Insert(device) => cache.apply_insert(cluster_id, device).await,
            Delta::Update { guid, patch } => {
                cache.apply_update(cluster_id, &guid, &patch).await.map(|_| ())
            }
            Delta::Remove { guid } => cache.apply_remove(cluster_id, &guid).await.map(|_| ()),
        }
    }
}

/// Cluster data as seen by one operation.
struct LoadedCluster {
    cluster: DeviceCluster,
    from_cache: bool,
}

/// Outcome of a vendor read of a whole cluster.
enum Fetched {
    /// Every device carries a GUID the vendor has stored
    Durable(DeviceCluster),
    /// Generated GUIDs could not be written back; holds the cluster as read
    PersistFailed {
        cluster: DeviceCluster,
        error: BridgeError,
    },
}

pub struct DeviceOrchestrator {
    cloud: Arc<dyn DeviceCloud>,
    topology: Arc<TopologyCache>,
    devices: Arc<DeviceDataCache>,
    retry: RetryPolicy,
}

impl DeviceOrchestrator {
    pub fn new(
        cloud: Arc<dyn DeviceCloud>,
        topology: Arc<TopologyCache>,
        devices: Arc<DeviceDataCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cloud,
            topology,
            devices,
            retry,
        }
    }

    /// List every device of every known cluster.
    #[instrument(skip(self), fields(operation = "list_devices"))]
    pub async fn list_devices(&self) -> Result<DeviceListing, BridgeError> {
        let context = OperationContext::new("list_devices", "all clusters");
        let clusters = self.clusters(&context).await?;

        let mut devices = Vec::new();
        let mut clusters_info = Vec::with_capacity(clusters.len());

        for cluster_ref in &clusters {
            let loaded = self.read_cluster(cluster_ref, &context).await?;
            let mut pending = 0;
            for normalized in normalization::normalize_cluster(&loaded.cluster) {
                let mut device = normalized.device;
                if normalized.needs_persistence {
                    device.guid = String::new();
                    device.guid_pending = true;
                    pending += 1;
                }
                devices.push(device);
            }

            clusters_info.push(ClusterInfo {
                cluster_id: cluster_ref.cluster_id.clone(),
                cluster_name: loaded.cluster.name.clone(),
                record_type: cluster_ref.record_type.clone(),
                device_type: cluster_ref.device_type,
                device_count: loaded.cluster.devices().len(),
                from_cache: loaded.from_cache,
                guid_pending: pending,
            });
        }

        let ambiguous = ambiguous_references(&devices);
        if !ambiguous.is_empty() {
            warn!(
                references = ?ambiguous,
                "ERP references shared by more than one device"
            );
        }

        Ok(DeviceListing {
            devices,
            clusters_info,
            ambiguous_mapping: !ambiguous.is_empty(),
            ambiguous_references: ambiguous,
        })
    }

    /// Create a device in the cluster hosting its type.
    #[instrument(
        skip(self, request),
        fields(
            operation = "create_device",
            device_type = %request.device_type,
            erp_reference = %request.erp_reference
        )
    )]
    pub async fn create_device(
        &self,
        request: CreateDeviceRequest,
    ) -> Result<CreatedDevice, BridgeError> {
        let fields = request.location_fields();
        validate_reference(&fields.erp_reference)?;
        for (field, value) in [
            ("customer", &fields.customer),
            ("site", &fields.site),
            ("area", &fields.area),
        ] {
            if value.is_empty() {
                return Err(BridgeError::validation(field, "must not be empty"));
            }
        }
        let device_type: DeviceType = request
            .device_type
            .parse()
            .map_err(|err| BridgeError::validation("device_type", format!("{err}")))?;

        let context = OperationContext::new("create_device", fields.erp_reference.clone());
        debug!(stage = %OperationStage::ResolveCluster, "Resolving hosting cluster");
        let cluster_ref = self.hosting_cluster(device_type, &context).await?;

        let lock = self.devices.lock_cluster(&cluster_ref.cluster_id).await;
        debug!(
            stage = %OperationStage::FetchClusterData,
            cluster_id = %cluster_ref.cluster_id,
            "Loading cluster data"
        );
        let loaded = self.load_for_mutation(&cluster_ref, &context).await?;

        debug!(stage = %OperationStage::ApplyMutation, "Appending device");
        let raw = normalization::new_raw_device(
            normalization::generate_guid(),
            request.device_id.clone(),
            &fields,
            device_type,
            request.status.unwrap_or_default(),
        );
        let mut working = loaded.cluster;
        working.data.devices.push(raw.clone());
        let device = canonical(&working, &raw)?;
        let ambiguous_mapping = shares_reference(&working, &device);

        self.commit(lock, context, working, Delta::Insert(raw)).await?;

        info!(
            guid = %device.guid,
            cluster_id = %device.cluster_id,
            ambiguous_mapping,
            "Device created"
        );
        Ok(CreatedDevice {
            device,
            ambiguous_mapping,
        })
    }

    /// Apply a partial update to the device with `guid`.
    #[instrument(skip(self, patch), fields(operation = "update_device", guid = %guid))]
    pub async fn update_device(
        &self,
        guid: &str,
        patch: DevicePatch,
    ) -> Result<UpdatedDevice, BridgeError> {
        if patch.is_empty() {
            return Err(BridgeError::validation(
                "patch",
                "at least one field must be provided",
            ));
        }
        if let Some(reference) = &patch.erp_reference {
            validate_reference(reference.trim())?;
        }

        let context = OperationContext::new("update_device", guid);
        let (lock, cluster_ref, mut working) = self.locate(guid, &context).await?;

        debug!(stage = %OperationStage::ApplyMutation, "Patching device");
        let index = working
            .position_of(guid)
            .ok_or_else(|| BridgeError::NotFound {
                guid: guid.to_string(),
            })?;
        let device = &mut working.data.devices[index];
        normalization::apply_patch(device, &patch, cluster_ref.device_type);
        let updated = device.clone();
        let device = canonical(&working, &updated)?;
        let ambiguous_mapping = shares_reference(&working, &device);
        let updated_fields = patch
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        self.commit(
            lock,
            context,
            working,
            Delta::Update {
                guid: guid.to_string(),
                patch,
            },
        )
        .await?;

        info!(cluster_id = %cluster_ref.cluster_id, "Device updated");
        Ok(UpdatedDevice {
            guid: guid.to_string(),
            updated_fields,
            device,
            ambiguous_mapping,
        })
    }

    /// Remove the device with `guid` from its cluster.
    #[instrument(skip(self), fields(operation = "delete_device", guid = %guid))]
    pub async fn delete_device(&self, guid: &str) -> Result<DeletedDevice, BridgeError> {
        let context = OperationContext::new("delete_device", guid);
        let (lock, cluster_ref, mut working) = self.locate(guid, &context).await?;

        debug!(stage = %OperationStage::ApplyMutation, "Removing device");
        let index = working
            .position_of(guid)
            .ok_or_else(|| BridgeError::NotFound {
                guid: guid.to_string(),
            })?;
        working.data.devices.remove(index);

        self.commit(
            lock,
            context,
            working,
            Delta::Remove {
                guid: guid.to_string(),
            },
        )
        .await?;

        info!(cluster_id = %cluster_ref.cluster_id, "Device deleted");
        Ok(DeletedDevice {
            guid: guid.to_string(),
            success: true,
            cluster_id: cluster_ref.cluster_id,
        })
    }

    pub async fn cache_status(&self) -> CacheStatus {
        CacheStatus {
            topology: self.topology.status().await,
            device_data: self.devices.status().await,
        }
    }

    /// Drop topology and every cluster snapshot; the next access rediscovers.
    pub async fn cache_clear(&self) -> CacheCleared {
        let cleared_clusters = self.devices.status().await.cached_clusters;
        self.topology.invalidate().await;
        self.devices.clear().await;
        warn!(cleared_clusters, "Caches cleared, next request runs full discovery");

        CacheCleared {
            success: true,
            cleared_clusters,
            message: "Topology and device caches cleared".to_string(),
        }
    }

    /// Run discovery now if the topology is cold or stale.
    pub async fn refresh_topology(&self) -> Result<Vec<ClusterRef>, BridgeError> {
        let context = OperationContext::new("discover_clusters", "all clusters");
        self.clusters(&context).await
    }

    pub async fn topology_state(&self) -> TopologyState {
        self.topology.status().await.state
    }

    async fn discover(&self) -> Result<Vec<ClusterRef>, VendorError> {
        let clusters = self
            .retry
            .run("discover_all_clusters", CallKind::Read, || {
                self.cloud.discover_all_clusters()
            })
            .await?;
        Ok(clusters.iter().filter_map(ClusterRef::from_cluster).collect())
    }

    async fn clusters(&self, context: &OperationContext) -> Result<Vec<ClusterRef>, BridgeError> {
        self.topology
            .ensure_fresh(|| self.discover())
            .await
            .map_err(|err| cache_failure(context, err))
    }

    async fn hosting_cluster(
        &self,
        device_type: DeviceType,
        context: &OperationContext,
    ) -> Result<ClusterRef, BridgeError> {
        self.topology
            .resolve(device_type, || self.discover())
            .await
            .map_err(|err| cache_failure(context, err))
    }

    /// Cluster data for a read; the lock is only taken when the vendor must be read.
    async fn read_cluster(
        &self,
        cluster_ref: &ClusterRef,
        context: &OperationContext,
    ) -> Result<LoadedCluster, BridgeError> {
        if let Some(cluster) = self.devices.get_cluster_snapshot(&cluster_ref.cluster_id).await {
            return Ok(LoadedCluster {
                cluster,
                from_cache: true,
            });
        }

        let _lock = self.devices.lock_cluster(&cluster_ref.cluster_id).await;
        if let Some(cluster) = self.devices.get_cluster_snapshot(&cluster_ref.cluster_id).await {
            return Ok(LoadedCluster {
                cluster,
                from_cache: true,
            });
        }

        let cluster = match self.fetch_cluster(cluster_ref, context).await? {
            Fetched::Durable(cluster) => cluster,
            Fetched::PersistFailed { cluster, error } => {
                warn!(
                    cluster_id = %cluster_ref.cluster_id,
                    error = %error,
                    "Withholding generated GUIDs until they are persisted"
                );
                cluster
            }
        };
        Ok(LoadedCluster {
            cluster,
            from_cache: false,
        })
    }

    /// Cluster data for a mutation. Caller holds the cluster lock.
    async fn load_for_mutation(
        &self,
        cluster_ref: &ClusterRef,
        context: &OperationContext,
    ) -> Result<LoadedCluster, BridgeError> {
        if let Some(cluster) = self.devices.get_cluster_snapshot(&cluster_ref.cluster_id).await {
            return Ok(LoadedCluster {
                cluster,
                from_cache: true,
            });
        }
        self.fetch_for_mutation(cluster_ref, context).await
    }

    async fn fetch_for_mutation(
        &self,
        cluster_ref: &ClusterRef,
        context: &OperationContext,
    ) -> Result<LoadedCluster, BridgeError> {
        match self.fetch_cluster(cluster_ref, context).await? {
            Fetched::Durable(cluster) => Ok(LoadedCluster {
                cluster,
                from_cache: false,
            }),
            Fetched::PersistFailed { error, .. } => Err(error),
        }
    }

    /// Read a whole cluster from the vendor, persist any generated GUIDs and cache it.
    /// Caller holds the cluster lock.
    async fn fetch_cluster(
        &self,
        cluster_ref: &ClusterRef,
        context: &OperationContext,
    ) -> Result<Fetched, BridgeError> {
        let mut cluster = self
            .retry
            .run("get_cluster", CallKind::Read, || {
                self.cloud
                    .get_cluster(&cluster_ref.cluster_id, &cluster_ref.record_type)
            })
            .await
            .map_err(|err| BridgeError::from_vendor_read(context.clone(), err))?;

        let as_read = cluster.clone();
        let assigned = normalization::assign_missing_guids(&mut cluster);
        if !assigned.is_empty() {
            info!(
                cluster_id = %cluster.id,
                assigned = assigned.len(),
                stage = %OperationStage::WriteBack,
                "Persisting generated device GUIDs"
            );
            let persisted = self
                .retry
                .run("put_cluster", CallKind::Write, || {
                    self.cloud.put_cluster(&cluster)
                })
                .await;
            if let Err(err) = persisted {
                return Ok(Fetched::PersistFailed {
                    cluster: as_read,
                    error: BridgeError::from_vendor_write(context.clone(), err),
                });
            }
        }

        self.devices.put_cluster_snapshot(cluster.clone()).await;
        Ok(Fetched::Durable(cluster))
    }

    /// Find the cluster holding `guid` and return it locked.
    ///
    /// A GUID missing from a cached snapshot forces exactly one vendor re-read
    /// of that cluster before it is ruled out.
    async fn locate(
        &self,
        guid: &str,
        context: &OperationContext,
    ) -> Result<(ClusterLock, ClusterRef, DeviceCluster), BridgeError> {
        debug!(stage = %OperationStage::ResolveCluster, "Searching clusters for device");
        let clusters = self.clusters(context).await?;

        for cluster_ref in clusters {
            let lock = self.devices.lock_cluster(&cluster_ref.cluster_id).await;
            debug!(
                stage = %OperationStage::FetchClusterData,
                cluster_id = %cluster_ref.cluster_id,
                "Loading cluster data"
            );
            let loaded = self.load_for_mutation(&cluster_ref, context).await?;
            if loaded.cluster.contains_guid(guid) {
                return Ok((lock, cluster_ref, loaded.cluster));
            }

            if loaded.from_cache {
                debug!(
                    cluster_id = %cluster_ref.cluster_id,
                    "Device absent from cached snapshot, re-reading cluster"
                );
                let refreshed = self.fetch_for_mutation(&cluster_ref, context).await?;
                if refreshed.cluster.contains_guid(guid) {
                    return Ok((lock, cluster_ref, refreshed.cluster));
                }
            }
        }

        Err(BridgeError::NotFound {
            guid: guid.to_string(),
        })
    }

    /// Write the mutated cluster and replay the delta onto the cache.
    ///
    /// Runs on its own task holding the cluster lock, so it completes even if
    /// the caller goes away. The cache is untouched when the write fails.
    async fn commit(
        &self,
        lock: ClusterLock,
        context: OperationContext,
        working: DeviceCluster,
        delta: Delta,
    ) -> Result<(), BridgeError> {
        let cloud = Arc::clone(&self.cloud);
        let devices = Arc::clone(&self.devices);
        let retry = self.retry.clone();
        let task_context = context.clone();

        let task = tokio::spawn(async move {
            let _lock = lock;
            debug!(
                stage = %OperationStage::WriteBack,
                cluster_id = %working.id,
                device_count = working.devices().len(),
                "Writing cluster to vendor"
            );
            retry
                .run("put_cluster", CallKind::Write, || cloud.put_cluster(&working))
                .await
                .map_err(|err| {
                    warn!(cluster_id = %working.id, error = %err, "Cluster write failed");
                    BridgeError::from_vendor_write(task_context.clone(), err)
                })?;

            debug!(stage = %OperationStage::UpdateCache, cluster_id = %working.id, "Updating cache");
            if let Err(err) = delta.apply(&devices, &working.id).await {
                debug!(
                    cluster_id = %working.id,
                    reason = %err,
                    "Snapshot unavailable for surgical update, caching written cluster"
                );
                devices.put_cluster_snapshot(working).await;
            }
            Ok::<(), BridgeError>(())
        });

        task.await.map_err(|err| BridgeError::Internal {
            context,
            details: format!("commit task failed: {err}"),
        })?
    }
}

fn validate_reference(reference: &str) -> Result<(), BridgeError> {
    if is_valid_erp_reference(reference) {
        Ok(())
    } else {
        Err(BridgeError::validation(
            "erp_reference",
            "must be 3-50 characters of letters, digits or underscores",
        ))
    }
}

fn cache_failure(context: &OperationContext, err: CacheError) -> BridgeError {
    match err {
        CacheError::TopologyUnavailable { cause } => BridgeError::ServiceUnavailable {
            context: context.clone(),
            cause,
        },
        CacheError::NoClusterForType { record_type } => BridgeError::ServiceUnavailable {
            context: context.clone(),
            cause: format!("no vendor cluster hosts record type {record_type}"),
        },
        other => BridgeError::Internal {
            context: context.clone(),
            details: other.to_string(),
        },
    }
}

fn canonical(cluster: &DeviceCluster, raw: &RawDevice) -> Result<CanonicalDevice, BridgeError> {
    let context = ClusterContext::of(cluster).ok_or_else(|| BridgeError::Internal {
        context: OperationContext::new("normalize_device", cluster.id.clone()),
        details: format!("unsupported record type {}", cluster.record_type),
    })?;
    Ok(normalization::normalize(raw, context).device)
}

/// Whether another sensor of the same customer carries the device's ERP reference.
fn shares_reference(cluster: &DeviceCluster, device: &CanonicalDevice) -> bool {
    if device.device_type != DeviceType::RodentSensor || device.fields.erp_reference.is_empty() {
        return false;
    }
    normalization::normalize_cluster(cluster)
        .iter()
        .filter(|other| {
            other.device.fields.customer == device.fields.customer
                && other.device.fields.erp_reference == device.fields.erp_reference
        })
        .count()
        > 1
}

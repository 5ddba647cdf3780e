//! Device normalization
//!
//! Turns raw vendor device entries into [`CanonicalDevice`] views and assigns
//! GUIDs to entries that lack one. A freshly assigned GUID is only a proposal
//! until the owning cluster has been written back to the vendor; callers use
//! [`NormalizedDevice::needs_persistence`] to drive that write.

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::mapping;
use crate::models::{
    CanonicalDevice, DeviceCluster, DevicePatch, DeviceStatus, DeviceType,
    GUID_PREFIX, LocationFields, RawDevice, SENTINEL_DEVICE_ID,
};

/// Cluster a raw device was read from.
#[derive(Debug, Clone, Copy)]
pub struct ClusterContext<'a> {
    pub cluster_id: &'a str,
    pub cluster_name: &'a str,
    pub device_type: DeviceType,
}

impl<'a> ClusterContext<'a> {
    /// Context for a cluster whose record type maps to a known device type.
    pub fn of(cluster: &'a DeviceCluster) -> Option<Self> {
        Some(Self {
            cluster_id: &cluster.id,
            cluster_name: &cluster.name,
            device_type: cluster.device_type()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDevice {
    pub device: CanonicalDevice,
    /// The GUID was generated here and is not yet stored by the vendor
    pub needs_persistence: bool,
}

/// Generate a fresh namespaced GUID.
pub fn generate_guid() -> String {
    format!("{GUID_PREFIX}{}", Uuid::new_v4())
}

/// Normalize a single raw device.
pub fn normalize(raw: &RawDevice, context: ClusterContext<'_>) -> NormalizedDevice {
    let (guid, needs_persistence) = match raw.guid() {
        Some(guid) => (guid.to_string(), false),
        None => (generate_guid(), true),
    };

    let status = match raw.status.as_deref() {
        None | Some("") => DeviceStatus::Pending,
        Some(value) => DeviceStatus::parse(value).unwrap_or_else(|| {
            warn!(
                cluster_id = context.cluster_id,
                guid = %guid,
                status = value,
                "Unrecognised device status, treating as pending"
            );
            DeviceStatus::Pending
        }),
    };

    let raw_len = raw.location().len();
    let fields = location_fields(raw, context.device_type);
    let location = mapping::to_location_array(&fields, context.device_type);

    NormalizedDevice {
        device: CanonicalDevice {
            id: raw
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| SENTINEL_DEVICE_ID.to_string()),
            guid,
            device_type: context.device_type,
            status,
            location,
            fields,
            cluster_id: context.cluster_id.to_string(),
            cluster_name: context.cluster_name.to_string(),
            erp_ready: raw_len >= context.device_type.location_len(),
            guid_pending: false,
        },
        needs_persistence,
    }
}

/// Normalize every device of a cluster. Clusters of unknown record type yield nothing.
pub fn normalize_cluster(cluster: &DeviceCluster) -> Vec<NormalizedDevice> {
    let Some(context) = ClusterContext::of(cluster) else {
        return Vec::new();
    };
    cluster
        .devices()
        .iter()
        .map(|raw| normalize(raw, context))
        .collect()
}

/// Write generated GUIDs into every device entry lacking one.
///
/// Returns the GUIDs that were assigned; an empty result means the cluster
/// needs no write-back.
pub fn assign_missing_guids(cluster: &mut DeviceCluster) -> Vec<String> {
    cluster
        .data
        .devices
        .iter_mut()
        .filter(|device| device.guid().is_none())
        .map(|device| {
            let guid = generate_guid();
            device.guid = Some(guid.clone());
            guid
        })
        .collect()
}

/// Named location fields of a raw device.
///
/// Sensor arrays shorter than six elements fall back to `meta.placement` and
/// `meta.configuration` before the documented defaults.
pub fn location_fields(raw: &RawDevice, device_type: DeviceType) -> LocationFields {
    let location = raw.location();
    let mut fields = mapping::from_location_array(&location, device_type);

    if device_type == DeviceType::RodentSensor {
        if location.len() <= 4
            && let Some(placement) = raw.meta_str("placement")
        {
            fields.placement = placement.to_string();
        }
        if location.len() <= 5
            && let Some(configuration) = raw.meta_str("configuration")
        {
            fields.configuration = configuration.to_string();
        }
    }

    fields
}

/// Build the vendor entry for a new device.
pub fn new_raw_device(
    guid: String,
    device_id: Option<String>,
    fields: &LocationFields,
    device_type: DeviceType,
    status: DeviceStatus,
) -> RawDevice {
    let mut raw = RawDevice {
        id: Some(
            device_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| SENTINEL_DEVICE_ID.to_string()),
        ),
        guid: Some(guid),
        status: Some(status.as_str().to_string()),
        ..RawDevice::default()
    };
    raw.set_location(mapping::to_location_array(fields, device_type));
    raw.extra.insert(
        "createdDate".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    raw
}

/// Apply a patch to a raw vendor entry in place.
///
/// Location changes rewrite the whole array at the device type's canonical
/// length; other vendor fields are left untouched.
pub fn apply_patch(raw: &mut RawDevice, patch: &DevicePatch, device_type: DeviceType) {
    if patch.touches_location() {
        let mut fields = location_fields(raw, device_type);
        patch.merge_into(&mut fields);
        mapping::apply_defaults(&mut fields, device_type);
        raw.set_location(mapping::to_location_array(&fields, device_type));
    }
    if let Some(status) = patch.status {
        raw.status = Some(status.as_str().to_string());
    }
    if let Some(device_id) = &patch.device_id {
        let device_id = device_id.trim();
        raw.id = Some(if device_id.is_empty() {
            SENTINEL_DEVICE_ID.to_string()
        } else {
            device_id.to_string()
        });
    }
}

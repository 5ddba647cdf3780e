//! Device and cluster models
//!
//! Two families of types live here: the vendor wire documents (`DeviceCluster`,
//! `RawDevice`) which must survive a read → mutate → write cycle without losing
//! unknown fields, and the canonical views handed to callers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Vendor placeholder meaning "hardware not yet assigned".
pub const SENTINEL_DEVICE_ID: &str = "00-00-00-00-00-00-00-00";

/// Namespace tag prepended to every GUID this service assigns.
pub const GUID_PREFIX: &str = "erp-device-";

/// Vendor record type for rodent sensor clusters.
pub const SENSOR_RECORD_TYPE: &str = "io.microshare.trap.packed";

/// Vendor record type for gateway clusters.
pub const GATEWAY_RECORD_TYPE: &str = "io.microshare.gateway.health.packed";

/// Kind of device, supplied explicitly by callers and never inferred from record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    RodentSensor,
    Gateway,
}

impl DeviceType {
    pub const ALL: [DeviceType; 2] = [DeviceType::RodentSensor, DeviceType::Gateway];

    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceType::RodentSensor => "rodent_sensor",
            DeviceType::Gateway => "gateway",
        }
    }

    /// Vendor record type of the clusters holding this kind of device.
    pub const fn record_type(self) -> &'static str {
        match self {
            DeviceType::RodentSensor => SENSOR_RECORD_TYPE,
            DeviceType::Gateway => GATEWAY_RECORD_TYPE,
        }
    }

    pub fn from_record_type(record_type: &str) -> Option<Self> {
        match record_type {
            SENSOR_RECORD_TYPE => Some(DeviceType::RodentSensor),
            GATEWAY_RECORD_TYPE => Some(DeviceType::Gateway),
            _ => None,
        }
    }

    /// Fixed length of the location array for this device type.
    pub const fn location_len(self) -> usize {
        match self {
            DeviceType::RodentSensor => 6,
            DeviceType::Gateway => 4,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type '{0}', expected rodent_sensor or gateway")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "rodent_sensor" => Ok(DeviceType::RodentSensor),
            "gateway" => Ok(DeviceType::Gateway),
            other => Err(UnknownDeviceType(other.to_string())),
        }
    }
}

/// Lifecycle status of a device entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Pending,
    Active,
    Inactive,
}

impl DeviceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Pending => "pending",
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
        }
    }

    /// Case-insensitive parse of a vendor status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(DeviceStatus::Pending),
            "active" => Some(DeviceStatus::Active),
            "inactive" => Some(DeviceStatus::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named view of a location array.
///
/// For gateways `erp_reference` carries the gateway location (4th element) and
/// `placement`/`configuration` stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LocationFields {
    pub customer: String,
    pub site: String,
    pub area: String,
    pub erp_reference: String,
    pub placement: String,
    pub configuration: String,
}

/// Device entry exactly as the vendor stores it inside a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Every other vendor key, `meta` included, kept exactly as read
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawDevice {
    /// GUID if present and non-empty.
    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref().filter(|guid| !guid.is_empty())
    }

    pub fn has_guid(&self, guid: &str) -> bool {
        self.guid() == Some(guid)
    }

    fn meta(&self) -> Option<&Map<String, Value>> {
        self.extra.get("meta").and_then(Value::as_object)
    }

    /// `meta.location` read leniently: a non-array reads as empty, `null`
    /// elements as empty strings and other scalars as their JSON text.
    pub fn location(&self) -> Vec<String> {
        match self.meta().and_then(|meta| meta.get("location")) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Trimmed string value of a `meta` key; blank counts as absent.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta()?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Replace `meta.location`, keeping the other `meta` keys.
    ///
    /// A `meta` that is not an object cannot carry a location and is replaced.
    pub fn set_location(&mut self, location: Vec<String>) {
        let location = Value::Array(location.into_iter().map(Value::String).collect());
        match self.extra.get_mut("meta") {
            Some(Value::Object(meta)) => {
                meta.insert("location".to_string(), location);
            }
            _ => {
                let mut meta = Map::new();
                meta.insert("location".to_string(), location);
                self.extra.insert("meta".to_string(), Value::Object(meta));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterData {
    #[serde(default)]
    pub devices: Vec<RawDevice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Vendor cluster document; the unit of read/write atomicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCluster {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "recType")]
    pub record_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: ClusterData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceCluster {
    pub fn devices(&self) -> &[RawDevice] {
        &self.data.devices
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        DeviceType::from_record_type(&self.record_type)
    }

    pub fn position_of(&self, guid: &str) -> Option<usize> {
        self.data.devices.iter().position(|device| device.has_guid(guid))
    }

    pub fn contains_guid(&self, guid: &str) -> bool {
        self.position_of(guid).is_some()
    }
}

/// Canonical device view returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CanonicalDevice {
    /// Vendor device identifier (DevEUI), sentinel when unassigned
    pub id: String,
    /// Stable identity assigned by this service; empty while persistence is pending
    pub guid: String,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    /// Full-length location array for the device type
    pub location: Vec<String>,
    #[serde(flatten)]
    pub fields: LocationFields,
    pub cluster_id: String,
    pub cluster_name: String,
    /// Whether the vendor record already carries a full-length location array
    pub erp_ready: bool,
    /// Set when a GUID could not be made durable and is withheld
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub guid_pending: bool,
}

/// Input of `create_device`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDeviceRequest {
    pub customer: String,
    pub site: String,
    pub area: String,
    /// 3-50 characters of `[A-Za-z0-9_]`
    pub erp_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    /// `rodent_sensor` or `gateway`
    pub device_type: String,
    /// Vendor device identifier; the sentinel is used when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
}

impl CreateDeviceRequest {
    pub fn location_fields(&self) -> LocationFields {
        LocationFields {
            customer: self.customer.trim().to_string(),
            site: self.site.trim().to_string(),
            area: self.area.trim().to_string(),
            erp_reference: self.erp_reference.trim().to_string(),
            placement: self.placement.clone().unwrap_or_default(),
            configuration: self.configuration.clone().unwrap_or_default(),
        }
    }
}

/// Partial update of a device addressed by GUID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DevicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl DevicePatch {
    /// Names of the fields this patch sets, in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.customer.is_some() {
            names.push("customer");
        }
        if self.site.is_some() {
            names.push("site");
        }
        if self.area.is_some() {
            names.push("area");
        }
        if self.erp_reference.is_some() {
            names.push("erp_reference");
        }
        if self.placement.is_some() {
            names.push("placement");
        }
        if self.configuration.is_some() {
            names.push("configuration");
        }
        if self.status.is_some() {
            names.push("status");
        }
        if self.device_id.is_some() {
            names.push("device_id");
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    pub fn touches_location(&self) -> bool {
        self.customer.is_some()
            || self.site.is_some()
            || self.area.is_some()
            || self.erp_reference.is_some()
            || self.placement.is_some()
            || self.configuration.is_some()
    }

    /// Overlay the patch onto an existing set of location fields.
    pub fn merge_into(&self, fields: &mut LocationFields) {
        if let Some(customer) = &self.customer {
            fields.customer = customer.trim().to_string();
        }
        if let Some(site) = &self.site {
            fields.site = site.trim().to_string();
        }
        if let Some(area) = &self.area {
            fields.area = area.trim().to_string();
        }
        if let Some(reference) = &self.erp_reference {
            fields.erp_reference = reference.trim().to_string();
        }
        if let Some(placement) = &self.placement {
            fields.placement = placement.clone();
        }
        if let Some(configuration) = &self.configuration {
            fields.configuration = configuration.clone();
        }
    }
}

fn erp_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]{3,50}$").unwrap_or_else(|err| unreachable!("static pattern: {err}"))
    })
}

/// ERP references are 3-50 characters of ASCII letters, digits and underscores.
pub fn is_valid_erp_reference(reference: &str) -> bool {
    erp_reference_pattern().is_match(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_type_round_trips_through_record_type() {
        for device_type in DeviceType::ALL {
            assert_eq!(
                DeviceType::from_record_type(device_type.record_type()),
                Some(device_type)
            );
        }
        assert_eq!(DeviceType::from_record_type("io.microshare.other"), None);
    }

    #[test]
    fn device_type_parse_rejects_unknown_values() {
        assert_eq!("gateway".parse::<DeviceType>(), Ok(DeviceType::Gateway));
        assert_eq!(
            " rodent_sensor ".parse::<DeviceType>(),
            Ok(DeviceType::RodentSensor)
        );
        assert!("trap".parse::<DeviceType>().is_err());
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(DeviceStatus::parse("Active"), Some(DeviceStatus::Active));
        assert_eq!(DeviceStatus::parse("PENDING"), Some(DeviceStatus::Pending));
        assert_eq!(DeviceStatus::parse("Provisioning"), None);
    }

    #[test]
    fn erp_reference_validation() {
        assert!(is_valid_erp_reference("ERP024_025_01"));
        assert!(is_valid_erp_reference("abc"));
        assert!(!is_valid_erp_reference("ab"));
        assert!(!is_valid_erp_reference("ERP-024"));
        assert!(!is_valid_erp_reference(&"A".repeat(51)));
        assert!(!is_valid_erp_reference("ERP 024"));
    }

    #[test]
    fn cluster_preserves_unknown_fields() {
        let document = json!({
            "_id": "cluster-1",
            "recType": SENSOR_RECORD_TYPE,
            "name": "Traps",
            "owner": {"org": "acme"},
            "data": {
                "devices": [{
                    "id": "58-A0-CB-00-00-10-20-30",
                    "guid": "erp-device-1",
                    "status": "active",
                    "meta": {"location": ["A", "B", "C", "REF_1", "Internal", "Glue"], "iot": {"type": "trap"}},
                    "lastSeen": "2025-01-01T00:00:00Z"
                }],
                "version": 7
            }
        });

        let cluster: DeviceCluster = serde_json::from_value(document.clone()).unwrap();
        assert_eq!(cluster.devices().len(), 1);
        assert_eq!(cluster.device_type(), Some(DeviceType::RodentSensor));
        assert_eq!(serde_json::to_value(&cluster).unwrap(), document);
    }

    #[test]
    fn malformed_location_is_tolerated() {
        let device: RawDevice = serde_json::from_value(json!({
            "id": "x",
            "meta": {"location": ["A", null, 42]}
        }))
        .unwrap();
        assert_eq!(device.location(), vec!["A", "", "42"]);

        let device: RawDevice =
            serde_json::from_value(json!({"meta": {"location": "not-an-array"}})).unwrap();
        assert!(device.location().is_empty());

        let device: RawDevice = serde_json::from_value(json!({})).unwrap();
        assert!(device.location().is_empty());
        assert!(device.guid().is_none());
    }

    #[test]
    fn odd_vendor_meta_serializes_back_unchanged() {
        for document in [
            json!({"id": "d-nometa", "guid": "g-1"}),
            json!({"id": "d-text", "meta": {"location": "Bakery/Dock", "label": "x"}}),
            json!({"id": "d-mixed", "meta": {"location": ["A", null, 7, "R9"]}}),
            json!({"id": "d-null", "meta": null}),
        ] {
            let device: RawDevice = serde_json::from_value(document.clone()).unwrap();
            assert_eq!(serde_json::to_value(&device).unwrap(), document);
        }
    }

    #[test]
    fn set_location_keeps_other_meta_keys() {
        let mut device: RawDevice = serde_json::from_value(json!({
            "meta": {"location": "legacy", "iot": {"fw": "1.2"}}
        }))
        .unwrap();
        device.set_location(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            serde_json::to_value(&device).unwrap(),
            json!({"meta": {"location": ["A", "B"], "iot": {"fw": "1.2"}}})
        );

        let mut bare = RawDevice::default();
        bare.set_location(vec!["C".to_string()]);
        assert_eq!(bare.location(), vec!["C"]);
        assert_eq!(bare.meta_str("missing"), None);
    }

    #[test]
    fn patch_field_names_follow_declaration_order() {
        let patch = DevicePatch {
            status: Some(DeviceStatus::Active),
            area: Some("Dock".to_string()),
            ..Default::default()
        };
        assert_eq!(patch.field_names(), vec!["area", "status"]);
        assert!(patch.touches_location());
        assert!(DevicePatch::default().is_empty());
    }
}

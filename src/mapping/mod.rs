//! Location mapping between ERP fields and vendor location arrays
//!
//! Sensors carry `[customer, site, area, erp_reference, placement, configuration]`,
//! gateways carry `[customer, site, area, gateway_location]`. Both directions are
//! total: short or oversized arrays never fail, missing positions resolve to an
//! empty string or the documented default.

pub mod erp;

use crate::models::{DeviceType, LocationFields};

/// Placement used when a sensor has none.
pub const DEFAULT_PLACEMENT: &str = "Internal";
/// Configuration used when a sensor has none.
pub const DEFAULT_CONFIGURATION: &str = "Bait/Lured";

const CUSTOMER: usize = 0;
const SITE: usize = 1;
const AREA: usize = 2;
const REFERENCE: usize = 3;
const PLACEMENT: usize = 4;
const CONFIGURATION: usize = 5;

/// Build the ordered location array for a device type.
///
/// Empty placement or configuration on a sensor is replaced by its default.
pub fn to_location_array(fields: &LocationFields, device_type: DeviceType) -> Vec<String> {
    let mut location = vec![
        fields.customer.clone(),
        fields.site.clone(),
        fields.area.clone(),
        fields.erp_reference.clone(),
    ];

    if device_type == DeviceType::RodentSensor {
        location.push(or_default(&fields.placement, DEFAULT_PLACEMENT));
        location.push(or_default(&fields.configuration, DEFAULT_CONFIGURATION));
    }

    location
}

/// Read named fields out of a location array of any length.
pub fn from_location_array(location: &[String], device_type: DeviceType) -> LocationFields {
    let at = |index: usize| location.get(index).cloned().unwrap_or_default();

    let mut fields = LocationFields {
        customer: at(CUSTOMER),
        site: at(SITE),
        area: at(AREA),
        erp_reference: at(REFERENCE),
        ..LocationFields::default()
    };

    if device_type == DeviceType::RodentSensor {
        fields.placement = or_default(&at(PLACEMENT), DEFAULT_PLACEMENT);
        fields.configuration = or_default(&at(CONFIGURATION), DEFAULT_CONFIGURATION);
    }

    fields
}

/// Fill sensor defaults in place; gateways never carry placement or configuration.
pub fn apply_defaults(fields: &mut LocationFields, device_type: DeviceType) {
    match device_type {
        DeviceType::RodentSensor => {
            fields.placement = or_default(&fields.placement, DEFAULT_PLACEMENT);
            fields.configuration = or_default(&fields.configuration, DEFAULT_CONFIGURATION);
        }
        DeviceType::Gateway => {
            fields.placement.clear();
            fields.configuration.clear();
        }
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_fields() -> LocationFields {
        LocationFields {
            customer: "Golden Crust Manchester".to_string(),
            site: "Manchester Production".to_string(),
            area: "Flour Storage Silo A".to_string(),
            erp_reference: "ERP024_025_01".to_string(),
            placement: "External".to_string(),
            configuration: "Glue Board".to_string(),
        }
    }

    #[test]
    fn sensor_round_trip() {
        let fields = sensor_fields();
        let location = to_location_array(&fields, DeviceType::RodentSensor);
        assert_eq!(location.len(), 6);
        assert_eq!(
            from_location_array(&location, DeviceType::RodentSensor),
            fields
        );
    }

    #[test]
    fn gateway_round_trip() {
        let fields = LocationFields {
            customer: "Acme".to_string(),
            site: "Leeds".to_string(),
            area: "Loading Bay".to_string(),
            erp_reference: "GW_LEEDS_01".to_string(),
            ..LocationFields::default()
        };
        let location = to_location_array(&fields, DeviceType::Gateway);
        assert_eq!(location, vec!["Acme", "Leeds", "Loading Bay", "GW_LEEDS_01"]);
        assert_eq!(from_location_array(&location, DeviceType::Gateway), fields);
    }

    fn fields(values: [&str; 6]) -> LocationFields {
        let [customer, site, area, erp_reference, placement, configuration] = values.map(String::from);
        LocationFields {
            customer,
            site,
            area,
            erp_reference,
            placement,
            configuration,
        }
    }

    #[test]
    fn complete_field_sets_survive_the_array_unchanged() {
        let long_reference = "R".repeat(50);
        let cases = [
            (DeviceType::RodentSensor, fields(["Golden Crust Manchester", "Manchester Production", "Flour Storage Silo A", "ERP024_025_01", "Internal", "Bait/Lured"])),
            (DeviceType::RodentSensor, fields(["Boulangerie Élodie", "Lyon Nord", "Réserve à farine", "ERP_É_01", "External", "Glue Board"])),
            (DeviceType::RodentSensor, fields(["Acme  Foods", "Leeds   West", "Dock 3 / Bay 2", "ACME_DOCK_3", "Roof Void", "Snap Trap"])),
            (DeviceType::RodentSensor, fields(["烘焙坊", "上海", "仓库", long_reference.as_str(), "Internal", "Toxic Bait"])),
            (DeviceType::RodentSensor, fields(["", "", "", "", "Custom", "Bait/Lured"])),
            (DeviceType::Gateway, fields(["Acme", "Leeds", "Loading Bay", "GW_LEEDS_01", "", ""])),
            (DeviceType::Gateway, fields(["Bäckerei Müller", "Köln", "Dach  Nord", long_reference.as_str(), "", ""])),
            (DeviceType::Gateway, fields(["", "", "", "", "", ""])),
        ];

        for (device_type, expected) in cases {
            let location = to_location_array(&expected, device_type);
            assert_eq!(location.len(), device_type.location_len());
            assert_eq!(
                from_location_array(&location, device_type),
                expected,
                "{device_type}: {location:?}"
            );
        }
    }

    #[test]
    fn missing_sensor_tail_gets_defaults() {
        let mut fields = sensor_fields();
        fields.placement.clear();
        fields.configuration = "   ".to_string();

        let location = to_location_array(&fields, DeviceType::RodentSensor);
        assert_eq!(
            location,
            vec![
                "Golden Crust Manchester",
                "Manchester Production",
                "Flour Storage Silo A",
                "ERP024_025_01",
                "Internal",
                "Bait/Lured",
            ]
        );
    }

    #[test]
    fn short_arrays_never_fail() {
        let source: Vec<String> = ["A", "B", "C", "D", "E", "F", "G"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for len in 0..=source.len() {
            let sensor = from_location_array(&source[..len], DeviceType::RodentSensor);
            assert_eq!(sensor.customer, source[..len].first().cloned().unwrap_or_default());
            if len <= PLACEMENT {
                assert_eq!(sensor.placement, DEFAULT_PLACEMENT);
            }
            if len <= CONFIGURATION {
                assert_eq!(sensor.configuration, DEFAULT_CONFIGURATION);
            }
            if len <= REFERENCE {
                assert_eq!(sensor.erp_reference, "");
            }

            let gateway = from_location_array(&source[..len], DeviceType::Gateway);
            assert_eq!(gateway.placement, "");
            assert_eq!(gateway.configuration, "");
        }
    }

    #[test]
    fn apply_defaults_clears_gateway_extras() {
        let mut fields = sensor_fields();
        apply_defaults(&mut fields, DeviceType::Gateway);
        assert!(fields.placement.is_empty());
        assert!(fields.configuration.is_empty());

        let mut fields = LocationFields::default();
        apply_defaults(&mut fields, DeviceType::RodentSensor);
        assert_eq!(fields.placement, DEFAULT_PLACEMENT);
        assert_eq!(fields.configuration, DEFAULT_CONFIGURATION);
    }
}

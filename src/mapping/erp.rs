//! ERP inspection point mapping
//!
//! Joins inspection points to rodent sensors on the ERP reference (`location[3]`).
//! Duplicate references, on either side, are reported, never resolved silently.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    CanonicalDevice, CreateDeviceRequest, DeviceType, InspectionPoint, InspectionPointView,
    LocationFields, MappingReport, MappingSummary, PointMapping, RecommendedAction,
    UnmappedPoint,
};

use super::{DEFAULT_CONFIGURATION, DEFAULT_PLACEMENT, to_location_array};

const NAME_SEPARATOR: &str = " - ";

/// Customer and site used when an inspection point name carries no location prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDefaults {
    pub customer: String,
    pub site: String,
}

/// Derive sensor location fields from an inspection point.
///
/// Names shaped like `"<customer/site> - <area>"` split on the first separator;
/// anything else falls back to the configured customer and site with the whole
/// name as area.
pub fn derive_location(point: &InspectionPoint, defaults: &LocationDefaults) -> LocationFields {
    let (customer, site, area) = match point.name.split_once(NAME_SEPARATOR) {
        Some((prefix, area)) => {
            let prefix = prefix.trim().to_string();
            (prefix.clone(), prefix, area.trim().to_string())
        }
        None => (
            defaults.customer.clone(),
            defaults.site.clone(),
            point.name.trim().to_string(),
        ),
    };

    LocationFields {
        customer,
        site,
        area,
        erp_reference: point.reference.clone(),
        placement: DEFAULT_PLACEMENT.to_string(),
        configuration: DEFAULT_CONFIGURATION.to_string(),
    }
}

/// Sensor ERP references shared by more than one device of the same customer, sorted.
pub fn ambiguous_references(devices: &[CanonicalDevice]) -> Vec<String> {
    let mut seen: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for device in devices {
        let reference = device.fields.erp_reference.as_str();
        if reference.is_empty() || device.device_type != DeviceType::RodentSensor {
            continue;
        }
        *seen
            .entry((device.fields.customer.as_str(), reference))
            .or_default() += 1;
    }

    seen.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((_, reference), _)| reference.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Inspection points with their derived location and proposed sensor location array.
pub fn inspection_point_views(
    points: &[InspectionPoint],
    defaults: &LocationDefaults,
) -> Vec<InspectionPointView> {
    points
        .iter()
        .map(|point| {
            let derived_location = derive_location(point, defaults);
            InspectionPointView {
                proposed_location: to_location_array(&derived_location, DeviceType::RodentSensor),
                inspection_point: point.clone(),
                derived_location,
            }
        })
        .collect()
}

/// Map every inspection point against the current device population.
///
/// Only rodent sensors with an assigned GUID are mapping targets. A point is
/// ambiguous when several sensors carry its reference or when another point
/// shares it.
pub fn build_report(
    points: &[InspectionPoint],
    devices: &[CanonicalDevice],
    defaults: &LocationDefaults,
) -> MappingReport {
    let mut by_reference: BTreeMap<&str, Vec<&CanonicalDevice>> = BTreeMap::new();
    for device in devices {
        if device.device_type == DeviceType::RodentSensor
            && !device.guid_pending
            && !device.fields.erp_reference.is_empty()
        {
            by_reference
                .entry(device.fields.erp_reference.as_str())
                .or_default()
                .push(device);
        }
    }

    let mut point_references: BTreeMap<&str, usize> = BTreeMap::new();
    for point in points {
        if !point.reference.is_empty() {
            *point_references.entry(point.reference.as_str()).or_default() += 1;
        }
    }

    let mut summary = MappingSummary {
        total_inspection_points: points.len(),
        ..MappingSummary::default()
    };

    let mappings: Vec<PointMapping> = points
        .iter()
        .map(|point| {
            let matches = by_reference
                .get(point.reference.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let first = matches.first();
            let shared_point = point_references
                .get(point.reference.as_str())
                .is_some_and(|count| *count > 1);
            let ambiguous = matches.len() > 1 || shared_point;

            if first.is_some() {
                summary.mapped += 1;
            } else {
                summary.unmapped += 1;
            }
            if ambiguous {
                summary.ambiguous += 1;
            }

            PointMapping {
                inspection_point: point.clone(),
                derived_location: derive_location(point, defaults),
                mapped: first.is_some(),
                device_guid: first.map(|device| device.guid.clone()),
                cluster_id: first.map(|device| device.cluster_id.clone()),
                ambiguous_mapping: ambiguous,
                candidate_guids: if ambiguous {
                    matches.iter().map(|device| device.guid.clone()).collect()
                } else {
                    Vec::new()
                },
                recommended_action: if first.is_some() {
                    RecommendedAction::None
                } else {
                    RecommendedAction::CreateDeviceWithSentinelId
                },
            }
        })
        .collect();

    summary.coverage_percent = coverage(summary.mapped, summary.total_inspection_points);

    MappingReport {
        summary,
        points: mappings,
    }
}

/// Unmapped points paired with a sensor creation request built from their derived location.
pub fn unmapped_points(report: &MappingReport) -> Vec<UnmappedPoint> {
    report
        .points
        .iter()
        .filter(|mapping| !mapping.mapped)
        .map(|mapping| {
            let location = &mapping.derived_location;
            UnmappedPoint {
                inspection_point: mapping.inspection_point.clone(),
                create_request: CreateDeviceRequest {
                    customer: location.customer.clone(),
                    site: location.site.clone(),
                    area: location.area.clone(),
                    erp_reference: location.erp_reference.clone(),
                    placement: Some(location.placement.clone()),
                    configuration: Some(location.configuration.clone()),
                    device_type: DeviceType::RodentSensor.as_str().to_string(),
                    device_id: None,
                    status: None,
                },
            }
        })
        .collect()
}

fn coverage(mapped: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (mapped as f64 * 1000.0 / total as f64).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;

    fn defaults() -> LocationDefaults {
        LocationDefaults {
            customer: "Golden Crust Manchester".to_string(),
            site: "Manchester Production".to_string(),
        }
    }

    fn point(id: i64, name: &str, reference: &str) -> InspectionPoint {
        InspectionPoint {
            id,
            name: name.to_string(),
            reference: reference.to_string(),
            device_identifier: None,
            active: true,
        }
    }

    fn device(guid: &str, customer: &str, reference: &str) -> CanonicalDevice {
        CanonicalDevice {
            id: "00-00-00-00-00-00-00-00".to_string(),
            guid: guid.to_string(),
            device_type: DeviceType::RodentSensor,
            status: DeviceStatus::Active,
            location: vec![],
            fields: LocationFields {
                customer: customer.to_string(),
                erp_reference: reference.to_string(),
                ..LocationFields::default()
            },
            cluster_id: "cluster-1".to_string(),
            cluster_name: "Traps".to_string(),
            erp_ready: true,
            guid_pending: false,
        }
    }

    #[test]
    fn derive_location_splits_on_separator() {
        let fields = derive_location(&point(1, "Warburtons Bolton - Bakery Line 2", "ERP1"), &defaults());
        assert_eq!(fields.customer, "Warburtons Bolton");
        assert_eq!(fields.site, "Warburtons Bolton");
        assert_eq!(fields.area, "Bakery Line 2");
        assert_eq!(fields.erp_reference, "ERP1");
        assert_eq!(fields.placement, "Internal");
        assert_eq!(fields.configuration, "Bait/Lured");
    }

    #[test]
    fn derive_location_falls_back_to_defaults() {
        let fields = derive_location(&point(1, "Flour Storage Silo A", "ERP2"), &defaults());
        assert_eq!(fields.customer, "Golden Crust Manchester");
        assert_eq!(fields.site, "Manchester Production");
        assert_eq!(fields.area, "Flour Storage Silo A");
    }

    #[test]
    fn report_flags_shared_reference_without_failing() {
        let points = vec![
            point(1, "Silo A", "ERP024_025_01"),
            point(2, "Silo B", "ERP024_025_02"),
        ];
        let devices = vec![
            device("g-1", "Golden Crust", "ERP024_025_01"),
            device("g-2", "Golden Crust", "ERP024_025_01"),
        ];

        let report = build_report(&points, &devices, &defaults());

        let first = &report.points[0];
        assert!(first.mapped);
        assert!(first.ambiguous_mapping);
        assert_eq!(first.device_guid.as_deref(), Some("g-1"));
        assert_eq!(first.candidate_guids, vec!["g-1", "g-2"]);
        assert_eq!(first.recommended_action, RecommendedAction::None);

        let second = &report.points[1];
        assert!(!second.mapped);
        assert!(!second.ambiguous_mapping);
        assert_eq!(
            second.recommended_action,
            RecommendedAction::CreateDeviceWithSentinelId
        );

        assert_eq!(report.summary.mapped, 1);
        assert_eq!(report.summary.unmapped, 1);
        assert_eq!(report.summary.ambiguous, 1);
        assert_eq!(report.summary.coverage_percent, 50.0);
    }

    #[test]
    fn points_sharing_a_reference_are_both_ambiguous() {
        let points = vec![
            point(1, "Silo A", "ERP_DUP"),
            point(2, "Silo A (old)", "ERP_DUP"),
            point(3, "Silo B", "ERP_ONE"),
        ];
        let devices = vec![device("g-1", "Golden Crust", "ERP_DUP")];

        let report = build_report(&points, &devices, &defaults());

        for mapping in &report.points[..2] {
            assert!(mapping.mapped);
            assert!(mapping.ambiguous_mapping);
            assert_eq!(mapping.candidate_guids, vec!["g-1"]);
        }
        assert!(!report.points[2].ambiguous_mapping);
        assert_eq!(report.summary.ambiguous, 2);
        assert_eq!(report.summary.mapped, 2);
        assert_eq!(report.summary.unmapped, 1);
    }

    #[test]
    fn gateways_and_pending_sensors_are_not_mapping_targets() {
        let mut gateway = device("gw-1", "Golden Crust", "ERP_GW1");
        gateway.device_type = DeviceType::Gateway;
        let mut pending = device("", "Golden Crust", "ERP_NEW");
        pending.guid_pending = true;
        let points = vec![point(1, "Roof", "ERP_GW1"), point(2, "Dock", "ERP_NEW")];

        let report = build_report(&points, &[gateway, pending], &defaults());

        for mapping in &report.points {
            assert!(!mapping.mapped);
            assert!(mapping.device_guid.is_none());
            assert_eq!(
                mapping.recommended_action,
                RecommendedAction::CreateDeviceWithSentinelId
            );
        }
        assert_eq!(report.summary.unmapped, 2);
        assert_eq!(report.summary.coverage_percent, 0.0);
    }

    #[test]
    fn ambiguity_is_scoped_per_customer() {
        let devices = vec![
            device("g-1", "Golden Crust", "REF_1"),
            device("g-2", "Other Bakery", "REF_1"),
            device("g-3", "Other Bakery", "REF_2"),
            device("g-4", "Other Bakery", "REF_2"),
            device("g-5", "Other Bakery", ""),
            device("g-6", "Other Bakery", ""),
        ];
        assert_eq!(ambiguous_references(&devices), vec!["REF_2"]);
    }

    #[test]
    fn gateways_never_count_as_ambiguous() {
        let mut first = device("gw-1", "Golden Crust", "ROOF");
        first.device_type = DeviceType::Gateway;
        let mut second = device("gw-2", "Golden Crust", "ROOF");
        second.device_type = DeviceType::Gateway;
        assert!(ambiguous_references(&[first, second]).is_empty());
    }

    #[test]
    fn views_propose_full_sensor_array() {
        let views = inspection_point_views(&[point(3, "Silo C", "ERP_C")], &defaults());
        assert_eq!(
            views[0].proposed_location,
            vec![
                "Golden Crust Manchester",
                "Manchester Production",
                "Silo C",
                "ERP_C",
                "Internal",
                "Bait/Lured",
            ]
        );
    }

    #[test]
    fn unmapped_points_carry_creation_template() {
        let points = vec![point(7, "Acme Foods - Dock 3", "ACME_DOCK_3")];
        let report = build_report(&points, &[], &defaults());
        let unmapped = unmapped_points(&report);

        assert_eq!(unmapped.len(), 1);
        let request = &unmapped[0].create_request;
        assert_eq!(request.customer, "Acme Foods");
        assert_eq!(request.area, "Dock 3");
        assert_eq!(request.erp_reference, "ACME_DOCK_3");
        assert_eq!(request.device_type, "rodent_sensor");
        assert!(request.device_id.is_none());
        assert_eq!(report.summary.coverage_percent, 0.0);
    }

    #[test]
    fn empty_report_has_zero_coverage() {
        let report = build_report(&[], &[], &defaults());
        assert_eq!(report.summary.total_inspection_points, 0);
        assert_eq!(report.summary.coverage_percent, 0.0);
    }
}

//! # Tests for Handlers

use crate::cache::TopologyState;
use crate::config::{AppConfig, VendorConfig, VendorMode};
use crate::handlers::{health, root};
use crate::server::AppState;
use axum::{extract::State, response::Json};

fn test_state() -> AppState {
    AppState::from_config(AppConfig {
        vendor: VendorConfig {
            mode: VendorMode::InMemory,
            ..VendorConfig::default()
        },
        ..AppConfig::default()
    })
    .expect("in-memory state builds")
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "device-bridge");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_reports_cold_topology_without_vendor_calls() {
    let Json(health) = health(State(test_state())).await;

    assert_eq!(health.status, "ok");
    assert_eq!(health.topology_state, TopologyState::Cold);
    assert!(!health.erp_enabled);
}

#[tokio::test]
async fn test_health_serializes_flat_service_fields() {
    let state = test_state();
    state.orchestrator.list_devices().await.unwrap();

    let Json(health) = health(State(state)).await;
    let value = serde_json::to_value(&health).unwrap();

    assert_eq!(value["service"], "device-bridge");
    assert_eq!(value["topology_state"], "fresh");
    assert_eq!(value["erp_enabled"], false);
}

//! Connectors module
//!
//! Collaborator seams and their implementations:
//! - `DeviceCloud` for the IoT vendor cluster API (HTTP and in-memory)
//! - `InspectionPointSource` for the ERP (Odoo JSON-RPC)

pub mod device_cloud;
pub mod in_memory;
pub mod odoo;
pub mod trait_;

pub use device_cloud::{HttpDeviceCloud, HttpDeviceCloudConfig};
pub use in_memory::InMemoryDeviceCloud;
pub use odoo::{OdooClient, OdooConfig};
pub use trait_::{DeviceCloud, ErpError, InspectionPointSource, VendorError};

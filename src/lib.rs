//! # Device Bridge Library
//!
//! Keeps ERP inspection points and IoT vendor device clusters in sync:
//! caches, normalization, the CRUD orchestrator and the HTTP surface over it.

pub mod auth;
pub mod cache;
pub mod config;
pub mod connectors;
pub mod error;
pub mod handlers;
pub mod mapping;
pub mod models;
pub mod normalization;
pub mod orchestrator;
pub mod retry;
pub mod server;
pub mod telemetry;

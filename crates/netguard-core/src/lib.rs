//! netguard-core: Shared types, configuration, and error handling for the NetGuard platform.
//!
//! This crate provides the foundational types used across all NetGuard components:
//! - Tenant-scoped entities (devices, scans, findings, anomalies, telemetry)
//! - Scan lifecycle rules
//! - Event types and sinks for the notification surface
//! - Layered configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::NetguardError;
pub use types::{
    Anomaly, AnomalyId, AnomalyStatus, AnomalyType, DeviceId, DeviceStatus, DeviceType,
    FindingId, FindingStatus, NetworkDevice, OpenPort, OrgId, Organization, Protocol, ScanId,
    ScanStatus, ScanType, SecurityFinding, SecurityScan, Severity, TelemetrySample,
};

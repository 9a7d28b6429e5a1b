//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use netguard_core::{
    AnomalyStatus, DeviceStatus, DeviceType, FindingStatus, ScanId, Severity,
};
use netguard_discover::ScanProfile;
use netguard_store::{AnomalyFilter, DeviceFilter, FindingFilter};

/// JSON envelope wrapped around every response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub target: String,
    #[serde(default)]
    pub profile: Option<ScanProfile>,
}

/// Body of every `PATCH` that changes a status.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate<S> {
    pub status: S,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    pub status: Option<DeviceStatus>,
    pub device_type: Option<DeviceType>,
    pub limit: Option<u32>,
}

impl From<DeviceQuery> for DeviceFilter {
    fn from(q: DeviceQuery) -> Self {
        Self {
            status: q.status,
            device_type: q.device_type,
            limit: q.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindingQuery {
    pub severity: Option<Severity>,
    pub status: Option<FindingStatus>,
    pub scan_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub limit: Option<u32>,
}

impl From<FindingQuery> for FindingFilter {
    fn from(q: FindingQuery) -> Self {
        Self {
            severity: q.severity,
            status: q.status,
            scan_id: q.scan_id.map(ScanId),
            device_id: q.device_id.map(netguard_core::DeviceId),
            limit: q.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    pub severity: Option<Severity>,
    pub status: Option<AnomalyStatus>,
    pub device_id: Option<Uuid>,
    pub limit: Option<u32>,
}

impl From<AnomalyQuery> for AnomalyFilter {
    fn from(q: AnomalyQuery) -> Self {
        Self {
            severity: q.severity,
            status: q.status,
            device_id: q.device_id.map(netguard_core::DeviceId),
            limit: q.limit,
        }
    }
}

/// A telemetry sample pushed by an external collector. The organization
/// comes from the tenant header, never from the body.
#[derive(Debug, Deserialize)]
pub struct TelemetryIngest {
    pub device_id: Uuid,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub open_port_count: u32,
    #[serde(default)]
    pub service_count: u32,
    #[serde(default)]
    pub new_ports: u32,
    #[serde(default)]
    pub closed_ports: u32,
    #[serde(default)]
    pub risky_port_count: u32,
    #[serde(default)]
    pub bytes_in: u64,
    #[serde(default)]
    pub bytes_out: u64,
    #[serde(default)]
    pub connection_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    /// Register under a known ID instead of generating one.
    #[serde(default)]
    pub id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdated {
    pub id: Uuid,
    pub status: String,
}

//! NetGuard Store: multi-tenant persistence.
//!
//! This crate is the single mutation point for stored scan data. Every
//! operation is scoped to an organization: reads filter on it, writes carry
//! it, and nothing crosses tenants. Two backends implement [`Store`]:
//! [`PgStore`] (PostgreSQL) and [`MemoryStore`] (tests and dev mode).

pub mod client;
pub mod error;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod schema;

pub use client::{DatabaseConfig, PgStore};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netguard_core::{
    Anomaly, AnomalyId, AnomalyStatus, AnomalyType, DeviceId, DeviceStatus, DeviceType,
    FindingId, FindingStatus, NetworkDevice, OrgId, Organization, ScanId, SecurityFinding,
    SecurityScan, Severity, TelemetrySample,
};

/// Default page size when a filter does not set a limit.
pub const DEFAULT_LIMIT: u32 = 500;

/// Whether an upsert created a new row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub device_type: Option<DeviceType>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingFilter {
    /// Minimum severity (inclusive).
    pub severity: Option<Severity>,
    pub status: Option<FindingStatus>,
    pub scan_id: Option<ScanId>,
    pub device_id: Option<DeviceId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyFilter {
    /// Minimum severity (inclusive).
    pub severity: Option<Severity>,
    pub status: Option<AnomalyStatus>,
    pub device_id: Option<DeviceId>,
    pub limit: Option<u32>,
}

/// Tenant-scoped persistence operations.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Organizations ────────────────────────────────────────────

    async fn upsert_organization(&self, org: &Organization) -> Result<()>;

    async fn get_organization(&self, id: &OrgId) -> Result<Organization>;

    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    // ── Devices ──────────────────────────────────────────────────

    /// Insert or update a device keyed by `(organization_id, ip_address)`.
    ///
    /// On update the stored `id` and `first_seen` are kept, and a `retired`
    /// device stays retired.
    async fn upsert_device(&self, device: &NetworkDevice) -> Result<UpsertOutcome>;

    async fn get_device(&self, org: &OrgId, id: &DeviceId) -> Result<NetworkDevice>;

    async fn find_device_by_ip(&self, org: &OrgId, ip: &IpAddr) -> Result<Option<NetworkDevice>>;

    /// Devices ordered by `last_seen` descending.
    async fn list_devices(&self, org: &OrgId, filter: &DeviceFilter) -> Result<Vec<NetworkDevice>>;

    async fn set_device_status(&self, org: &OrgId, id: &DeviceId, status: DeviceStatus)
        -> Result<()>;

    async fn set_device_risk(&self, org: &OrgId, id: &DeviceId, risk_score: f64) -> Result<()>;

    /// Mark devices not seen since `cutoff` as stale. Retired devices are
    /// left alone. Returns the number of rows changed.
    async fn mark_stale(&self, org: &OrgId, cutoff: DateTime<Utc>) -> Result<u64>;

    // ── Scans ────────────────────────────────────────────────────

    async fn create_scan(&self, scan: &SecurityScan) -> Result<()>;

    /// Persist a scan's new state. The stored status must be able to move
    /// to the new one; terminal scans are immutable.
    async fn update_scan(&self, scan: &SecurityScan) -> Result<()>;

    async fn get_scan(&self, org: &OrgId, id: &ScanId) -> Result<SecurityScan>;

    /// Most recent scans first.
    async fn list_scans(&self, org: &OrgId, limit: u32) -> Result<Vec<SecurityScan>>;

    // ── Findings ─────────────────────────────────────────────────

    /// Insert a batch atomically. Every finding must belong to `org` and
    /// reference an existing scan of `org`.
    async fn insert_findings(&self, org: &OrgId, findings: &[SecurityFinding]) -> Result<()>;

    /// Findings ordered by severity descending, then newest first.
    async fn list_findings(&self, org: &OrgId, filter: &FindingFilter)
        -> Result<Vec<SecurityFinding>>;

    async fn set_finding_status(&self, org: &OrgId, id: &FindingId, status: FindingStatus)
        -> Result<()>;

    // ── Anomalies ────────────────────────────────────────────────

    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()>;

    /// Whether an open or investigating anomaly of this type exists for the device.
    async fn has_open_anomaly(&self, org: &OrgId, device: &DeviceId, kind: AnomalyType)
        -> Result<bool>;

    /// Anomalies ordered newest first.
    async fn list_anomalies(&self, org: &OrgId, filter: &AnomalyFilter) -> Result<Vec<Anomaly>>;

    async fn set_anomaly_status(&self, org: &OrgId, id: &AnomalyId, status: AnomalyStatus)
        -> Result<()>;

    // ── Telemetry ────────────────────────────────────────────────

    async fn record_telemetry(&self, sample: &TelemetrySample) -> Result<()>;

    /// Samples observed at or after `since`, oldest first.
    async fn telemetry_since(&self, org: &OrgId, since: DateTime<Utc>)
        -> Result<Vec<TelemetrySample>>;

    async fn organizations_with_telemetry(&self) -> Result<Vec<OrgId>>;
}

/// Fetch an organization, registering it under `fallback_name` if it does
/// not exist yet. Used by daemons started with a bare tenant ID.
pub async fn ensure_organization(
    store: &dyn Store,
    id: &OrgId,
    fallback_name: &str,
) -> Result<Organization> {
    match store.get_organization(id).await {
        Ok(org) => Ok(org),
        Err(e) if e.is_not_found() => {
            let org = Organization {
                id: *id,
                name: fallback_name.to_string(),
                created_at: Utc::now(),
            };
            store.upsert_organization(&org).await?;
            tracing::info!(org = %id, name = fallback_name, "Registered organization");
            Ok(org)
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn effective_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).max(1)
}

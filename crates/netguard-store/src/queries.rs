//! Read operations and row mapping for [`PgStore`].

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use netguard_core::{
    Anomaly, AnomalyId, AnomalyType, DeviceId, FindingId, NetworkDevice, OpenPort, OrgId,
    Organization, ScanId, SecurityFinding, SecurityScan, TelemetrySample,
};

use crate::client::PgStore;
use crate::error::{Result, StoreError};
use crate::schema::severity_rank;
use crate::{effective_limit, AnomalyFilter, DeviceFilter, FindingFilter};

pub(crate) const DEVICE_COLUMNS: &str = "id, organization_id, ip_address, mac_address, hostname, \
     vendor, os, device_type, status, open_ports, risk_score, first_seen, last_seen";

const SCAN_COLUMNS: &str = "id, organization_id, scan_type, target, profile, status, \
     findings_count, devices_found, error, created_at, started_at, completed_at";

const FINDING_COLUMNS: &str = "id, organization_id, scan_id, device_id, severity, title, \
     description, cve_id, cvss_score, port, status, created_at";

const ANOMALY_COLUMNS: &str = "id, organization_id, device_id, anomaly_type, severity, score, \
     description, status, detected_at";

// ── Rows ─────────────────────────────────────────────────────────

#[derive(FromRow)]
pub(crate) struct OrganizationRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: OrgId(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct DeviceRow {
    id: Uuid,
    organization_id: Uuid,
    ip_address: String,
    mac_address: Option<String>,
    hostname: Option<String>,
    vendor: Option<String>,
    os: Option<String>,
    device_type: String,
    status: String,
    open_ports: Json<Vec<OpenPort>>,
    risk_score: f64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for NetworkDevice {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self> {
        let ip_address: IpAddr = row
            .ip_address
            .parse()
            .map_err(|e| StoreError::Serialization(format!("ip {:?}: {e}", row.ip_address)))?;
        Ok(Self {
            id: DeviceId(row.id),
            organization_id: OrgId(row.organization_id),
            ip_address,
            mac_address: row.mac_address,
            hostname: row.hostname,
            vendor: row.vendor,
            os: row.os,
            device_type: row.device_type.parse()?,
            status: row.status.parse()?,
            open_ports: row.open_ports.0,
            risk_score: row.risk_score,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct ScanRow {
    id: Uuid,
    organization_id: Uuid,
    scan_type: String,
    target: String,
    profile: String,
    status: String,
    findings_count: i64,
    devices_found: i64,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ScanRow> for SecurityScan {
    type Error = StoreError;

    fn try_from(row: ScanRow) -> Result<Self> {
        Ok(Self {
            id: ScanId(row.id),
            organization_id: OrgId(row.organization_id),
            scan_type: row.scan_type.parse()?,
            target: row.target,
            profile: row.profile,
            status: row.status.parse()?,
            findings_count: count(row.findings_count),
            devices_found: count(row.devices_found),
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct FindingRow {
    id: Uuid,
    organization_id: Uuid,
    scan_id: Uuid,
    device_id: Uuid,
    severity: String,
    title: String,
    description: String,
    cve_id: Option<String>,
    cvss_score: Option<f64>,
    port: Option<i32>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<FindingRow> for SecurityFinding {
    type Error = StoreError;

    fn try_from(row: FindingRow) -> Result<Self> {
        Ok(Self {
            id: FindingId(row.id),
            organization_id: OrgId(row.organization_id),
            scan_id: ScanId(row.scan_id),
            device_id: DeviceId(row.device_id),
            severity: row.severity.parse()?,
            title: row.title,
            description: row.description,
            cve_id: row.cve_id,
            cvss_score: row.cvss_score,
            port: row.port.and_then(|p| u16::try_from(p).ok()),
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct AnomalyRow {
    id: Uuid,
    organization_id: Uuid,
    device_id: Option<Uuid>,
    anomaly_type: String,
    severity: String,
    score: f64,
    description: String,
    status: String,
    detected_at: DateTime<Utc>,
}

impl TryFrom<AnomalyRow> for Anomaly {
    type Error = StoreError;

    fn try_from(row: AnomalyRow) -> Result<Self> {
        Ok(Self {
            id: AnomalyId(row.id),
            organization_id: OrgId(row.organization_id),
            device_id: row.device_id.map(DeviceId),
            anomaly_type: row.anomaly_type.parse()?,
            severity: row.severity.parse()?,
            score: row.score,
            description: row.description,
            status: row.status.parse()?,
            detected_at: row.detected_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct TelemetryRow {
    organization_id: Uuid,
    device_id: Uuid,
    observed_at: DateTime<Utc>,
    open_port_count: i64,
    service_count: i64,
    new_ports: i64,
    closed_ports: i64,
    risky_port_count: i64,
    bytes_in: i64,
    bytes_out: i64,
    connection_count: i64,
}

impl From<TelemetryRow> for TelemetrySample {
    fn from(row: TelemetryRow) -> Self {
        let volume = |v: i64| v.max(0) as u64;
        Self {
            organization_id: OrgId(row.organization_id),
            device_id: DeviceId(row.device_id),
            observed_at: row.observed_at,
            open_port_count: count(row.open_port_count),
            service_count: count(row.service_count),
            new_ports: count(row.new_ports),
            closed_ports: count(row.closed_ports),
            risky_port_count: count(row.risky_port_count),
            bytes_in: volume(row.bytes_in),
            bytes_out: volume(row.bytes_out),
            connection_count: volume(row.connection_count),
        }
    }
}

/// Counts are stored as BIGINT so every `u32` round-trips.
fn count(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

impl PgStore {
    // ── Organizations ────────────────────────────────────────────

    pub async fn get_organization(&self, id: &OrgId) -> Result<Organization> {
        let row: Option<OrganizationRow> =
            sqlx::query_as("SELECT id, name, created_at FROM organizations WHERE id = $1")
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        row.map(Organization::from)
            .ok_or_else(|| StoreError::not_found("organization", id, id))
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let rows: Vec<OrganizationRow> =
            sqlx::query_as("SELECT id, name, created_at FROM organizations ORDER BY created_at")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(Organization::from).collect())
    }

    // ── Devices ──────────────────────────────────────────────────

    pub async fn get_device(&self, org: &OrgId, id: &DeviceId) -> Result<NetworkDevice> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM network_devices WHERE organization_id = $1 AND id = $2"
        );
        let row: Option<DeviceRow> = sqlx::query_as(&sql)
            .bind(org.0)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| StoreError::not_found("device", id, org))?
            .try_into()
    }

    pub async fn find_device_by_ip(
        &self,
        org: &OrgId,
        ip: &IpAddr,
    ) -> Result<Option<NetworkDevice>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM network_devices \
             WHERE organization_id = $1 AND ip_address = $2"
        );
        let row: Option<DeviceRow> = sqlx::query_as(&sql)
            .bind(org.0)
            .bind(ip.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(NetworkDevice::try_from).transpose()
    }

    pub async fn list_devices(
        &self,
        org: &OrgId,
        filter: &DeviceFilter,
    ) -> Result<Vec<NetworkDevice>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DEVICE_COLUMNS} FROM network_devices WHERE organization_id = "
        ));
        qb.push_bind(org.0);
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(device_type) = filter.device_type {
            qb.push(" AND device_type = ").push_bind(device_type.as_str());
        }
        qb.push(" ORDER BY last_seen DESC, ip_address::inet LIMIT ")
            .push_bind(i64::from(effective_limit(filter.limit)));

        let rows: Vec<DeviceRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        collect(rows)
    }

    // ── Scans ────────────────────────────────────────────────────

    pub async fn get_scan(&self, org: &OrgId, id: &ScanId) -> Result<SecurityScan> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM security_scans WHERE organization_id = $1 AND id = $2"
        );
        let row: Option<ScanRow> = sqlx::query_as(&sql)
            .bind(org.0)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| StoreError::not_found("scan", id, org))?
            .try_into()
    }

    pub async fn list_scans(&self, org: &OrgId, limit: u32) -> Result<Vec<SecurityScan>> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM security_scans WHERE organization_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows: Vec<ScanRow> = sqlx::query_as(&sql)
            .bind(org.0)
            .bind(i64::from(limit.max(1)))
            .fetch_all(self.pool())
            .await?;
        collect(rows)
    }

    // ── Findings ─────────────────────────────────────────────────

    pub async fn list_findings(
        &self,
        org: &OrgId,
        filter: &FindingFilter,
    ) -> Result<Vec<SecurityFinding>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {FINDING_COLUMNS} FROM security_findings WHERE organization_id = "
        ));
        qb.push_bind(org.0);
        if let Some(severity) = filter.severity {
            qb.push(" AND severity_rank >= ")
                .push_bind(severity_rank(severity));
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(scan_id) = filter.scan_id {
            qb.push(" AND scan_id = ").push_bind(scan_id.0);
        }
        if let Some(device_id) = filter.device_id {
            qb.push(" AND device_id = ").push_bind(device_id.0);
        }
        qb.push(" ORDER BY severity_rank DESC, created_at DESC LIMIT ")
            .push_bind(i64::from(effective_limit(filter.limit)));

        let rows: Vec<FindingRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        collect(rows)
    }

    // ── Anomalies ────────────────────────────────────────────────

    pub async fn has_open_anomaly(
        &self,
        org: &OrgId,
        device: &DeviceId,
        kind: AnomalyType,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM anomalies
                WHERE organization_id = $1 AND device_id = $2 AND anomaly_type = $3
                  AND status IN ('open', 'investigating')
            )",
        )
        .bind(org.0)
        .bind(device.0)
        .bind(kind.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    pub async fn list_anomalies(&self, org: &OrgId, filter: &AnomalyFilter) -> Result<Vec<Anomaly>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ANOMALY_COLUMNS} FROM anomalies WHERE organization_id = "
        ));
        qb.push_bind(org.0);
        if let Some(severity) = filter.severity {
            qb.push(" AND severity_rank >= ")
                .push_bind(severity_rank(severity));
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(device_id) = filter.device_id {
            qb.push(" AND device_id = ").push_bind(device_id.0);
        }
        qb.push(" ORDER BY detected_at DESC LIMIT ")
            .push_bind(i64::from(effective_limit(filter.limit)));

        let rows: Vec<AnomalyRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        collect(rows)
    }

    // ── Telemetry ────────────────────────────────────────────────

    pub async fn telemetry_since(
        &self,
        org: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Vec<TelemetrySample>> {
        let rows: Vec<TelemetryRow> = sqlx::query_as(
            "SELECT organization_id, device_id, observed_at, open_port_count, service_count,
                    new_ports, closed_ports, risky_port_count, bytes_in, bytes_out,
                    connection_count
             FROM device_telemetry
             WHERE organization_id = $1 AND observed_at >= $2
             ORDER BY observed_at",
        )
        .bind(org.0)
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(TelemetrySample::from).collect())
    }

    pub async fn organizations_with_telemetry(&self) -> Result<Vec<OrgId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT organization_id FROM device_telemetry ORDER BY organization_id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids.into_iter().map(OrgId).collect())
    }
}

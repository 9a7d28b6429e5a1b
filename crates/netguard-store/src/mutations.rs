//! Write operations for [`PgStore`].
//!
//! Devices upsert on `(organization_id, ip_address)`. Multi-row writes run in
//! a single transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::types::Json;

use netguard_core::{
    Anomaly, AnomalyId, AnomalyStatus, DeviceId, DeviceStatus, FindingId, FindingStatus,
    NetworkDevice, OrgId, Organization, ScanId, ScanStatus, SecurityFinding, SecurityScan,
    TelemetrySample,
};

use crate::client::PgStore;
use crate::error::{Result, StoreError};
use crate::schema::severity_rank;
use crate::UpsertOutcome;

impl PgStore {
    // ── Organizations ────────────────────────────────────────────

    pub async fn upsert_organization(&self, org: &Organization) -> Result<()> {
        sqlx::query(
            "INSERT INTO organizations (id, name, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(org.id.0)
        .bind(&org.name)
        .bind(org.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    // ── Devices ──────────────────────────────────────────────────

    pub async fn upsert_device(&self, device: &NetworkDevice) -> Result<UpsertOutcome> {
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO network_devices (id, organization_id, ip_address, mac_address, hostname,
                 vendor, os, device_type, status, open_ports, risk_score, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (organization_id, ip_address) DO UPDATE SET
                 mac_address = EXCLUDED.mac_address,
                 hostname = EXCLUDED.hostname,
                 vendor = EXCLUDED.vendor,
                 os = EXCLUDED.os,
                 device_type = EXCLUDED.device_type,
                 status = CASE WHEN network_devices.status = 'retired'
                               THEN 'retired' ELSE EXCLUDED.status END,
                 open_ports = EXCLUDED.open_ports,
                 risk_score = EXCLUDED.risk_score,
                 first_seen = LEAST(network_devices.first_seen, EXCLUDED.first_seen),
                 last_seen = EXCLUDED.last_seen
             RETURNING (xmax = 0)",
        )
        .bind(device.id.0)
        .bind(device.organization_id.0)
        .bind(device.ip_address.to_string())
        .bind(&device.mac_address)
        .bind(&device.hostname)
        .bind(&device.vendor)
        .bind(&device.os)
        .bind(device.device_type.as_str())
        .bind(device.status.as_str())
        .bind(Json(&device.open_ports))
        .bind(device.risk_score)
        .bind(device.first_seen)
        .bind(device.last_seen)
        .fetch_one(self.pool())
        .await?;

        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    pub async fn set_device_status(
        &self,
        org: &OrgId,
        id: &DeviceId,
        status: DeviceStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE network_devices SET status = $3 WHERE organization_id = $1 AND id = $2",
        )
        .bind(org.0)
        .bind(id.0)
        .bind(status.as_str())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("device", id, org));
        }
        Ok(())
    }

    pub async fn set_device_risk(&self, org: &OrgId, id: &DeviceId, risk_score: f64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE network_devices SET risk_score = $3 WHERE organization_id = $1 AND id = $2",
        )
        .bind(org.0)
        .bind(id.0)
        .bind(risk_score)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("device", id, org));
        }
        Ok(())
    }

    pub async fn mark_stale(&self, org: &OrgId, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE network_devices SET status = 'stale'
             WHERE organization_id = $1 AND last_seen < $2
               AND status NOT IN ('stale', 'retired')",
        )
        .bind(org.0)
        .bind(cutoff)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    // ── Scans ────────────────────────────────────────────────────

    pub async fn create_scan(&self, scan: &SecurityScan) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO security_scans (id, organization_id, scan_type, target, profile, status,
                 findings_count, devices_found, error, created_at, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(scan.id.0)
        .bind(scan.organization_id.0)
        .bind(scan.scan_type.as_str())
        .bind(&scan.target)
        .bind(&scan.profile)
        .bind(scan.status.as_str())
        .bind(i64::from(scan.findings_count))
        .bind(i64::from(scan.devices_found))
        .bind(&scan.error)
        .bind(scan.created_at)
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                entity: "scan",
                id: scan.id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn update_scan(&self, scan: &SecurityScan) -> Result<()> {
        let org = scan.organization_id;
        let mut tx = self.pool().begin().await?;

        let stored: Option<String> = sqlx::query_scalar(
            "SELECT status FROM security_scans
             WHERE organization_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(org.0)
        .bind(scan.id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let from: ScanStatus = stored
            .ok_or_else(|| StoreError::not_found("scan", scan.id, &org))?
            .parse()?;

        let moved = from != scan.status;
        if from.is_terminal() || (moved && !from.can_transition_to(scan.status)) {
            return Err(StoreError::InvalidTransition {
                scan_id: scan.id,
                from,
                to: scan.status,
            });
        }

        sqlx::query(
            "UPDATE security_scans SET status = $3, findings_count = $4, devices_found = $5,
                 error = $6, started_at = $7, completed_at = $8
             WHERE organization_id = $1 AND id = $2",
        )
        .bind(org.0)
        .bind(scan.id.0)
        .bind(scan.status.as_str())
        .bind(i64::from(scan.findings_count))
        .bind(i64::from(scan.devices_found))
        .bind(&scan.error)
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ── Findings ─────────────────────────────────────────────────

    pub async fn insert_findings(&self, org: &OrgId, findings: &[SecurityFinding]) -> Result<()> {
        if findings.is_empty() {
            return Ok(());
        }
        if let Some(foreign) = findings.iter().find(|f| &f.organization_id != org) {
            return Err(StoreError::TenantMismatch {
                expected: *org,
                found: foreign.organization_id,
            });
        }

        let mut tx = self.pool().begin().await?;

        let scan_ids: BTreeSet<ScanId> = findings.iter().map(|f| f.scan_id).collect();
        for scan_id in scan_ids {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM security_scans WHERE organization_id = $1 AND id = $2)",
            )
            .bind(org.0)
            .bind(scan_id.0)
            .fetch_one(&mut *tx)
            .await?;
            if !exists {
                return Err(StoreError::ScanNotFound {
                    scan_id,
                    organization_id: *org,
                });
            }
        }

        for finding in findings {
            sqlx::query(
                "INSERT INTO security_findings (id, organization_id, scan_id, device_id, severity,
                     severity_rank, title, description, cve_id, cvss_score, port, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(finding.id.0)
            .bind(org.0)
            .bind(finding.scan_id.0)
            .bind(finding.device_id.0)
            .bind(finding.severity.as_str())
            .bind(severity_rank(finding.severity))
            .bind(&finding.title)
            .bind(&finding.description)
            .bind(&finding.cve_id)
            .bind(finding.cvss_score)
            .bind(finding.port.map(i32::from))
            .bind(finding.status.as_str())
            .bind(finding.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(org = %org, count = findings.len(), "Inserted findings");
        Ok(())
    }

    pub async fn set_finding_status(
        &self,
        org: &OrgId,
        id: &FindingId,
        status: FindingStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE security_findings SET status = $3 WHERE organization_id = $1 AND id = $2",
        )
        .bind(org.0)
        .bind(id.0)
        .bind(status.as_str())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("finding", id, org));
        }
        Ok(())
    }

    // ── Anomalies ────────────────────────────────────────────────

    pub async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO anomalies (id, organization_id, device_id, anomaly_type, severity,
                 severity_rank, score, description, status, detected_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(anomaly.id.0)
        .bind(anomaly.organization_id.0)
        .bind(anomaly.device_id.map(|d| d.0))
        .bind(anomaly.anomaly_type.as_str())
        .bind(anomaly.severity.as_str())
        .bind(severity_rank(anomaly.severity))
        .bind(anomaly.score)
        .bind(&anomaly.description)
        .bind(anomaly.status.as_str())
        .bind(anomaly.detected_at)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                entity: "anomaly",
                id: anomaly.id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn set_anomaly_status(
        &self,
        org: &OrgId,
        id: &AnomalyId,
        status: AnomalyStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE anomalies SET status = $3 WHERE organization_id = $1 AND id = $2",
        )
        .bind(org.0)
        .bind(id.0)
        .bind(status.as_str())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("anomaly", id, org));
        }
        Ok(())
    }

    // ── Telemetry ────────────────────────────────────────────────

    pub async fn record_telemetry(&self, sample: &TelemetrySample) -> Result<()> {
        let volume = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO device_telemetry (organization_id, device_id, observed_at,
                 open_port_count, service_count, new_ports, closed_ports, risky_port_count,
                 bytes_in, bytes_out, connection_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(sample.organization_id.0)
        .bind(sample.device_id.0)
        .bind(sample.observed_at)
        .bind(i64::from(sample.open_port_count))
        .bind(i64::from(sample.service_count))
        .bind(i64::from(sample.new_ports))
        .bind(i64::from(sample.closed_ports))
        .bind(i64::from(sample.risky_port_count))
        .bind(volume(sample.bytes_in))
        .bind(volume(sample.bytes_out))
        .bind(volume(sample.connection_count))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

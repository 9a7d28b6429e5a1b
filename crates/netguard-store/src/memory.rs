//! In-process [`Store`] backed by hash maps behind a tokio `RwLock`.
//!
//! Enforces the same tenant and integrity rules as the PostgreSQL schema so
//! tests against it carry over.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use netguard_core::{
    Anomaly, AnomalyId, AnomalyStatus, AnomalyType, DeviceId, DeviceStatus, FindingId,
    FindingStatus, NetworkDevice, OrgId, Organization, ScanId, SecurityFinding, SecurityScan,
    TelemetrySample,
};

use crate::error::{Result, StoreError};
use crate::{
    effective_limit, AnomalyFilter, DeviceFilter, FindingFilter, Store, UpsertOutcome,
};

#[derive(Default)]
struct Tables {
    organizations: HashMap<OrgId, Organization>,
    devices: HashMap<(OrgId, DeviceId), NetworkDevice>,
    device_ips: HashMap<(OrgId, IpAddr), DeviceId>,
    scans: HashMap<(OrgId, ScanId), SecurityScan>,
    findings: Vec<SecurityFinding>,
    anomalies: Vec<Anomaly>,
    telemetry: Vec<TelemetrySample>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_organization(&self, org: &Organization) -> Result<()> {
        let mut t = self.tables.write().await;
        t.organizations.insert(org.id, org.clone());
        Ok(())
    }

    async fn get_organization(&self, id: &OrgId) -> Result<Organization> {
        let t = self.tables.read().await;
        t.organizations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("organization", id, id))
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let t = self.tables.read().await;
        let mut orgs: Vec<Organization> = t.organizations.values().cloned().collect();
        orgs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orgs)
    }

    async fn upsert_device(&self, device: &NetworkDevice) -> Result<UpsertOutcome> {
        let mut t = self.tables.write().await;
        let org = device.organization_id;
        let ip_key = (org, device.ip_address);

        match t.device_ips.get(&ip_key).copied() {
            Some(existing_id) => {
                let row = t
                    .devices
                    .get_mut(&(org, existing_id))
                    .ok_or_else(|| StoreError::not_found("device", existing_id, &org))?;
                let first_seen = row.first_seen.min(device.first_seen);
                let retired = row.status == DeviceStatus::Retired;

                *row = device.clone();
                row.id = existing_id;
                row.first_seen = first_seen;
                if retired {
                    row.status = DeviceStatus::Retired;
                }
                Ok(UpsertOutcome::Updated)
            }
            None => {
                t.device_ips.insert(ip_key, device.id);
                t.devices.insert((org, device.id), device.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn get_device(&self, org: &OrgId, id: &DeviceId) -> Result<NetworkDevice> {
        let t = self.tables.read().await;
        t.devices
            .get(&(*org, *id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("device", id, org))
    }

    async fn find_device_by_ip(&self, org: &OrgId, ip: &IpAddr) -> Result<Option<NetworkDevice>> {
        let t = self.tables.read().await;
        Ok(t
            .device_ips
            .get(&(*org, *ip))
            .and_then(|id| t.devices.get(&(*org, *id)))
            .cloned())
    }

    async fn list_devices(&self, org: &OrgId, filter: &DeviceFilter) -> Result<Vec<NetworkDevice>> {
        let t = self.tables.read().await;
        let mut devices: Vec<NetworkDevice> = t
            .devices
            .values()
            .filter(|d| &d.organization_id == org)
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.device_type.map_or(true, |ty| d.device_type == ty))
            .cloned()
            .collect();
        devices.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.ip_address.cmp(&b.ip_address))
        });
        devices.truncate(effective_limit(filter.limit) as usize);
        Ok(devices)
    }

    async fn set_device_status(
        &self,
        org: &OrgId,
        id: &DeviceId,
        status: DeviceStatus,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        let device = t
            .devices
            .get_mut(&(*org, *id))
            .ok_or_else(|| StoreError::not_found("device", id, org))?;
        device.status = status;
        Ok(())
    }

    async fn set_device_risk(&self, org: &OrgId, id: &DeviceId, risk_score: f64) -> Result<()> {
        let mut t = self.tables.write().await;
        let device = t
            .devices
            .get_mut(&(*org, *id))
            .ok_or_else(|| StoreError::not_found("device", id, org))?;
        device.risk_score = risk_score;
        Ok(())
    }

    async fn mark_stale(&self, org: &OrgId, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for device in t.devices.values_mut() {
            if &device.organization_id == org
                && device.last_seen < cutoff
                && !matches!(device.status, DeviceStatus::Stale | DeviceStatus::Retired)
            {
                device.status = DeviceStatus::Stale;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn create_scan(&self, scan: &SecurityScan) -> Result<()> {
        let mut t = self.tables.write().await;
        let key = (scan.organization_id, scan.id);
        if t.scans.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity: "scan",
                id: scan.id.to_string(),
            });
        }
        t.scans.insert(key, scan.clone());
        Ok(())
    }

    async fn update_scan(&self, scan: &SecurityScan) -> Result<()> {
        let mut t = self.tables.write().await;
        let org = scan.organization_id;
        let stored = t
            .scans
            .get_mut(&(org, scan.id))
            .ok_or_else(|| StoreError::not_found("scan", scan.id, &org))?;

        let moved = stored.status != scan.status;
        if stored.status.is_terminal() || (moved && !stored.status.can_transition_to(scan.status)) {
            return Err(StoreError::InvalidTransition {
                scan_id: scan.id,
                from: stored.status,
                to: scan.status,
            });
        }
        *stored = scan.clone();
        Ok(())
    }

    async fn get_scan(&self, org: &OrgId, id: &ScanId) -> Result<SecurityScan> {
        let t = self.tables.read().await;
        t.scans
            .get(&(*org, *id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("scan", id, org))
    }

    async fn list_scans(&self, org: &OrgId, limit: u32) -> Result<Vec<SecurityScan>> {
        let t = self.tables.read().await;
        let mut scans: Vec<SecurityScan> = t
            .scans
            .values()
            .filter(|s| &s.organization_id == org)
            .cloned()
            .collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        scans.truncate(limit.max(1) as usize);
        Ok(scans)
    }

    async fn insert_findings(&self, org: &OrgId, findings: &[SecurityFinding]) -> Result<()> {
        let mut t = self.tables.write().await;

        // Validate the whole batch before touching the table.
        for finding in findings {
            if &finding.organization_id != org {
                return Err(StoreError::TenantMismatch {
                    expected: *org,
                    found: finding.organization_id,
                });
            }
            if !t.scans.contains_key(&(*org, finding.scan_id)) {
                return Err(StoreError::ScanNotFound {
                    scan_id: finding.scan_id,
                    organization_id: *org,
                });
            }
        }

        t.findings.extend(findings.iter().cloned());
        Ok(())
    }

    async fn list_findings(
        &self,
        org: &OrgId,
        filter: &FindingFilter,
    ) -> Result<Vec<SecurityFinding>> {
        let t = self.tables.read().await;
        let mut findings: Vec<SecurityFinding> = t
            .findings
            .iter()
            .filter(|f| &f.organization_id == org)
            .filter(|f| filter.severity.map_or(true, |s| f.severity >= s))
            .filter(|f| filter.status.map_or(true, |s| f.status == s))
            .filter(|f| filter.scan_id.map_or(true, |s| f.scan_id == s))
            .filter(|f| filter.device_id.map_or(true, |d| f.device_id == d))
            .cloned()
            .collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        findings.truncate(effective_limit(filter.limit) as usize);
        Ok(findings)
    }

    async fn set_finding_status(
        &self,
        org: &OrgId,
        id: &FindingId,
        status: FindingStatus,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        let finding = t
            .findings
            .iter_mut()
            .find(|f| &f.organization_id == org && &f.id == id)
            .ok_or_else(|| StoreError::not_found("finding", id, org))?;
        finding.status = status;
        Ok(())
    }

    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.anomalies.iter().any(|a| a.id == anomaly.id) {
            return Err(StoreError::Conflict {
                entity: "anomaly",
                id: anomaly.id.to_string(),
            });
        }
        t.anomalies.push(anomaly.clone());
        Ok(())
    }

    async fn has_open_anomaly(
        &self,
        org: &OrgId,
        device: &DeviceId,
        kind: AnomalyType,
    ) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.anomalies.iter().any(|a| {
            &a.organization_id == org
                && a.device_id.as_ref() == Some(device)
                && a.anomaly_type == kind
                && a.status.is_active()
        }))
    }

    async fn list_anomalies(&self, org: &OrgId, filter: &AnomalyFilter) -> Result<Vec<Anomaly>> {
        let t = self.tables.read().await;
        let mut anomalies: Vec<Anomaly> = t
            .anomalies
            .iter()
            .filter(|a| &a.organization_id == org)
            .filter(|a| filter.severity.map_or(true, |s| a.severity >= s))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                filter
                    .device_id
                    .map_or(true, |d| a.device_id == Some(d))
            })
            .cloned()
            .collect();
        anomalies.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        anomalies.truncate(effective_limit(filter.limit) as usize);
        Ok(anomalies)
    }

    async fn set_anomaly_status(
        &self,
        org: &OrgId,
        id: &AnomalyId,
        status: AnomalyStatus,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        let anomaly = t
            .anomalies
            .iter_mut()
            .find(|a| &a.organization_id == org && &a.id == id)
            .ok_or_else(|| StoreError::not_found("anomaly", id, org))?;
        anomaly.status = status;
        Ok(())
    }

    async fn record_telemetry(&self, sample: &TelemetrySample) -> Result<()> {
        let mut t = self.tables.write().await;
        t.telemetry.push(sample.clone());
        Ok(())
    }

    async fn telemetry_since(
        &self,
        org: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Vec<TelemetrySample>> {
        let t = self.tables.read().await;
        let mut samples: Vec<TelemetrySample> = t
            .telemetry
            .iter()
            .filter(|s| &s.organization_id == org && s.observed_at >= since)
            .cloned()
            .collect();
        samples.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
        Ok(samples)
    }

    async fn organizations_with_telemetry(&self) -> Result<Vec<OrgId>> {
        let t = self.tables.read().await;
        let orgs: BTreeSet<OrgId> = t.telemetry.iter().map(|s| s.organization_id).collect();
        Ok(orgs.into_iter().collect())
    }
}

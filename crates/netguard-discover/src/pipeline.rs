//! Scan orchestration: scanner → diff → persist → findings → risk.
//!
//! A scan is persisted as `pending` by [`ScanPipeline::begin`] and driven
//! to `completed` or `failed` by [`ScanPipeline::execute`]. A failed stage
//! always leaves the stored scan `failed` before the error is returned.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use netguard_core::events::{EventPayload, EventSink, EventSource, NetguardEvent};
use netguard_core::{OrgId, ScanType, SecurityFinding, SecurityScan};
use netguard_journal::{EntryId, JournalSession, JournalStore};
use netguard_store::Store;
use netguard_vuln::{risk_by_device, FindingAggregator, RiskConfig};

use crate::config::ScanProfile;
use crate::diff::{self, DiffSummary};
use crate::error::{DiscoverError, Result};
use crate::journal;
use crate::persist::{self, PersistOutcome};
use crate::scanner::HostScanner;

/// What to scan and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    pub scan_type: ScanType,
    #[serde(default)]
    pub profile: ScanProfile,
}

impl ScanRequest {
    pub fn new(target: &str, scan_type: ScanType, profile: ScanProfile) -> Self {
        Self {
            target: target.to_string(),
            scan_type,
            profile,
        }
    }
}

/// Outcome of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scan: SecurityScan,
    pub summary: DiffSummary,
    pub persisted: PersistOutcome,
    pub findings: Vec<SecurityFinding>,
    pub duration_ms: u64,
    pub journal_entry: Option<EntryId>,
}

struct StageOutput {
    summary: DiffSummary,
    persisted: PersistOutcome,
    findings: Vec<SecurityFinding>,
}

pub struct ScanPipeline {
    store: Arc<dyn Store>,
    scanner: Arc<dyn HostScanner>,
    events: Arc<dyn EventSink>,
    aggregator: Arc<FindingAggregator>,
    journal: Option<Arc<dyn JournalStore>>,
    risk: RiskConfig,
    stale_threshold_hours: u64,
}

impl ScanPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        scanner: Arc<dyn HostScanner>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            scanner,
            events,
            aggregator: Arc::new(FindingAggregator::default()),
            journal: None,
            risk: RiskConfig::default(),
            stale_threshold_hours: 24,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Arc<FindingAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn JournalStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_stale_threshold_hours(mut self, hours: u64) -> Self {
        self.stale_threshold_hours = hours;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Persist a `pending` scan for the request.
    pub async fn begin(&self, org: &OrgId, request: &ScanRequest) -> Result<SecurityScan> {
        let target = request.target.trim();
        if target.is_empty() {
            return Err(DiscoverError::InvalidTarget("target is empty".to_string()));
        }

        let scan = SecurityScan::new(*org, request.scan_type, target, request.profile.as_str());
        self.store.create_scan(&scan).await?;

        tracing::info!(
            scan_id = %scan.id,
            org = %org,
            scan_type = %scan.scan_type,
            target = %scan.target,
            "Scan created"
        );
        Ok(scan)
    }

    /// Drive a `pending` scan to completion.
    pub async fn execute(&self, scan: SecurityScan) -> Result<ScanReport> {
        let started = Instant::now();
        let mut session = journal::start_scan_session(&scan, self.scanner.name());

        let mut running = scan.clone();
        if let Err(e) = running.start() {
            return Err(self.fail(scan, session, e.into()).await);
        }
        if let Err(e) = self.store.update_scan(&running).await {
            return Err(self.fail(scan, session, e.into()).await);
        }

        self.publish(
            &running,
            EventPayload::ScanStarted {
                scan_id: running.id,
                scan_type: running.scan_type,
                target: running.target.clone(),
            },
        );

        let output = match self.stages(&running, &mut session).await {
            Ok(output) => output,
            Err(e) => return Err(self.fail(running, session, e).await),
        };

        let mut completed = running.clone();
        completed.complete(output.summary.total_scanned, output.findings.len() as u32)?;
        if let Err(e) = self.store.update_scan(&completed).await {
            return Err(self.fail(running, session, e.into()).await);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.publish(
            &completed,
            EventPayload::ScanCompleted {
                scan_id: completed.id,
                devices_found: output.summary.total_scanned,
                new_devices: output.summary.new_count,
                offline_devices: output.summary.offline_count,
                findings_count: output.findings.len() as u32,
                duration_ms,
            },
        );

        let entry = journal::finalize_and_store(self.journal.clone(), session).await;

        tracing::info!(
            scan_id = %completed.id,
            org = %completed.organization_id,
            target = %completed.target,
            new = output.summary.new_count,
            changed = output.summary.changed_count,
            offline = output.summary.offline_count,
            findings = output.findings.len(),
            duration_ms,
            "Scan complete"
        );

        Ok(ScanReport {
            scan: completed,
            summary: output.summary,
            persisted: output.persisted,
            findings: output.findings,
            duration_ms,
            journal_entry: entry.map(|e| e.id),
        })
    }

    /// `begin` + `execute`.
    pub async fn run(&self, org: &OrgId, request: &ScanRequest) -> Result<ScanReport> {
        let scan = self.begin(org, request).await?;
        self.execute(scan).await
    }

    async fn stages(
        &self,
        scan: &SecurityScan,
        session: &mut JournalSession,
    ) -> Result<StageOutput> {
        let org = &scan.organization_id;
        let profile: ScanProfile = scan.profile.parse()?;

        let output = self.scanner.scan(&scan.target, profile).await?;
        let devices = diff::build_devices(org, &output.hosts, Utc::now());
        let diff =
            diff::compute_diff(self.store.as_ref(), org, devices, &scan.target, output.ports_scanned)
                .await?;
        let persisted =
            persist::persist_diff(self.store.as_ref(), org, &diff, self.stale_threshold_hours)
                .await?;
        journal::record_diff(
            session,
            &diff.summary,
            &persisted,
            output.duration.as_millis() as u64,
        );

        for device in &diff.new_devices {
            self.publish(
                scan,
                EventPayload::DeviceDiscovered {
                    device_id: device.id,
                    ip_address: device.ip_address.to_string(),
                    device_type: device.device_type,
                },
            );
        }
        for device in &diff.offline_devices {
            self.publish(
                scan,
                EventPayload::DeviceOffline {
                    device_id: device.id,
                    ip_address: device.ip_address.to_string(),
                },
            );
        }

        let findings = match scan.scan_type {
            ScanType::Network => Vec::new(),
            ScanType::Security => {
                let seen: Vec<_> = diff.seen().cloned().collect();
                let findings = self.aggregator.aggregate(org, &scan.id, &seen);
                self.store.insert_findings(org, &findings).await?;

                let risk = risk_by_device(&findings, &self.risk);
                for device in &seen {
                    let score = risk.get(&device.id).copied().unwrap_or(0.0);
                    self.store.set_device_risk(org, &device.id, score).await?;
                }

                journal::record_findings(session, &findings);
                for finding in findings.iter().filter(|f| f.severity.is_urgent()) {
                    self.publish(
                        scan,
                        EventPayload::FindingRaised {
                            finding_id: finding.id,
                            device_id: finding.device_id,
                            severity: finding.severity,
                            title: finding.title.clone(),
                            cve_id: finding.cve_id.clone(),
                        },
                    );
                }
                findings
            }
        };

        Ok(StageOutput {
            summary: diff.summary,
            persisted,
            findings,
        })
    }

    /// Mark the scan failed, record the failure, and hand the error back.
    async fn fail(
        &self,
        mut scan: SecurityScan,
        mut session: JournalSession,
        error: DiscoverError,
    ) -> DiscoverError {
        let message = error.to_string();
        tracing::error!(scan_id = %scan.id, org = %scan.organization_id, error = %message, "Scan failed");

        match scan.fail(&message) {
            Ok(()) => {
                if let Err(e) = self.store.update_scan(&scan).await {
                    tracing::error!(scan_id = %scan.id, error = %e, "Failed to mark scan failed");
                }
            }
            Err(e) => {
                tracing::error!(scan_id = %scan.id, error = %e, "Scan cannot move to failed");
            }
        }

        self.publish(
            &scan,
            EventPayload::ScanFailed {
                scan_id: scan.id,
                error: message.clone(),
            },
        );

        journal::record_error(&mut session, &message);
        journal::finalize_and_store(self.journal.clone(), session).await;

        error
    }

    fn publish(&self, scan: &SecurityScan, payload: EventPayload) {
        self.events.publish(&NetguardEvent::new(
            scan.organization_id,
            EventSource::Discover,
            payload,
        ));
    }
}

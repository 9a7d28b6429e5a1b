//! Per-organization scoring runs.
//!
//! A run trains a forest on the organization's telemetry history, scores
//! each device's most recent sample, and records an anomaly for every
//! device above the threshold that has no active anomaly of the same type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use netguard_core::events::{EventPayload, EventSink, EventSource, NetguardEvent};
use netguard_core::{Anomaly, AnomalyId, AnomalyStatus, DeviceId, OrgId, Severity, TelemetrySample};
use netguard_journal::{JournalSession, JournalStore};
use netguard_store::Store;

use crate::config::AnomalyConfig;
use crate::error::Result;
use crate::features::{self, Explanation, FeatureStats};
use crate::forest::IsolationForest;

pub const COMPONENT: &str = "netguard-anomaly";

/// Result of one scoring run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScoringReport {
    /// Not enough history to train on.
    Skipped {
        organization_id: OrgId,
        samples: usize,
        required: usize,
    },
    Scored {
        organization_id: OrgId,
        samples: usize,
        devices_scored: usize,
        /// Above threshold but already covered by an active anomaly.
        suppressed: usize,
        anomalies: Vec<Anomaly>,
    },
}

impl ScoringReport {
    pub fn organization_id(&self) -> OrgId {
        match self {
            Self::Skipped {
                organization_id, ..
            }
            | Self::Scored {
                organization_id, ..
            } => *organization_id,
        }
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        match self {
            Self::Skipped { .. } => &[],
            Self::Scored { anomalies, .. } => anomalies,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Severity band for an isolation score.
pub fn severity_for_score(score: f64) -> Severity {
    if score >= 0.80 {
        Severity::Critical
    } else if score >= 0.72 {
        Severity::High
    } else if score >= 0.66 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub struct AnomalyEngine {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    journal: Option<Arc<dyn JournalStore>>,
    config: AnomalyConfig,
}

impl AnomalyEngine {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            journal: None,
            config: AnomalyConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnomalyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn JournalStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    pub async fn score_organization(&self, org: &OrgId) -> Result<ScoringReport> {
        let since = Utc::now() - chrono::Duration::days(self.config.history_days);
        let samples = self.store.telemetry_since(org, since).await?;

        let mut session = JournalSession::new(*org, COMPONENT, "Score device telemetry");
        session.set_context(serde_json::json!({
            "history_days": self.config.history_days,
            "samples": samples.len(),
            "threshold": self.config.threshold,
            "n_trees": self.config.n_trees,
            "sample_size": self.config.sample_size,
        }));

        if samples.len() < self.config.min_training_samples {
            tracing::info!(
                org = %org,
                samples = samples.len(),
                required = self.config.min_training_samples,
                "Not enough telemetry to train, skipping"
            );
            session.add_decision(
                "Skip scoring",
                &format!(
                    "{} samples, {} required",
                    samples.len(),
                    self.config.min_training_samples
                ),
                1.0,
            );
            self.store_journal(session).await;
            return Ok(ScoringReport::Skipped {
                organization_id: *org,
                samples: samples.len(),
                required: self.config.min_training_samples,
            });
        }

        let result = self.score_samples(org, &samples, &mut session).await;
        match &result {
            Ok(ScoringReport::Scored {
                devices_scored,
                suppressed,
                anomalies,
                ..
            }) => {
                session.add_step(
                    "anomaly_scoring",
                    &format!(
                        "Scored {devices_scored} devices, raised {} anomalies",
                        anomalies.len()
                    ),
                    serde_json::json!({
                        "devices_scored": devices_scored,
                        "anomalies": anomalies.len(),
                        "suppressed": suppressed,
                    }),
                    true,
                );
            }
            Ok(ScoringReport::Skipped { .. }) => {}
            Err(e) => {
                tracing::error!(org = %org, error = %e, "Anomaly scoring failed");
                session.add_step(
                    "scoring_failed",
                    &format!("Scoring failed: {e}"),
                    serde_json::json!({ "error": e.to_string() }),
                    false,
                );
            }
        }
        self.store_journal(session).await;
        result
    }

    async fn score_samples(
        &self,
        org: &OrgId,
        samples: &[TelemetrySample],
        session: &mut JournalSession,
    ) -> Result<ScoringReport> {
        let rows: Vec<Vec<f64>> = samples.iter().map(features::extract).collect();
        let seed = self.config.seed.unwrap_or_else(|| seed_for(org));
        let forest = IsolationForest::fit(&rows, self.config.forest_params(), seed)?;
        let stats = FeatureStats::fit(&rows);

        session.add_decision(
            &format!(
                "Train {} trees on {} samples, {} per tree",
                forest.n_trees(),
                rows.len(),
                forest.sample_size()
            ),
            "All telemetry inside the history window",
            1.0,
        );

        // Samples arrive oldest first, so the last write per device wins.
        let mut latest: HashMap<DeviceId, usize> = HashMap::new();
        for (i, sample) in samples.iter().enumerate() {
            latest.insert(sample.device_id, i);
        }
        let mut devices: Vec<(DeviceId, usize)> = latest.into_iter().collect();
        devices.sort();

        let mut anomalies = Vec::new();
        let mut suppressed = 0;
        for (device_id, i) in &devices {
            let score = forest.score(&rows[*i])?;
            if score < self.config.threshold {
                continue;
            }

            let explanation = features::explain(&rows[*i], &stats);
            if self
                .store
                .has_open_anomaly(org, device_id, explanation.anomaly_type)
                .await?
            {
                tracing::debug!(
                    org = %org,
                    device_id = %device_id,
                    anomaly_type = %explanation.anomaly_type,
                    score,
                    "Active anomaly already open, suppressing"
                );
                suppressed += 1;
                continue;
            }

            let anomaly = build_anomaly(org, device_id, score, &explanation);
            self.store.insert_anomaly(&anomaly).await?;
            self.publish(&anomaly);

            tracing::info!(
                org = %org,
                device_id = %device_id,
                anomaly_id = %anomaly.id,
                anomaly_type = %anomaly.anomaly_type,
                severity = %anomaly.severity,
                score,
                "Anomaly detected"
            );
            anomalies.push(anomaly);
        }

        Ok(ScoringReport::Scored {
            organization_id: *org,
            samples: samples.len(),
            devices_scored: devices.len(),
            suppressed,
            anomalies,
        })
    }

    /// Score every organization that has telemetry. One organization
    /// failing does not stop the others.
    pub async fn score_all(&self) -> Result<Vec<ScoringReport>> {
        let orgs = self.store.organizations_with_telemetry().await?;
        let mut reports = Vec::with_capacity(orgs.len());
        for org in orgs {
            match self.score_organization(&org).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(org = %org, error = %e, "Skipping organization"),
            }
        }
        Ok(reports)
    }

    /// Score one organization when `tenant` is set, otherwise every
    /// organization with telemetry.
    pub async fn score_scope(&self, tenant: Option<&OrgId>) -> Result<Vec<ScoringReport>> {
        match tenant {
            Some(org) => Ok(vec![self.score_organization(org).await?]),
            None => self.score_all().await,
        }
    }

    /// Repeat [`score_scope`](Self::score_scope) every `interval_secs`.
    pub async fn run_daemon(&self, tenant: Option<OrgId>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        tracing::info!(
            interval_secs = self.config.interval_secs,
            tenant = ?tenant,
            "Anomaly scoring daemon started"
        );

        loop {
            ticker.tick().await;
            match self.score_scope(tenant.as_ref()).await {
                Ok(reports) => {
                    let raised: usize = reports.iter().map(|r| r.anomalies().len()).sum();
                    tracing::info!(
                        organizations = reports.len(),
                        anomalies = raised,
                        "Scoring cycle complete"
                    );
                }
                Err(e) => tracing::error!(error = %e, "Scoring cycle failed"),
            }
        }
    }

    fn publish(&self, anomaly: &Anomaly) {
        self.events.publish(&NetguardEvent::new(
            anomaly.organization_id,
            EventSource::Anomaly,
            EventPayload::AnomalyDetected {
                anomaly_id: anomaly.id,
                device_id: anomaly.device_id,
                anomaly_type: anomaly.anomaly_type,
                severity: anomaly.severity,
                score: anomaly.score,
            },
        ));
    }

    async fn store_journal(&self, session: JournalSession) {
        let Some(journal) = self.journal.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || journal.append(session)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to store journal entry"),
            Err(e) => tracing::error!(error = %e, "Journal append task aborted"),
        }
    }
}

fn build_anomaly(org: &OrgId, device_id: &DeviceId, score: f64, explanation: &Explanation) -> Anomaly {
    let description = match explanation.feature {
        Some(feature) => format!(
            "Isolation score {score:.3}; {feature} deviates {:.1} standard deviations from the fleet",
            explanation.z_score
        ),
        None => format!("Isolation score {score:.3}; no single feature dominates"),
    };

    Anomaly {
        id: AnomalyId::new(),
        organization_id: *org,
        device_id: Some(*device_id),
        anomaly_type: explanation.anomaly_type,
        severity: severity_for_score(score),
        score,
        description,
        status: AnomalyStatus::Open,
        detected_at: Utc::now(),
    }
}

/// Stable per-organization seed so repeated runs over the same history agree.
fn seed_for(org: &OrgId) -> u64 {
    let (high, low) = org.0.as_u64_pair();
    high ^ low
}

//! Journal session helpers for scan runs.

use std::sync::Arc;

use netguard_core::{SecurityFinding, SecurityScan, Severity};
use netguard_journal::{JournalEntry, JournalSession, JournalStore};

use crate::diff::DiffSummary;
use crate::persist::PersistOutcome;

pub const COMPONENT: &str = "netguard-discover";

/// Open a journal session for a scan run.
pub fn start_scan_session(scan: &SecurityScan, scanner: &str) -> JournalSession {
    let mut session = JournalSession::new(
        scan.organization_id,
        COMPONENT,
        &format!("{} scan of {}", scan.scan_type, scan.target),
    );

    session.set_context(serde_json::json!({
        "scan_id": scan.id,
        "scan_type": scan.scan_type,
        "target": scan.target,
        "profile": scan.profile,
        "scanner": scanner,
    }));

    session.add_decision(
        &format!("Use {} scan profile with the {scanner} scanner", scan.profile),
        "Requested profile for this target",
        1.0,
    );

    session
}

pub fn record_diff(
    session: &mut JournalSession,
    summary: &DiffSummary,
    persisted: &PersistOutcome,
    duration_ms: u64,
) {
    session.add_step(
        "network_scan",
        &format!(
            "Scanned {} devices: {} new, {} changed, {} offline",
            summary.total_scanned, summary.new_count, summary.changed_count, summary.offline_count
        ),
        serde_json::json!({
            "total_scanned": summary.total_scanned,
            "new_count": summary.new_count,
            "changed_count": summary.changed_count,
            "offline_count": summary.offline_count,
            "marked_stale": persisted.marked_stale,
            "telemetry_recorded": persisted.telemetry_recorded,
            "duration_ms": duration_ms,
        }),
        true,
    );
}

pub fn record_findings(session: &mut JournalSession, findings: &[SecurityFinding]) {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    session.add_step(
        "finding_aggregation",
        &format!("Raised {} findings", findings.len()),
        serde_json::json!({
            "critical": count(Severity::Critical),
            "high": count(Severity::High),
            "medium": count(Severity::Medium),
            "low": count(Severity::Low),
            "info": count(Severity::Info),
        }),
        true,
    );
}

pub fn record_error(session: &mut JournalSession, error: &str) {
    session.add_step(
        "scan_failed",
        &format!("Scan failed: {error}"),
        serde_json::json!({ "error": error }),
        false,
    );
}

/// Seal and store the session on the blocking pool, since appends do file
/// I/O under a lock. Journal failures are logged, never fatal.
pub async fn finalize_and_store(
    store: Option<Arc<dyn JournalStore>>,
    session: JournalSession,
) -> Option<JournalEntry> {
    let store = store?;
    let appended = tokio::task::spawn_blocking(move || store.append(session)).await;
    match appended {
        Ok(Ok(entry)) => {
            tracing::info!(
                entry_id = %entry.id,
                org = %entry.organization_id,
                "Journal entry recorded for scan run"
            );
            Some(entry)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Failed to store journal entry");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Journal append task aborted");
            None
        }
    }
}

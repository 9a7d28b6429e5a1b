//! Builder for recording a run incrementally.
//!
//! ```no_run
//! # use netguard_journal::session::JournalSession;
//! # use netguard_core::OrgId;
//! let mut session = JournalSession::new(
//!     OrgId::new(),
//!     "netguard-discover",
//!     "Security scan of 10.0.1.0/24",
//! );
//! session.set_context(serde_json::json!({"target": "10.0.1.0/24"}));
//! session.add_decision("Use nmap standard profile", "Configured for this subnet", 1.0);
//! session.add_step("network_scan", "Scanned 254 addresses", serde_json::json!({"hosts": 12}), true);
//! let entry = session.finalize(None);
//! assert!(entry.content_hash.is_some());
//! ```

use chrono::Utc;

use netguard_core::OrgId;

use crate::{Decision, EntryId, JournalEntry, Step};

pub struct JournalSession {
    entry: JournalEntry,
}

impl JournalSession {
    pub fn new(organization_id: OrgId, component: &str, intent: &str) -> Self {
        Self {
            entry: JournalEntry {
                id: EntryId::new(),
                organization_id,
                component: component.to_string(),
                intent: intent.to_string(),
                context: serde_json::Value::Null,
                decisions: Vec::new(),
                steps: Vec::new(),
                started_at: Utc::now(),
                completed_at: None,
                previous_hash: None,
                content_hash: None,
            },
        }
    }

    pub fn set_context(&mut self, context: serde_json::Value) {
        self.entry.context = context;
    }

    pub fn add_decision(&mut self, choice: &str, rationale: &str, confidence: f64) {
        self.entry.decisions.push(Decision {
            choice: choice.to_string(),
            rationale: rationale.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        });
    }

    pub fn add_step(
        &mut self,
        kind: &str,
        description: &str,
        details: serde_json::Value,
        success: bool,
    ) {
        self.entry.steps.push(Step {
            kind: kind.to_string(),
            description: description.to_string(),
            details,
            success,
            timestamp: Utc::now(),
        });
    }

    pub fn id(&self) -> EntryId {
        self.entry.id
    }

    pub fn organization_id(&self) -> OrgId {
        self.entry.organization_id
    }

    /// Close the session, link it after `previous_hash`, and seal it.
    pub fn finalize(mut self, previous_hash: Option<String>) -> JournalEntry {
        self.entry.completed_at = Some(Utc::now());
        self.entry.previous_hash = previous_hash;
        let hash = self.entry.compute_hash();
        self.entry.content_hash = Some(hash);
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_seals_the_entry() {
        let mut session = JournalSession::new(OrgId::new(), "netguard-anomaly", "Score devices");
        session.add_decision("Isolation forest", "Unsupervised", 1.7);
        session.add_step("score", "Scored 40 devices", serde_json::json!({"scored": 40}), true);

        let entry = session.finalize(Some("ab".repeat(32)));
        assert!(entry.completed_at.is_some());
        assert!(entry.verify_integrity());
        assert!(entry.succeeded());
        assert_eq!(entry.decisions[0].confidence, 1.0);
        assert_eq!(entry.previous_hash.as_deref(), Some("ab".repeat(32).as_str()));
    }

    #[test]
    fn failed_step_marks_entry_unsuccessful() {
        let mut session = JournalSession::new(OrgId::new(), "netguard-discover", "Scan");
        session.add_step("network_scan", "nmap failed", serde_json::json!({}), false);
        assert!(!session.finalize(None).succeeded());
    }
}

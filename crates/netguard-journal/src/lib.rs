//! NetGuard Journal: tamper-evident run records.
//!
//! Every scan pipeline run and anomaly scoring pass records a journal entry:
//! what was asked for, the context it ran in, the decisions taken, and each
//! step with its outcome. Entries are content-hashed with BLAKE3 and chained
//! per organization through `previous_hash`, so deleting or editing any entry
//! breaks the chain.

pub mod error;
pub mod hash;
pub mod session;
pub mod store;

pub use error::{JournalError, Result};
pub use session::JournalSession;
pub use store::{ChainReport, FileJournalStore, JournalQuery, JournalStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use netguard_core::OrgId;

/// Unique identifier for a journal entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A choice made while running, e.g. which scanner or profile was used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub choice: String,
    pub rationale: String,
    /// 0.0 – 1.0.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// One unit of work and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// e.g. "network_scan", "persist", "aggregate_findings", "score".
    pub kind: String,
    pub description: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// The complete record of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: EntryId,
    pub organization_id: OrgId,
    /// Which component produced the entry ("netguard-discover", ...).
    pub component: String,
    pub intent: String,
    pub context: serde_json::Value,
    pub decisions: Vec<Decision>,
    pub steps: Vec<Step>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Hash of the organization's previous entry; `None` for the first one.
    pub previous_hash: Option<String>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl JournalEntry {
    /// BLAKE3 hash over every field except `content_hash`.
    pub fn compute_hash(&self) -> String {
        hash::compute_entry_hash(self)
    }

    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    /// Whether every recorded step succeeded.
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

//! BLAKE3 content hashing for journal entries.
//!
//! The hash covers `previous_hash`, which is what links an entry to its
//! predecessor: rewriting an older entry changes its hash and orphans every
//! entry after it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use netguard_core::OrgId;

use crate::{Decision, EntryId, JournalEntry, Step};

/// Hashable view of an entry (everything but `content_hash`).
#[derive(Serialize)]
struct HashableEntry<'a> {
    id: &'a EntryId,
    organization_id: &'a OrgId,
    component: &'a str,
    intent: &'a str,
    context: &'a serde_json::Value,
    decisions: &'a [Decision],
    steps: &'a [Step],
    started_at: &'a DateTime<Utc>,
    completed_at: &'a Option<DateTime<Utc>>,
    previous_hash: &'a Option<String>,
}

/// Hex-encoded BLAKE3 hash of an entry's canonical JSON.
pub fn compute_entry_hash(entry: &JournalEntry) -> String {
    let hashable = HashableEntry {
        id: &entry.id,
        organization_id: &entry.organization_id,
        component: &entry.component,
        intent: &entry.intent,
        context: &entry.context,
        decisions: &entry.decisions,
        steps: &entry.steps,
        started_at: &entry.started_at,
        completed_at: &entry.completed_at,
        previous_hash: &entry.previous_hash,
    };

    // Serializing these types cannot fail (no non-string map keys).
    let json = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use crate::session::JournalSession;
    use netguard_core::OrgId;

    #[test]
    fn hash_is_stable_and_sensitive_to_links() {
        let session = JournalSession::new(OrgId::new(), "netguard-discover", "Scan 10.0.0.0/24");
        let entry = session.finalize(None);
        assert_eq!(entry.compute_hash(), entry.compute_hash());
        assert_eq!(entry.compute_hash().len(), 64);

        let mut relinked = entry.clone();
        relinked.previous_hash = Some("00".repeat(32));
        assert_ne!(relinked.compute_hash(), entry.compute_hash());
    }
}

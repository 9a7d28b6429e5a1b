use netguard_core::OrgId;

use crate::EntryId;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Journal entry not found: {0}")]
    NotFound(EntryId),

    #[error("Integrity check failed for entry {0}: stored hash does not match content")]
    IntegrityViolation(EntryId),

    #[error("Journal chain for organization {organization_id} is broken: {detail}")]
    BrokenChain {
        organization_id: OrgId,
        detail: String,
    },

    #[error("Journal entry has no content hash (not finalized)")]
    NotFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JournalError>;

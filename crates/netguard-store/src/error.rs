//! Errors from persistence operations.

use netguard_core::{NetguardError, OrgId, ScanId, ScanStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found in organization {organization_id}")]
    NotFound {
        entity: &'static str,
        id: String,
        organization_id: OrgId,
    },

    #[error("Scan {scan_id} does not exist in organization {organization_id}")]
    ScanNotFound {
        scan_id: ScanId,
        organization_id: OrgId,
    },

    #[error("Scan {scan_id} cannot move from {from} to {to}")]
    InvalidTransition {
        scan_id: ScanId,
        from: ScanStatus,
        to: ScanStatus,
    },

    #[error("Row belongs to organization {found}, expected {expected}")]
    TenantMismatch { expected: OrgId, found: OrgId },

    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString, org: &OrgId) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
            organization_id: *org,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ScanNotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<NetguardError> for StoreError {
    fn from(e: NetguardError) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

//! Error types for the netguard-anomaly crate.

use netguard_core::NetguardError;
use netguard_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error("Invalid training data: {0}")]
    InvalidData(String),

    #[error("Invalid forest parameters: {0}")]
    InvalidParams(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] NetguardError),
}

pub type Result<T> = std::result::Result<T, AnomalyError>;

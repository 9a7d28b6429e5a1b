use thiserror::Error;

use crate::types::ScanStatus;

/// Top-level error type for the NetGuard platform.
#[derive(Error, Debug)]
pub enum NetguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid scan transition: {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for NetguardError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

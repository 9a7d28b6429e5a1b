//! Error types for the netguard-vuln crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VulnError {
    #[error("Failed to read vulnerability catalog {path}: {source}")]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse vulnerability catalog {path}: {message}")]
    CatalogParse { path: String, message: String },

    #[error("Invalid signature {cve_id}: {reason}")]
    InvalidSignature { cve_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, VulnError>;

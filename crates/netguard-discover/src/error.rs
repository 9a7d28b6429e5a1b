//! Error types for the netguard-discover crate.

use netguard_core::NetguardError;
use netguard_store::StoreError;
use netguard_vuln::VulnError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Target {target} covers {hosts} hosts, limit is {max}")]
    TargetTooLarge {
        target: String,
        hosts: u128,
        max: usize,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vulnerability catalog error: {0}")]
    Vuln(#[from] VulnError),

    #[error(transparent)]
    Core(#[from] NetguardError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;

//! netguard-discover: Device discovery and port/service scanning.
//!
//! Runs nmap (or a native TCP connect scanner) against subnets, classifies
//! what it finds, diffs it against the store, raises findings for security
//! scans, and records a journal entry for every scan run.

pub mod classify;
pub mod config;
pub mod diff;
pub mod error;
pub mod journal;
pub mod nmap_xml;
pub mod persist;
pub mod pipeline;
pub mod probe;
pub mod scanner;
pub mod scheduler;
pub mod vendor;

pub use config::{DiscoverConfig, ScanProfile, ScannerKind};
pub use error::{DiscoverError, Result};
pub use pipeline::{ScanPipeline, ScanReport, ScanRequest};
pub use scanner::{HostScanner, ObservedHost, ScanOutput};

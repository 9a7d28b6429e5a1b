//! netguard-anomaly: Isolation Forest scoring of per-device telemetry.
//!
//! Pipeline: telemetry history → feature vectors → forest → per-device
//! score → explanation → deduplicated anomalies and `AnomalyDetected`
//! events.

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod forest;

pub use config::AnomalyConfig;
pub use engine::{severity_for_score, AnomalyEngine, ScoringReport};
pub use error::{AnomalyError, Result};
pub use forest::{ForestParams, IsolationForest};

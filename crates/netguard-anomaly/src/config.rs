//! `[anomaly]` configuration section.

use serde::Deserialize;

use crate::forest::ForestParams;

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    /// Tenant scored by `--once` when no `--tenant-id` is given. Empty
    /// means every organization with telemetry.
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Minimum score that raises an anomaly.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_history_days")]
    pub history_days: i64,

    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Daemon scoring interval.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Fixed forest seed. Unset derives a stable seed from the organization.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
}

fn default_n_trees() -> usize {
    100
}

fn default_sample_size() -> usize {
    256
}

fn default_threshold() -> f64 {
    0.62
}

fn default_history_days() -> i64 {
    30
}

fn default_min_training_samples() -> usize {
    32
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_journal_dir() -> String {
    "./journal".to_string()
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            n_trees: default_n_trees(),
            sample_size: default_sample_size(),
            threshold: default_threshold(),
            history_days: default_history_days(),
            min_training_samples: default_min_training_samples(),
            interval_secs: default_interval_secs(),
            seed: None,
            journal_dir: default_journal_dir(),
        }
    }
}

impl AnomalyConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            sample_size: self.sample_size,
        }
    }
}

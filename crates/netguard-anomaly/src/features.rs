//! Feature extraction and per-feature explanation.

use netguard_core::{AnomalyType, TelemetrySample};
use serde::Serialize;

pub const FEATURE_COUNT: usize = 7;

/// Column order of every feature vector.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "open_port_count",
    "service_count",
    "port_churn",
    "risky_port_count",
    "log_bytes_in",
    "log_bytes_out",
    "log_connections",
];

/// A deviation below this many standard deviations is not attributed to a
/// single feature.
const MIN_DOMINANT_Z: f64 = 1.0;

const MIN_STD_DEV: f64 = 1e-9;

/// Map one telemetry sample to its feature vector.
pub fn extract(sample: &TelemetrySample) -> Vec<f64> {
    vec![
        f64::from(sample.open_port_count),
        f64::from(sample.service_count),
        f64::from(sample.new_ports) + f64::from(sample.closed_ports),
        f64::from(sample.risky_port_count),
        (sample.bytes_in as f64).ln_1p(),
        (sample.bytes_out as f64).ln_1p(),
        (sample.connection_count as f64).ln_1p(),
    ]
}

/// Anomaly type reported when `feature` dominates the deviation.
pub fn anomaly_type_for(feature: usize) -> AnomalyType {
    match feature {
        0 | 1 => AnomalyType::UnusualPorts,
        2 => AnomalyType::ServiceChange,
        3 => AnomalyType::RiskyExposure,
        4 | 5 => AnomalyType::TrafficSpike,
        6 => AnomalyType::ConnectionBurst,
        _ => AnomalyType::BehaviorOutlier,
    }
}

/// Column means and population standard deviations of the training set.
#[derive(Debug, Clone)]
pub struct FeatureStats {
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

impl FeatureStats {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; dims];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut std_dev = vec![0.0; dims];
        for row in rows {
            for ((s, x), m) in std_dev.iter_mut().zip(row).zip(&mean) {
                *s += (x - m).powi(2);
            }
        }
        for s in &mut std_dev {
            *s = (*s / n).sqrt();
        }

        Self { mean, std_dev }
    }

    /// Signed z-score of each feature. Constant features contribute zero.
    pub fn z_scores(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.mean)
            .zip(&self.std_dev)
            .map(|((x, m), s)| if *s < MIN_STD_DEV { 0.0 } else { (x - m) / s })
            .collect()
    }
}

/// Which feature drove a score, if any did.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub anomaly_type: AnomalyType,
    pub feature: Option<&'static str>,
    pub z_score: f64,
}

pub fn explain(x: &[f64], stats: &FeatureStats) -> Explanation {
    let dominant = stats
        .z_scores(x)
        .into_iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (i, z)| match best {
            Some((_, b)) if b.abs() >= z.abs() => best,
            _ => Some((i, z)),
        });

    match dominant {
        Some((i, z)) if z.abs() >= MIN_DOMINANT_Z => Explanation {
            anomaly_type: anomaly_type_for(i),
            feature: FEATURE_NAMES.get(i).copied(),
            z_score: z,
        },
        _ => Explanation {
            anomaly_type: AnomalyType::BehaviorOutlier,
            feature: None,
            z_score: dominant.map(|(_, z)| z).unwrap_or(0.0),
        },
    }
}

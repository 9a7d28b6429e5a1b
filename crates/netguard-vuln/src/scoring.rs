//! Device risk scoring.
//!
//! Formula: `risk = max + weight × Σ score_i × decay^i` over the remaining
//! findings in descending score order, capped at 10 (CVSS scale).

use std::collections::HashMap;

use netguard_core::{DeviceId, SecurityFinding};

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Per-rank decay of the tail contribution (default 0.5).
    pub decay_factor: f64,
    /// Scale applied to the tail sum (default 0.1).
    pub tail_weight: f64,
    /// Score ceiling (default 10.0).
    pub max_score: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.5,
            tail_weight: 0.1,
            max_score: 10.0,
        }
    }
}

/// Aggregate risk of one device's findings, in `[0.0, 10.0]`.
pub fn device_risk_score(findings: &[SecurityFinding], config: &RiskConfig) -> f64 {
    let mut scores: Vec<f64> = findings.iter().map(|f| f.effective_score()).collect();
    scores.sort_by(|a, b| b.total_cmp(a));

    let Some((&top, rest)) = scores.split_first() else {
        return 0.0;
    };

    let tail: f64 = rest
        .iter()
        .enumerate()
        .map(|(i, score)| score * config.decay_factor.powi(i as i32 + 1))
        .sum();

    (top + config.tail_weight * tail).clamp(0.0, config.max_score)
}

/// Risk score for every device that has at least one finding.
pub fn risk_by_device(findings: &[SecurityFinding], config: &RiskConfig) -> HashMap<DeviceId, f64> {
    let mut grouped: HashMap<DeviceId, Vec<SecurityFinding>> = HashMap::new();
    for finding in findings {
        grouped
            .entry(finding.device_id)
            .or_default()
            .push(finding.clone());
    }
    grouped
        .into_iter()
        .map(|(device, list)| (device, device_risk_score(&list, config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netguard_core::{FindingId, FindingStatus, OrgId, ScanId, Severity};

    fn finding(device: DeviceId, severity: Severity, cvss: Option<f64>) -> SecurityFinding {
        SecurityFinding {
            id: FindingId::new(),
            organization_id: OrgId::new(),
            scan_id: ScanId::new(),
            device_id: device,
            severity,
            title: String::new(),
            description: String::new(),
            cve_id: None,
            cvss_score: cvss,
            port: None,
            status: FindingStatus::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_findings_no_risk() {
        assert_eq!(device_risk_score(&[], &RiskConfig::default()), 0.0);
    }

    #[test]
    fn single_finding_is_its_score() {
        let d = DeviceId::new();
        let score = device_risk_score(&[finding(d, Severity::High, Some(7.5))], &RiskConfig::default());
        assert!((score - 7.5).abs() < 1e-9);
    }

    #[test]
    fn tail_decays() {
        let d = DeviceId::new();
        let findings = vec![
            finding(d, Severity::Medium, Some(5.0)),
            finding(d, Severity::High, Some(8.0)),
            finding(d, Severity::Low, None), // nominal 2.5
        ];
        // 8.0 + 0.1 × (5.0 × 0.5 + 2.5 × 0.25)
        let expected = 8.0 + 0.1 * (2.5 + 0.625);
        let score = device_risk_score(&findings, &RiskConfig::default());
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn score_is_capped() {
        let d = DeviceId::new();
        let findings: Vec<_> = (0..20)
            .map(|_| finding(d, Severity::Critical, Some(9.8)))
            .collect();
        assert_eq!(device_risk_score(&findings, &RiskConfig::default()), 10.0);
    }

    #[test]
    fn grouped_per_device() {
        let a = DeviceId::new();
        let b = DeviceId::new();
        let findings = vec![
            finding(a, Severity::High, Some(7.0)),
            finding(b, Severity::Low, Some(3.0)),
        ];
        let risk = risk_by_device(&findings, &RiskConfig::default());
        assert_eq!(risk.len(), 2);
        assert!((risk[&a] - 7.0).abs() < 1e-9);
        assert!((risk[&b] - 3.0).abs() < 1e-9);
    }
}

//! netguard-vuln: Security finding aggregation.
//!
//! Turns the open ports and service fingerprints of scanned devices into
//! security findings: CVE matches from the signature catalog plus exposure
//! rules for risky services. Also computes the per-device risk score.

pub mod catalog;
pub mod error;
pub mod exposure;
pub mod scoring;
pub mod version;

pub use catalog::{VulnCatalog, VulnSignature};
pub use error::{Result, VulnError};
pub use scoring::{device_risk_score, risk_by_device, RiskConfig};
pub use version::VersionRule;

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::Utc;
use serde::Deserialize;

use netguard_core::{
    FindingId, FindingStatus, NetworkDevice, OrgId, ScanId, SecurityFinding, Severity,
};

/// `[vuln]` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VulnConfig {
    /// JSON feed export merged over the built-in catalog.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

/// Produces findings for a set of scanned devices.
pub struct FindingAggregator {
    catalog: VulnCatalog,
}

impl FindingAggregator {
    pub fn new(catalog: VulnCatalog) -> Self {
        Self { catalog }
    }

    /// Built-in catalog plus the configured feed file, if any.
    pub fn from_config(config: &VulnConfig) -> Result<Self> {
        let mut catalog = VulnCatalog::builtin();
        if let Some(path) = &config.catalog_path {
            catalog.load_json(path)?;
        }
        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &VulnCatalog {
        &self.catalog
    }

    /// One finding per (device, port, signature or rule), ordered by
    /// severity descending, then device IP, then port.
    ///
    /// Devices that belong to another organization are skipped.
    pub fn aggregate(
        &self,
        org: &OrgId,
        scan_id: &ScanId,
        devices: &[NetworkDevice],
    ) -> Vec<SecurityFinding> {
        let now = Utc::now();
        let mut seen: HashSet<(IpAddr, u16, String)> = HashSet::new();
        let mut ranked: Vec<(IpAddr, SecurityFinding)> = Vec::new();

        for device in devices {
            if &device.organization_id != org {
                tracing::warn!(
                    org = %org,
                    device_org = %device.organization_id,
                    ip = %device.ip_address,
                    "Skipping device from another organization"
                );
                continue;
            }

            for port in &device.open_ports {
                for signature in self.catalog.matching(port) {
                    if !seen.insert((device.ip_address, port.port, signature.cve_id.clone())) {
                        continue;
                    }
                    let fingerprint = match (&port.product, &port.version) {
                        (Some(p), Some(v)) => format!(" in {p} {v}"),
                        (Some(p), None) => format!(" in {p}"),
                        _ => String::new(),
                    };
                    ranked.push((
                        device.ip_address,
                        SecurityFinding {
                            id: FindingId::new(),
                            organization_id: *org,
                            scan_id: *scan_id,
                            device_id: device.id,
                            severity: Severity::from_cvss(signature.cvss_score),
                            title: format!(
                                "{}{fingerprint} on port {}",
                                signature.cve_id, port.port
                            ),
                            description: signature.description.clone(),
                            cve_id: Some(signature.cve_id.clone()),
                            cvss_score: Some(signature.cvss_score),
                            port: Some(port.port),
                            status: FindingStatus::Open,
                            created_at: now,
                        },
                    ));
                }
            }

            for exposure in exposure::evaluate(device) {
                if !seen.insert((device.ip_address, exposure.port, exposure.rule_id.to_string())) {
                    continue;
                }
                ranked.push((
                    device.ip_address,
                    SecurityFinding {
                        id: FindingId::new(),
                        organization_id: *org,
                        scan_id: *scan_id,
                        device_id: device.id,
                        severity: exposure.severity,
                        title: exposure.title,
                        description: exposure.description.to_string(),
                        cve_id: None,
                        cvss_score: None,
                        port: Some(exposure.port),
                        status: FindingStatus::Open,
                        created_at: now,
                    },
                ));
            }
        }

        ranked.sort_by(|(ip_a, a), (ip_b, b)| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| ip_a.cmp(ip_b))
                .then_with(|| a.port.cmp(&b.port))
        });

        tracing::debug!(
            org = %org,
            scan_id = %scan_id,
            devices = devices.len(),
            findings = ranked.len(),
            "Aggregated findings"
        );

        ranked.into_iter().map(|(_, finding)| finding).collect()
    }
}

impl Default for FindingAggregator {
    fn default() -> Self {
        Self::new(VulnCatalog::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_core::OpenPort;

    fn org() -> OrgId {
        OrgId::parse("00000000-0000-4000-8000-000000000001").unwrap()
    }

    fn device(org: OrgId, ip: &str, ports: Vec<OpenPort>) -> NetworkDevice {
        let mut d = NetworkDevice::new(org, ip.parse().unwrap(), Utc::now());
        d.open_ports = ports;
        d
    }

    fn fingerprinted(port: u16, service: &str, product: &str, version: &str) -> OpenPort {
        OpenPort {
            service: Some(service.to_string()),
            product: Some(product.to_string()),
            version: Some(version.to_string()),
            ..OpenPort::tcp(port)
        }
    }

    #[test]
    fn cve_and_exposure_findings() {
        let aggregator = FindingAggregator::default();
        let scan = ScanId::new();
        let devices = vec![device(
            org(),
            "10.0.0.5",
            vec![
                fingerprinted(22, "ssh", "OpenSSH", "9.6p1"),
                fingerprinted(80, "http", "nginx", "1.18.0"),
            ],
        )];

        let findings = aggregator.aggregate(&org(), &scan, &devices);
        let ids: Vec<Option<&str>> = findings.iter().map(|f| f.cve_id.as_deref()).collect();
        // OpenSSH regreSSHion (8.1), nginx resolver (7.7), then HTTP-only (low).
        assert_eq!(ids, vec![Some("CVE-2024-6387"), Some("CVE-2021-23017"), None]);

        let ssh = &findings[0];
        assert_eq!(ssh.severity, Severity::High);
        assert_eq!(ssh.cvss_score, Some(8.1));
        assert_eq!(ssh.port, Some(22));
        assert_eq!(ssh.scan_id, scan);
        assert_eq!(ssh.status, FindingStatus::Open);
        assert!(ssh.title.contains("OpenSSH 9.6p1"));

        assert_eq!(findings[2].severity, Severity::Low);
        assert_eq!(findings[2].cvss_score, None);
    }

    #[test]
    fn ordered_by_severity_then_ip_then_port() {
        let aggregator = FindingAggregator::default();
        let devices = vec![
            device(org(), "10.0.0.9", vec![OpenPort::tcp(23), OpenPort::tcp(21)]),
            device(org(), "10.0.0.2", vec![OpenPort::tcp(5900), OpenPort::tcp(23)]),
        ];
        let findings = aggregator.aggregate(&org(), &ScanId::new(), &devices);
        let order: Vec<(String, Option<u16>)> = findings
            .iter()
            .map(|f| {
                let ip = devices
                    .iter()
                    .find(|d| d.id == f.device_id)
                    .map(|d| d.ip_address.to_string())
                    .unwrap_or_default();
                (ip, f.port)
            })
            .collect();

        assert_eq!(
            order,
            vec![
                ("10.0.0.2".to_string(), Some(23)),
                ("10.0.0.2".to_string(), Some(5900)),
                ("10.0.0.9".to_string(), Some(23)),
                ("10.0.0.9".to_string(), Some(21)),
            ]
        );
    }

    #[test]
    fn duplicate_ports_collapse() {
        let aggregator = FindingAggregator::default();
        let devices = vec![device(
            org(),
            "10.0.0.3",
            vec![OpenPort::tcp(3389), OpenPort::tcp(3389)],
        )];
        let findings = aggregator.aggregate(&org(), &ScanId::new(), &devices);
        // BlueKeep (port match) + RDP exposure, once each.
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].cve_id.as_deref(), Some("CVE-2019-0708"));
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn foreign_devices_are_skipped() {
        let aggregator = FindingAggregator::default();
        let other = OrgId::parse("00000000-0000-4000-8000-000000000002").unwrap();
        let devices = vec![device(other, "10.0.0.4", vec![OpenPort::tcp(23)])];
        assert!(aggregator.aggregate(&org(), &ScanId::new(), &devices).is_empty());
    }

    #[test]
    fn missing_catalog_file_is_an_error() {
        let config = VulnConfig {
            catalog_path: Some("/nonexistent/netguard-feed.json".to_string()),
        };
        assert!(matches!(
            FindingAggregator::from_config(&config),
            Err(VulnError::CatalogRead { .. })
        ));
    }
}

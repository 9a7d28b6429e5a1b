use chrono::Utc;
use netguard_core::{NetworkDevice, OpenPort, OrgId, ScanId, Severity};
use netguard_vuln::{FindingAggregator, VulnConfig, VulnError};

fn write_feed(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("feed.json");
    std::fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn feed_file_extends_and_overrides_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(
        &dir,
        r#"[
            {"cve_id": "CVE-2021-23017", "product": "nginx",
             "affected": {"rule": "below", "version": "1.26"},
             "cvss_score": 9.4, "description": "rescored for this deployment"},
            {"cve_id": "CVE-2099-4242", "service": "redis", "port": 6379,
             "cvss_score": 6.5, "description": "unauthenticated redis"}
        ]"#,
    );

    let aggregator = FindingAggregator::from_config(&VulnConfig {
        catalog_path: Some(path),
    })
    .unwrap();

    let org = OrgId::new();
    let mut device = NetworkDevice::new(org, "192.168.7.4".parse().unwrap(), Utc::now());
    device.open_ports = vec![
        OpenPort {
            service: Some("http".to_string()),
            product: Some("nginx".to_string()),
            version: Some("1.25.3".to_string()),
            ..OpenPort::tcp(443)
        },
        OpenPort::tcp(6379),
    ];

    let findings = aggregator.aggregate(&org, &ScanId::new(), &[device]);
    let nginx = findings
        .iter()
        .find(|f| f.cve_id.as_deref() == Some("CVE-2021-23017"))
        .expect("overridden signature should match 1.25.3");
    assert_eq!(nginx.severity, Severity::Critical);

    assert!(findings
        .iter()
        .any(|f| f.cve_id.as_deref() == Some("CVE-2099-4242")));
    // Database exposure rule still fires alongside the CVE.
    assert!(findings
        .iter()
        .any(|f| f.cve_id.is_none() && f.port == Some(6379) && f.severity == Severity::Medium));
}

#[test]
fn malformed_feed_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(&dir, r#"{"signatures": [{"cve_id": "CVE-1"}]}"#);

    let result = FindingAggregator::from_config(&VulnConfig {
        catalog_path: Some(path),
    });
    assert!(matches!(result, Err(VulnError::CatalogParse { .. })));
}

//! Vulnerability signature catalog.
//!
//! A built-in seed ships with the crate so scans produce CVE findings
//! offline. Feed exports can be layered on top with
//! [`VulnCatalog::load_json`]; a file entry replaces the built-in entry with
//! the same CVE id.

use std::path::Path;

use serde::{Deserialize, Serialize};

use netguard_core::OpenPort;

use crate::error::{Result, VulnError};
use crate::version::VersionRule;

/// One known vulnerability and how to recognise it on an open port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VulnSignature {
    pub cve_id: String,
    /// Product name as fingerprinted by the scanner (case-insensitive substring).
    #[serde(default)]
    pub product: Option<String>,
    /// Service name, used when the signature has no product.
    #[serde(default)]
    pub service: Option<String>,
    /// Port number, used when the signature has no product.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub affected: VersionRule,
    pub cvss_score: f64,
    pub description: String,
}

impl VulnSignature {
    fn seed(
        cve_id: &str,
        product: Option<&str>,
        service: Option<&str>,
        port: Option<u16>,
        affected: VersionRule,
        cvss_score: f64,
        description: &str,
    ) -> Self {
        Self {
            cve_id: cve_id.to_string(),
            product: product.map(String::from),
            service: service.map(String::from),
            port,
            affected,
            cvss_score,
            description: description.to_string(),
        }
    }

    /// Whether this signature applies to an open port.
    pub fn matches(&self, port: &OpenPort) -> bool {
        let identified = match &self.product {
            Some(product) => port
                .product
                .as_deref()
                .is_some_and(|p| contains_ignore_case(p, product)),
            None => {
                let service_hit = match (&self.service, &port.service) {
                    (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
                    _ => false,
                };
                service_hit || self.port == Some(port.port)
            }
        };
        identified && self.affected.matches(port.version.as_deref())
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| VulnError::InvalidSignature {
            cve_id: self.cve_id.clone(),
            reason,
        };
        if self.cve_id.trim().is_empty() {
            return Err(invalid("empty CVE id".to_string()));
        }
        if !(0.0..=10.0).contains(&self.cvss_score) {
            return Err(invalid(format!("CVSS {} outside 0-10", self.cvss_score)));
        }
        if self.product.is_none() && self.service.is_none() && self.port.is_none() {
            return Err(invalid("needs a product, service, or port".to_string()));
        }
        let bad = self.affected.invalid_bounds();
        if !bad.is_empty() {
            return Err(invalid(format!("unparsable versions {bad:?}")));
        }
        Ok(())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Accepted file layouts: a bare array or `{"signatures": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<VulnSignature>),
    Feed { signatures: Vec<VulnSignature> },
}

#[derive(Debug, Clone, Default)]
pub struct VulnCatalog {
    signatures: Vec<VulnSignature>,
}

impl VulnCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The signatures shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            signatures: builtin_signatures(),
        }
    }

    pub fn signatures(&self) -> &[VulnSignature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Add or replace a signature, keyed by CVE id.
    pub fn insert(&mut self, signature: VulnSignature) {
        match self
            .signatures
            .iter_mut()
            .find(|s| s.cve_id.eq_ignore_ascii_case(&signature.cve_id))
        {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    /// Merge signatures from a JSON feed export. Returns how many were read.
    pub fn load_json(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let path_display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| VulnError::CatalogRead {
            path: path_display.clone(),
            source,
        })?;
        let count = self.merge_json(&raw).map_err(|e| match e {
            VulnError::CatalogParse { message, .. } => VulnError::CatalogParse {
                path: path_display.clone(),
                message,
            },
            other => other,
        })?;
        tracing::info!(path = %path_display, signatures = count, "Loaded vulnerability catalog");
        Ok(count)
    }

    /// Merge signatures from JSON text.
    pub fn merge_json(&mut self, raw: &str) -> Result<usize> {
        let file: CatalogFile =
            serde_json::from_str(raw).map_err(|e| VulnError::CatalogParse {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?;
        let signatures = match file {
            CatalogFile::List(list) => list,
            CatalogFile::Feed { signatures } => signatures,
        };
        for signature in &signatures {
            signature.validate()?;
        }
        let count = signatures.len();
        for signature in signatures {
            self.insert(signature);
        }
        Ok(count)
    }

    /// Signatures matching an open port.
    pub fn matching<'a>(&'a self, port: &'a OpenPort) -> impl Iterator<Item = &'a VulnSignature> {
        self.signatures.iter().filter(move |s| s.matches(port))
    }
}

fn builtin_signatures() -> Vec<VulnSignature> {
    use VulnSignature as S;
    vec![
        S::seed(
            "CVE-2024-6387",
            Some("OpenSSH"),
            None,
            None,
            VersionRule::range("8.5", "9.8"),
            8.1,
            "regreSSHion: signal handler race in sshd allows unauthenticated remote code execution",
        ),
        S::seed(
            "CVE-2023-38408",
            Some("OpenSSH"),
            None,
            None,
            VersionRule::below("9.3"),
            9.8,
            "ssh-agent PKCS#11 provider loading allows remote code execution via forwarded agent",
        ),
        S::seed(
            "CVE-2018-10933",
            Some("libssh"),
            None,
            None,
            VersionRule::range("0.6.0", "0.8.4"),
            9.1,
            "libssh server authentication bypass via SSH2_MSG_USERAUTH_SUCCESS",
        ),
        S::seed(
            "CVE-2021-41773",
            Some("Apache httpd"),
            None,
            None,
            VersionRule::exact(&["2.4.49"]),
            7.5,
            "Path traversal and file disclosure in Apache HTTP Server 2.4.49",
        ),
        S::seed(
            "CVE-2021-42013",
            Some("Apache httpd"),
            None,
            None,
            VersionRule::exact(&["2.4.49", "2.4.50"]),
            9.8,
            "Path traversal leading to remote code execution in Apache HTTP Server",
        ),
        S::seed(
            "CVE-2021-23017",
            Some("nginx"),
            None,
            None,
            VersionRule::range("0.6.18", "1.21.0"),
            7.7,
            "Off-by-one in nginx resolver allows memory overwrite via crafted DNS response",
        ),
        S::seed(
            "CVE-2015-1635",
            Some("Microsoft IIS httpd"),
            None,
            None,
            VersionRule::exact(&["7.5", "8.0", "8.5"]),
            10.0,
            "HTTP.sys range header handling allows remote code execution",
        ),
        S::seed(
            "CVE-2011-2523",
            Some("vsftpd"),
            None,
            None,
            VersionRule::exact(&["2.3.4"]),
            9.8,
            "Backdoored vsftpd 2.3.4 opens a root shell on port 6200",
        ),
        S::seed(
            "CVE-2023-30799",
            Some("MikroTik RouterOS"),
            None,
            None,
            VersionRule::below("6.49.7"),
            9.1,
            "Privilege escalation from admin to super-admin in RouterOS",
        ),
        S::seed(
            "CVE-2023-1389",
            Some("TP-LINK"),
            None,
            None,
            VersionRule::Any,
            8.8,
            "Command injection in TP-Link Archer web management interface",
        ),
        S::seed(
            "CVE-2017-0144",
            None,
            Some("microsoft-ds"),
            Some(445),
            VersionRule::Any,
            8.1,
            "EternalBlue: SMBv1 remote code execution (WannaCry)",
        ),
        S::seed(
            "CVE-2019-0708",
            None,
            Some("ms-wbt-server"),
            Some(3389),
            VersionRule::Any,
            9.8,
            "BlueKeep: pre-authentication remote code execution in Remote Desktop Services",
        ),
        S::seed(
            "CVE-2020-1938",
            None,
            Some("ajp13"),
            Some(8009),
            VersionRule::Any,
            9.8,
            "Ghostcat: Apache Tomcat AJP connector file read and inclusion",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_core::Protocol;

    fn port(number: u16, service: &str, product: Option<&str>, version: Option<&str>) -> OpenPort {
        OpenPort {
            port: number,
            protocol: Protocol::Tcp,
            service: Some(service.to_string()),
            product: product.map(String::from),
            version: version.map(String::from),
        }
    }

    #[test]
    fn builtin_signatures_are_valid() {
        let catalog = VulnCatalog::builtin();
        assert!(!catalog.is_empty());
        for signature in catalog.signatures() {
            signature.validate().unwrap();
        }
    }

    #[test]
    fn product_signature_requires_matching_version() {
        let catalog = VulnCatalog::builtin();
        let vulnerable = port(22, "ssh", Some("OpenSSH"), Some("9.6p1"));
        let ids: Vec<&str> = catalog
            .matching(&vulnerable)
            .map(|s| s.cve_id.as_str())
            .collect();
        assert!(ids.contains(&"CVE-2024-6387"));
        assert!(!ids.contains(&"CVE-2023-38408"));

        let patched = port(22, "ssh", Some("OpenSSH"), Some("9.8p1"));
        assert_eq!(catalog.matching(&patched).count(), 0);

        let unknown = port(22, "ssh", Some("OpenSSH"), None);
        assert_eq!(catalog.matching(&unknown).count(), 0);
    }

    #[test]
    fn productless_signature_matches_by_service_or_port() {
        let catalog = VulnCatalog::builtin();
        let smb = port(445, "microsoft-ds", None, None);
        assert!(catalog.matching(&smb).any(|s| s.cve_id == "CVE-2017-0144"));

        let rdp_odd_name = port(3389, "rdp", None, None);
        assert!(catalog
            .matching(&rdp_odd_name)
            .any(|s| s.cve_id == "CVE-2019-0708"));
    }

    #[test]
    fn product_match_is_case_insensitive_substring() {
        let catalog = VulnCatalog::builtin();
        let httpd = port(80, "http", Some("apache HTTPD"), Some("2.4.49"));
        let ids: Vec<&str> = catalog.matching(&httpd).map(|s| s.cve_id.as_str()).collect();
        assert!(ids.contains(&"CVE-2021-41773"));
        assert!(ids.contains(&"CVE-2021-42013"));
    }

    #[test]
    fn file_entries_replace_builtins_by_cve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(
            &path,
            r#"{"signatures": [
                {"cve_id": "CVE-2024-6387", "product": "OpenSSH",
                 "affected": {"rule": "range", "from": "8.5", "to": "9.9"},
                 "cvss_score": 8.1, "description": "widened range"},
                {"cve_id": "CVE-2099-0001", "service": "telnet", "port": 23,
                 "cvss_score": 7.0, "description": "new entry"}
            ]}"#,
        )
        .unwrap();

        let mut catalog = VulnCatalog::builtin();
        let before = catalog.len();
        assert_eq!(catalog.load_json(&path).unwrap(), 2);
        assert_eq!(catalog.len(), before + 1);

        let replaced = catalog
            .signatures()
            .iter()
            .find(|s| s.cve_id == "CVE-2024-6387")
            .unwrap();
        assert_eq!(replaced.description, "widened range");
        let fresh = catalog
            .signatures()
            .iter()
            .find(|s| s.cve_id == "CVE-2099-0001")
            .unwrap();
        assert_eq!(fresh.affected, VersionRule::Any);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let mut catalog = VulnCatalog::empty();
        let err = catalog
            .merge_json(r#"[{"cve_id": "CVE-1", "cvss_score": 11.0, "product": "x", "description": ""}]"#)
            .unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignature { .. }));

        let err = catalog
            .merge_json(r#"[{"cve_id": "CVE-2", "cvss_score": 5.0, "description": ""}]"#)
            .unwrap_err();
        assert!(matches!(err, VulnError::InvalidSignature { .. }));
        assert!(catalog.is_empty());

        assert!(matches!(
            catalog.merge_json("not json"),
            Err(VulnError::CatalogParse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let mut catalog = VulnCatalog::empty();
        assert!(matches!(
            catalog.load_json("/nonexistent/feed.json"),
            Err(VulnError::CatalogRead { .. })
        ));
    }
}

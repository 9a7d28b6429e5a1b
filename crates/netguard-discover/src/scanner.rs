//! Scanner backends.
//!
//! [`HostScanner`] is the seam between the pipeline and whatever produces
//! host observations. [`NmapScanner`] runs nmap as a child process via
//! `tokio::process::Command` and parses its XML output; the native
//! [`TcpConnectScanner`](crate::probe::TcpConnectScanner) lives in `probe`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use netguard_core::types::normalize_mac;
use netguard_core::{OpenPort, Protocol};

use crate::config::{DiscoverConfig, ScanProfile, ScannerKind};
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapHost, NmapRun};
use crate::probe::TcpConnectScanner;
use crate::vendor;

/// One live host as reported by a scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedHost {
    pub ip: IpAddr,
    /// Normalized `AA:BB:CC:DD:EE:FF`.
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub os: Option<String>,
    pub ports: Vec<OpenPort>,
}

impl ObservedHost {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            vendor: None,
            os: None,
            ports: Vec::new(),
        }
    }

    /// Convert an nmap host. Hosts that are down or carry no IP address are
    /// dropped.
    pub fn from_nmap(host: &NmapHost) -> Option<Self> {
        if !host.is_up() {
            return None;
        }
        let ip = host.ip()?;
        let mac = host.mac().and_then(normalize_mac);
        let vendor = host
            .mac_vendor()
            .map(String::from)
            .or_else(|| mac.as_deref().and_then(vendor::lookup).map(String::from));

        let ports = host
            .open_ports()
            .filter_map(|np| {
                let protocol: Protocol = np.protocol.parse().ok()?;
                let service = np.service.as_ref();
                Some(OpenPort {
                    port: np.port,
                    protocol,
                    service: service.map(|s| s.name.clone()),
                    product: service.and_then(|s| s.product.clone()),
                    version: service.and_then(|s| s.version.clone()),
                })
            })
            .collect();

        Some(Self {
            ip,
            mac,
            hostname: host.hostname().map(String::from),
            vendor,
            os: host.os_name().map(String::from),
            ports,
        })
    }
}

/// Convert every usable host in an nmap run.
pub fn observed_hosts(run: &NmapRun) -> Vec<ObservedHost> {
    run.hosts.iter().filter_map(ObservedHost::from_nmap).collect()
}

/// Result of a single scanner execution.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub target: String,
    pub profile: ScanProfile,
    pub hosts: Vec<ObservedHost>,
    /// False when the scan only checked liveness, so port lists say
    /// nothing about what is open.
    pub ports_scanned: bool,
    pub duration: Duration,
}

#[async_trait]
pub trait HostScanner: Send + Sync {
    /// Short backend name for logs and journal entries.
    fn name(&self) -> &'static str;

    async fn scan(&self, target: &str, profile: ScanProfile) -> Result<ScanOutput>;
}

/// Build the configured scanner backend. The nmap backend is verified
/// before it is returned.
pub async fn from_config(config: &DiscoverConfig) -> Result<Arc<dyn HostScanner>> {
    match config.scanner {
        ScannerKind::Nmap => {
            let scanner = NmapScanner::new(&config.nmap_path);
            let version = scanner.verify_installation().await?;
            let banner = version.lines().next().unwrap_or_default().to_string();
            tracing::info!(nmap_version = %banner, "Nmap verified");
            Ok(Arc::new(scanner))
        }
        ScannerKind::Tcp => Ok(Arc::new(TcpConnectScanner::from_config(&config.tcp))),
    }
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
}

impl NmapScanner {
    pub fn new(nmap_path: &str) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
        }
    }

    /// Verify nmap is installed and return its version banner.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        if !output.status.success() {
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }
}

#[async_trait]
impl HostScanner for NmapScanner {
    fn name(&self) -> &'static str {
        "nmap"
    }

    /// Nmap is invoked with `-oX -` to write XML to stdout.
    async fn scan(&self, target: &str, profile: ScanProfile) -> Result<ScanOutput> {
        let start = Instant::now();
        let flags = profile.nmap_flags();

        tracing::info!(target = %target, profile = %profile, "Starting nmap scan");

        let output = Command::new(&self.nmap_path)
            .args(&flags)
            .arg("-oX")
            .arg("-")
            .arg("--noninteractive")
            .arg(target)
            .output()
            .await
            .map_err(|e| DiscoverError::NmapNotFound {
                path: format!("{}: {e}", self.nmap_path),
            })?;

        let duration = start.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        let hosts = observed_hosts(&run);

        tracing::info!(
            target = %target,
            hosts_up = run.hosts_up(),
            usable_hosts = hosts.len(),
            nmap_elapsed_secs = run.elapsed_secs().unwrap_or_default(),
            duration_ms = duration.as_millis() as u64,
            "Nmap scan complete"
        );

        Ok(ScanOutput {
            target: target.to_string(),
            profile,
            hosts,
            ports_scanned: profile.scans_ports(),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmap_xml::parse_nmap_xml;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap">
  <host>
    <status state="up" reason="syn-ack"/>
    <address addr="10.0.1.1" addrtype="ipv4"/>
    <address addr="b8:27:eb:01:02:03" addrtype="mac"/>
    <hostnames><hostname name="web.local" type="PTR"/></hostnames>
    <ports>
      <port protocol="tcp" portid="80">
        <state state="open" reason="syn-ack"/>
        <service name="http" product="nginx" version="1.24"/>
      </port>
      <port protocol="tcp" portid="8080">
        <state state="closed" reason="reset"/>
      </port>
    </ports>
  </host>
  <host>
    <status state="up" reason="arp-response"/>
    <address addr="10.0.1.7" addrtype="ipv4"/>
    <address addr="AA:BB:CC:00:00:07" addrtype="mac" vendor="Acme"/>
  </host>
  <host>
    <status state="down" reason="no-response"/>
    <address addr="10.0.1.2" addrtype="ipv4"/>
  </host>
  <host>
    <status state="up" reason="user-set"/>
  </host>
</nmaprun>"#;

    #[test]
    fn converts_only_live_addressed_hosts() {
        let run = parse_nmap_xml(XML.as_bytes()).unwrap();
        let hosts = observed_hosts(&run);
        assert_eq!(hosts.len(), 2);

        let web = &hosts[0];
        assert_eq!(web.ip, "10.0.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(web.mac.as_deref(), Some("B8:27:EB:01:02:03"));
        assert_eq!(web.vendor.as_deref(), Some("Raspberry Pi Foundation"));
        assert_eq!(web.hostname.as_deref(), Some("web.local"));
        assert_eq!(web.ports.len(), 1);
        assert_eq!(web.ports[0].port, 80);
        assert_eq!(web.ports[0].protocol, Protocol::Tcp);
        assert_eq!(web.ports[0].product.as_deref(), Some("nginx"));
        assert_eq!(web.ports[0].version.as_deref(), Some("1.24"));
    }

    #[test]
    fn nmap_vendor_attribute_wins_over_oui_table() {
        let run = parse_nmap_xml(XML.as_bytes()).unwrap();
        let hosts = observed_hosts(&run);
        assert_eq!(hosts[1].vendor.as_deref(), Some("Acme"));
        assert!(hosts[1].ports.is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let scanner = NmapScanner::new("/nonexistent/netguard-nmap");
        let result = scanner.verify_installation().await;
        assert!(matches!(result, Err(DiscoverError::NmapNotFound { .. })));

        let result = scanner.scan("127.0.0.1", ScanProfile::Quick).await;
        assert!(matches!(result, Err(DiscoverError::NmapNotFound { .. })));
    }
}

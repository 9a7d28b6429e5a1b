//! Native TCP connect scanner.
//!
//! Needs no raw-socket privileges: each (host, port) pair is a plain
//! `connect()` with a timeout. A semaphore bounds in-flight probes.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ipnet::IpNet;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use netguard_core::OpenPort;

use crate::config::{ScanProfile, TcpProbeConfig};
use crate::error::{DiscoverError, Result};
use crate::scanner::{HostScanner, ObservedHost, ScanOutput};

/// Ports probed by the quick profile, enough to tell a host is up.
const QUICK_PORTS: &[u16] = &[22, 80, 443, 445];

const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (80, "http"),
    (110, "pop3"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (515, "printer"),
    (554, "rtsp"),
    (631, "ipp"),
    (1433, "ms-sql-s"),
    (1883, "mqtt"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5432, "postgresql"),
    (5683, "coap"),
    (5900, "vnc"),
    (6379, "redis"),
    (8009, "ajp13"),
    (8080, "http-proxy"),
    (8443, "https-alt"),
    (8883, "secure-mqtt"),
    (9100, "jetdirect"),
    (27017, "mongod"),
];

/// Service name conventionally bound to a TCP port.
pub fn service_name(port: u16) -> Option<&'static str> {
    WELL_KNOWN
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}

/// Expand a CIDR or bare IP into host addresses. IPv4 network and
/// broadcast addresses are skipped for prefixes shorter than /31.
pub fn expand_target(target: &str, max_hosts: usize) -> Result<Vec<IpAddr>> {
    let trimmed = target.trim();
    let net: IpNet = match trimmed.parse::<IpNet>() {
        Ok(net) => net,
        Err(_) => {
            let ip: IpAddr = trimmed
                .parse()
                .map_err(|_| DiscoverError::InvalidTarget(target.to_string()))?;
            let prefix = if ip.is_ipv4() { 32 } else { 128 };
            IpNet::new(ip, prefix).map_err(|e| DiscoverError::InvalidTarget(e.to_string()))?
        }
    };

    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    let total: u128 = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
    let hosts = match net {
        IpNet::V4(_) if host_bits >= 2 => total - 2,
        _ => total,
    };
    if hosts > max_hosts as u128 {
        return Err(DiscoverError::TargetTooLarge {
            target: target.to_string(),
            hosts,
            max: max_hosts,
        });
    }

    Ok(net.hosts().collect())
}

pub struct TcpConnectScanner {
    ports: Vec<u16>,
    connect_timeout: Duration,
    max_concurrent_probes: usize,
    max_hosts: usize,
}

impl TcpConnectScanner {
    pub fn new(ports: Vec<u16>, connect_timeout: Duration) -> Self {
        let defaults = TcpProbeConfig::default();
        Self {
            ports,
            connect_timeout,
            max_concurrent_probes: defaults.max_concurrent_probes,
            max_hosts: defaults.max_hosts,
        }
    }

    pub fn from_config(config: &TcpProbeConfig) -> Self {
        Self {
            ports: config.ports.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            max_concurrent_probes: config.max_concurrent_probes.max(1),
            max_hosts: config.max_hosts,
        }
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts;
        self
    }

    fn ports_for(&self, profile: ScanProfile) -> Vec<u16> {
        match profile {
            ScanProfile::Quick => QUICK_PORTS.to_vec(),
            ScanProfile::Standard | ScanProfile::Deep => self.ports.clone(),
        }
    }
}

#[async_trait]
impl HostScanner for TcpConnectScanner {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn scan(&self, target: &str, profile: ScanProfile) -> Result<ScanOutput> {
        let start = Instant::now();
        let addresses = expand_target(target, self.max_hosts)?;
        let ports = self.ports_for(profile);

        tracing::info!(
            target = %target,
            profile = %profile,
            hosts = addresses.len(),
            ports = ports.len(),
            "Starting TCP connect scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_probes));
        let mut probes = JoinSet::new();

        for &ip in &addresses {
            for &port in &ports {
                let semaphore = semaphore.clone();
                let timeout = self.connect_timeout;
                probes.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
                        Ok(Ok(_stream)) => Some((ip, port)),
                        _ => None,
                    }
                });
            }
        }

        let mut open: BTreeMap<IpAddr, Vec<u16>> = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some((ip, port))) => open.entry(ip).or_default().push(port),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Probe task failed"),
            }
        }

        let hosts: Vec<ObservedHost> = open
            .into_iter()
            .map(|(ip, mut ports)| {
                ports.sort_unstable();
                let mut host = ObservedHost::new(ip);
                host.ports = ports
                    .into_iter()
                    .map(|port| OpenPort {
                        service: service_name(port).map(String::from),
                        ..OpenPort::tcp(port)
                    })
                    .collect();
                host
            })
            .collect();

        let duration = start.elapsed();
        tracing::info!(
            target = %target,
            hosts_up = hosts.len(),
            duration_ms = duration.as_millis() as u64,
            "TCP connect scan complete"
        );

        Ok(ScanOutput {
            target: target.to_string(),
            profile,
            hosts,
            ports_scanned: true,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn bare_ip_is_a_single_host() {
        let hosts = expand_target("192.168.1.20", 4096).unwrap();
        assert_eq!(hosts, vec!["192.168.1.20".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn cidr_skips_network_and_broadcast() {
        let hosts = expand_target("10.0.0.0/30", 4096).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0], "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(hosts[1], "10.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn oversized_targets_are_rejected() {
        assert!(expand_target("10.0.0.0/20", 4096).is_ok());
        assert!(matches!(
            expand_target("10.0.0.0/19", 4096),
            Err(DiscoverError::TargetTooLarge { hosts: 8190, .. })
        ));
        assert!(matches!(
            expand_target("fd00::/64", 4096),
            Err(DiscoverError::TargetTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_target_is_invalid() {
        assert!(matches!(
            expand_target("printer.local", 16),
            Err(DiscoverError::InvalidTarget(_))
        ));
    }

    #[test]
    fn well_known_services() {
        assert_eq!(service_name(22), Some("ssh"));
        assert_eq!(service_name(3389), Some("ms-wbt-server"));
        assert_eq!(service_name(4), None);
    }

    #[tokio::test]
    async fn finds_a_listening_port_on_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let scanner = TcpConnectScanner::new(vec![port], Duration::from_millis(500));
        let output = scanner.scan("127.0.0.1", ScanProfile::Standard).await.unwrap();

        assert!(output.ports_scanned);
        assert_eq!(output.hosts.len(), 1);
        assert_eq!(output.hosts[0].ip, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(output.hosts[0].ports.len(), 1);
        assert_eq!(output.hosts[0].ports[0].port, port);
    }
}

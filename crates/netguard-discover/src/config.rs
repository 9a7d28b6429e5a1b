//! Configuration for the netguard-discover scanner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use netguard_core::ScanType;

use crate::error::DiscoverError;

/// `[discover]` section, overridable with `NETGUARD__DISCOVER__*`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Resolved through `PATH` unless absolute.
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Organization this scanner writes to. `--tenant-id` overrides it.
    #[serde(default)]
    pub tenant_id: String,

    /// Which scanner backend to use.
    #[serde(default)]
    pub scanner: ScannerKind,

    #[serde(default)]
    pub default_profile: ScanProfile,

    /// Daemon schedule.
    #[serde(default)]
    pub subnets: Vec<SubnetSchedule>,

    /// Devices not seen for this many hours get marked stale.
    #[serde(default = "default_stale_hours")]
    pub stale_threshold_hours: u64,

    /// Directory for journal storage.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Maximum concurrent scans across all subnets.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,

    /// Settings for the native TCP connect scanner.
    #[serde(default)]
    pub tcp: TcpProbeConfig,
}

/// `[[discover.subnets]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SubnetSchedule {
    pub cidr: String,

    /// Label for logs.
    pub name: Option<String>,

    pub profile: Option<ScanProfile>,

    /// Scheduled scans are security scans unless overridden here.
    pub scan_type: Option<ScanType>,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// `[discover.tcp]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpProbeConfig {
    pub ports: Vec<u16>,
    pub connect_timeout_ms: u64,
    pub max_concurrent_probes: usize,
    /// Larger targets are rejected.
    pub max_hosts: usize,
}

impl Default for TcpProbeConfig {
    fn default() -> Self {
        Self {
            ports: vec![
                21, 22, 23, 25, 53, 80, 110, 139, 143, 443, 445, 515, 554, 631, 1433, 1883, 3306,
                3389, 5432, 5683, 5900, 6379, 8009, 8080, 8443, 8883, 9100, 27017,
            ],
            connect_timeout_ms: 500,
            max_concurrent_probes: 256,
            max_hosts: 4096,
        }
    }
}

/// Scanner backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScannerKind {
    /// External nmap process.
    #[default]
    Nmap,
    /// Native TCP connect probes; needs no privileges.
    Tcp,
}

impl FromStr for ScannerKind {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nmap" => Ok(Self::Nmap),
            "tcp" => Ok(Self::Tcp),
            _ => Err(DiscoverError::Config(format!(
                "Invalid scanner: {s}. Choose: nmap, tcp"
            ))),
        }
    }
}

/// How deep a scan goes. Each profile maps to a fixed nmap argument set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    /// Liveness only. Port lists from this profile say nothing.
    Quick,
    /// Top 1000 ports with service detection.
    #[default]
    Standard,
    /// Every port, OS fingerprinting and scripts.
    Deep,
}

impl ScanProfile {
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        match self {
            Self::Quick => vec!["-sn"],
            Self::Standard => vec!["-sS", "-sV", "--top-ports", "1000"],
            Self::Deep => vec!["-sS", "-sV", "-O", "-A", "-p-"],
        }
    }

    /// Whether nmap reports ports under this profile.
    pub fn scans_ports(&self) -> bool {
        !matches!(self, Self::Quick)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanProfile {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "deep" => Ok(Self::Deep),
            _ => Err(DiscoverError::Config(format!(
                "Invalid profile: {s}. Choose: quick, standard, deep"
            ))),
        }
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_stale_hours() -> u64 {
    24
}

fn default_journal_dir() -> String {
    "./journal".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            tenant_id: String::new(),
            scanner: ScannerKind::default(),
            default_profile: ScanProfile::default(),
            subnets: Vec::new(),
            stale_threshold_hours: default_stale_hours(),
            journal_dir: default_journal_dir(),
            max_concurrent_scans: default_max_concurrent(),
            tcp: TcpProbeConfig::default(),
        }
    }
}

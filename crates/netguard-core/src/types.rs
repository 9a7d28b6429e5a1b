//! Core domain types for NetGuard.
//!
//! Every entity belongs to exactly one organization. The persistence layer
//! and the REST surface both filter on `organization_id`; nothing here can
//! be constructed without one.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NetguardError;

/// Namespace UUID for deterministic device IDs.
const NETGUARD_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x52, 0x8e, 0x0b, 0x7d, 0x4a, 0x61, 0x9e, 0x25, 0xc4, 0x7a, 0x10, 0xd3, 0x6b, 0x58,
]);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Implements `as_str`, `Display`, and `FromStr` for a fieldless enum whose
/// serde representation matches the given strings.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = NetguardError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(NetguardError::InvalidInput(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

// ── Tenant ────────────────────────────────────────────────────────

uuid_id!(
    /// Every entity in the system belongs to an organization.
    OrgId
);

impl OrgId {
    /// Parse an organization ID from external input (header, CLI flag,
    /// config). The nil UUID is rejected.
    pub fn parse(raw: &str) -> Result<Self, NetguardError> {
        let uuid = Uuid::parse_str(raw.trim())
            .map_err(|e| NetguardError::InvalidInput(format!("organization id {raw:?}: {e}")))?;
        if uuid.is_nil() {
            return Err(NetguardError::InvalidInput(
                "organization id must not be nil".to_string(),
            ));
        }
        Ok(Self(uuid))
    }
}

/// A tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: &str) -> Self {
        Self {
            id: OrgId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }
}

// ── Devices ───────────────────────────────────────────────────────

uuid_id!(
    /// Identifier of a network device.
    DeviceId
);

impl DeviceId {
    /// Deterministic ID derived from organization + IP, so rediscovery of the
    /// same address always lands on the same row.
    pub fn for_ip(org: &OrgId, ip: &IpAddr) -> Self {
        Self(Uuid::new_v5(
            &NETGUARD_NS,
            format!("{}:device:{}", org.0, ip).as_bytes(),
        ))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    Switch,
    AccessPoint,
    Firewall,
    Server,
    Nas,
    Workstation,
    Mobile,
    Printer,
    Camera,
    Iot,
    Unknown,
}

str_enum!(DeviceType {
    Router => "router",
    Switch => "switch",
    AccessPoint => "access_point",
    Firewall => "firewall",
    Server => "server",
    Nas => "nas",
    Workstation => "workstation",
    Mobile => "mobile",
    Printer => "printer",
    Camera => "camera",
    Iot => "iot",
    Unknown => "unknown",
});

/// Soft lifecycle state of a device. Devices are never hard-deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Seen in the latest scan that covered it.
    Online,
    /// Missing from the latest scan of a range that covers it.
    Offline,
    /// Not seen within the stale threshold.
    Stale,
    /// Retired by an analyst.
    Retired,
}

str_enum!(DeviceStatus {
    Online => "online",
    Offline => "offline",
    Stale => "stale",
    Retired => "retired",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

str_enum!(Protocol {
    Tcp => "tcp",
    Udp => "udp",
    Sctp => "sctp",
});

/// An open port with whatever service fingerprint the scanner produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: Protocol,
    pub service: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl OpenPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
            service: None,
            product: None,
            version: None,
        }
    }
}

/// A device discovered on an organization's network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkDevice {
    pub id: DeviceId,
    pub organization_id: OrgId,
    pub ip_address: IpAddr,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub open_ports: Vec<OpenPort>,
    /// Aggregate risk, 0.0 – 10.0 (CVSS scale).
    pub risk_score: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl NetworkDevice {
    /// A freshly discovered, online device with no fingerprint data yet.
    pub fn new(organization_id: OrgId, ip_address: IpAddr, seen_at: DateTime<Utc>) -> Self {
        Self {
            id: DeviceId::for_ip(&organization_id, &ip_address),
            organization_id,
            ip_address,
            mac_address: None,
            hostname: None,
            vendor: None,
            os: None,
            device_type: DeviceType::Unknown,
            status: DeviceStatus::Online,
            open_ports: Vec::new(),
            risk_score: 0.0,
            first_seen: seen_at,
            last_seen: seen_at,
        }
    }

    /// Open TCP/UDP port numbers, sorted and deduplicated.
    pub fn port_numbers(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.open_ports.iter().map(|p| p.port).collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    /// Display label: hostname when known, otherwise the IP.
    pub fn label(&self) -> String {
        self.hostname
            .clone()
            .unwrap_or_else(|| self.ip_address.to_string())
    }
}

/// Normalize a MAC address to upper-case, colon-separated form.
///
/// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`, and `aabb.ccdd.eeff`.
/// Returns `None` if the input does not contain exactly 12 hex digits.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let upper = hex.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
    Some(pairs.join(":"))
}

// ── Scans ─────────────────────────────────────────────────────────

uuid_id!(
    /// Identifier of a security scan.
    ScanId
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// Discovery + port/service scan.
    Network,
    /// Network scan followed by finding aggregation.
    Security,
}

str_enum!(ScanType {
    Network => "network",
    Security => "security",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

str_enum!(ScanStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl ScanStatus {
    /// `pending → running → completed | failed`, plus `pending → failed`
    /// for scans that never launched.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One execution of the scan pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityScan {
    pub id: ScanId,
    pub organization_id: OrgId,
    pub scan_type: ScanType,
    pub target: String,
    pub profile: String,
    pub status: ScanStatus,
    pub findings_count: u32,
    pub devices_found: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SecurityScan {
    /// Create a `pending` scan.
    pub fn new(organization_id: OrgId, scan_type: ScanType, target: &str, profile: &str) -> Self {
        Self {
            id: ScanId::new(),
            organization_id,
            scan_type,
            target: target.to_string(),
            profile: profile.to_string(),
            status: ScanStatus::Pending,
            findings_count: 0,
            devices_found: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: ScanStatus) -> Result<(), NetguardError> {
        if !self.status.can_transition_to(next) {
            return Err(NetguardError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// `pending → running`.
    pub fn start(&mut self) -> Result<(), NetguardError> {
        self.transition(ScanStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running → completed`.
    pub fn complete(&mut self, devices_found: u32, findings_count: u32) -> Result<(), NetguardError> {
        self.transition(ScanStatus::Completed)?;
        self.devices_found = devices_found;
        self.findings_count = findings_count;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `pending | running → failed`.
    pub fn fail(&mut self, error: &str) -> Result<(), NetguardError> {
        self.transition(ScanStatus::Failed)?;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

// ── Findings ──────────────────────────────────────────────────────

uuid_id!(
    /// Identifier of a security finding.
    FindingId
);

/// Severity shared by findings and anomalies. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

str_enum!(Severity {
    Info => "info",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    /// CVSS v3 qualitative rating bands.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Info
        }
    }

    /// Representative CVSS score for a severity, used when a finding carries
    /// no score of its own.
    pub fn nominal_cvss(&self) -> f64 {
        match self {
            Self::Critical => 9.5,
            Self::High => 8.0,
            Self::Medium => 5.5,
            Self::Low => 2.5,
            Self::Info => 0.0,
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Acknowledged,
    Resolved,
    FalsePositive,
}

str_enum!(FindingStatus {
    Open => "open",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
    FalsePositive => "false_positive",
});

/// A vulnerability or misconfiguration discovered during a security scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityFinding {
    pub id: FindingId,
    pub organization_id: OrgId,
    pub scan_id: ScanId,
    pub device_id: DeviceId,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub cve_id: Option<String>,
    pub cvss_score: Option<f64>,
    pub port: Option<u16>,
    pub status: FindingStatus,
    pub created_at: DateTime<Utc>,
}

impl SecurityFinding {
    /// CVSS score if known, otherwise the nominal score for its severity.
    pub fn effective_score(&self) -> f64 {
        self.cvss_score
            .unwrap_or_else(|| self.severity.nominal_cvss())
    }
}

// ── Anomalies ─────────────────────────────────────────────────────

uuid_id!(
    /// Identifier of an anomaly.
    AnomalyId
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    UnusualPorts,
    ServiceChange,
    RiskyExposure,
    TrafficSpike,
    ConnectionBurst,
    BehaviorOutlier,
}

str_enum!(AnomalyType {
    UnusualPorts => "unusual_ports",
    ServiceChange => "service_change",
    RiskyExposure => "risky_exposure",
    TrafficSpike => "traffic_spike",
    ConnectionBurst => "connection_burst",
    BehaviorOutlier => "behavior_outlier",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Open,
    Investigating,
    Resolved,
    Dismissed,
}

str_enum!(AnomalyStatus {
    Open => "open",
    Investigating => "investigating",
    Resolved => "resolved",
    Dismissed => "dismissed",
});

impl AnomalyStatus {
    /// Open and under-investigation anomalies suppress duplicates.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Investigating)
    }
}

/// A statistically unusual device behaviour flagged by the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anomaly {
    pub id: AnomalyId,
    pub organization_id: OrgId,
    pub device_id: Option<DeviceId>,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Isolation score in (0, 1).
    pub score: f64,
    pub description: String,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
}

// ── Telemetry ─────────────────────────────────────────────────────

/// One per-device feature snapshot consumed by the anomaly model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub organization_id: OrgId,
    pub device_id: DeviceId,
    pub observed_at: DateTime<Utc>,
    pub open_port_count: u32,
    pub service_count: u32,
    pub new_ports: u32,
    pub closed_ports: u32,
    pub risky_port_count: u32,
    #[serde(default)]
    pub bytes_in: u64,
    #[serde(default)]
    pub bytes_out: u64,
    #[serde(default)]
    pub connection_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrgId {
        OrgId(Uuid::from_u128(0x42))
    }

    #[test]
    fn scan_lifecycle_happy_path() {
        let mut scan = SecurityScan::new(org(), ScanType::Security, "10.0.0.0/24", "standard");
        assert_eq!(scan.status, ScanStatus::Pending);

        scan.start().unwrap();
        assert_eq!(scan.status, ScanStatus::Running);
        assert!(scan.started_at.is_some());

        scan.complete(12, 3).unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
        assert_eq!(scan.devices_found, 12);
        assert_eq!(scan.findings_count, 3);
        assert!(scan.completed_at.is_some());
    }

    #[test]
    fn scan_can_fail_before_running() {
        let mut scan = SecurityScan::new(org(), ScanType::Network, "10.0.0.1", "quick");
        scan.fail("nmap missing").unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert_eq!(scan.error.as_deref(), Some("nmap missing"));
    }

    #[test]
    fn terminal_scans_reject_transitions() {
        let mut scan = SecurityScan::new(org(), ScanType::Network, "10.0.0.1", "quick");
        scan.start().unwrap();
        scan.complete(1, 0).unwrap();

        let err = scan.fail("late failure").unwrap_err();
        assert!(matches!(
            err,
            NetguardError::InvalidTransition {
                from: ScanStatus::Completed,
                to: ScanStatus::Failed
            }
        ));
        assert!(scan.start().is_err());
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let mut scan = SecurityScan::new(org(), ScanType::Network, "10.0.0.1", "quick");
        assert!(scan.complete(0, 0).is_err());
        assert_eq!(scan.status, ScanStatus::Pending);
    }

    #[test]
    fn device_id_is_deterministic_per_org_and_ip() {
        let ip: IpAddr = "10.0.1.42".parse().unwrap();
        let a = DeviceId::for_ip(&org(), &ip);
        let b = DeviceId::for_ip(&org(), &ip);
        let other_org = DeviceId::for_ip(&OrgId(Uuid::from_u128(0x43)), &ip);
        assert_eq!(a, b);
        assert_ne!(a, other_org);
    }

    #[test]
    fn org_id_rejects_nil_and_garbage() {
        assert!(OrgId::parse("00000000-0000-0000-0000-000000000000").is_err());
        assert!(OrgId::parse("not-a-uuid").is_err());
        let id = OrgId::parse(" 6ba7b810-9dad-11d1-80b4-00c04fd430c8 ").unwrap();
        assert_eq!(id.to_string(), "6ba7b810-9dad-11d1-80b4-00c04fd430c8");
    }

    #[test]
    fn severity_bands_follow_cvss() {
        assert_eq!(Severity::from_cvss(9.8), Severity::Critical);
        assert_eq!(Severity::from_cvss(9.0), Severity::Critical);
        assert_eq!(Severity::from_cvss(7.5), Severity::High);
        assert_eq!(Severity::from_cvss(5.3), Severity::Medium);
        assert_eq!(Severity::from_cvss(0.1), Severity::Low);
        assert_eq!(Severity::from_cvss(0.0), Severity::Info);
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn enums_parse_from_their_wire_names() {
        assert_eq!("access_point".parse::<DeviceType>().unwrap(), DeviceType::AccessPoint);
        assert_eq!("RETIRED".parse::<DeviceStatus>().unwrap(), DeviceStatus::Retired);
        assert_eq!(
            "false_positive".parse::<FindingStatus>().unwrap(),
            FindingStatus::FalsePositive
        );
        assert!("sideways".parse::<ScanStatus>().is_err());

        let json = serde_json::to_string(&AnomalyType::TrafficSpike).unwrap();
        assert_eq!(json, "\"traffic_spike\"");
        assert_eq!(AnomalyType::TrafficSpike.as_str(), "traffic_spike");
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(
            normalize_mac("aa:bb:cc:dd:ee:0f").as_deref(),
            Some("AA:BB:CC:DD:EE:0F")
        );
        assert_eq!(
            normalize_mac("AA-BB-CC-DD-EE-0F").as_deref(),
            Some("AA:BB:CC:DD:EE:0F")
        );
        assert_eq!(
            normalize_mac("aabb.ccdd.ee0f").as_deref(),
            Some("AA:BB:CC:DD:EE:0F")
        );
        assert_eq!(normalize_mac("aa:bb:cc"), None);
        assert_eq!(normalize_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn device_serialization_roundtrip() {
        let mut device = NetworkDevice::new(org(), "10.0.1.5".parse().unwrap(), Utc::now());
        device.hostname = Some("nas-01".to_string());
        device.device_type = DeviceType::Nas;
        device.open_ports.push(OpenPort::tcp(445));

        let json = serde_json::to_string(&device).unwrap();
        let back: NetworkDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, device);
        assert!(json.contains("\"device_type\":\"nas\""));
        assert_eq!(device.label(), "nas-01");
    }
}

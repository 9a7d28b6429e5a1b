//! Exposure rules: risky services that are findings on their own, no CVE
//! required.

use netguard_core::{NetworkDevice, OpenPort, Severity};

/// A misconfiguration or legacy-protocol exposure found on a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    /// Stable rule identifier, used for deduplication.
    pub rule_id: &'static str,
    pub port: u16,
    pub severity: Severity,
    pub title: String,
    pub description: &'static str,
}

struct PortRule {
    rule_id: &'static str,
    ports: &'static [u16],
    label: &'static str,
    severity: Severity,
    description: &'static str,
}

const PORT_RULES: &[PortRule] = &[
    PortRule {
        rule_id: "exposure:telnet",
        ports: &[23],
        label: "Telnet",
        severity: Severity::High,
        description: "Telnet sends credentials and sessions in cleartext. Replace with SSH.",
    },
    PortRule {
        rule_id: "exposure:ftp",
        ports: &[21],
        label: "FTP",
        severity: Severity::Medium,
        description: "FTP transmits credentials in cleartext. Use SFTP or FTPS.",
    },
    PortRule {
        rule_id: "exposure:smb",
        ports: &[445],
        label: "SMB",
        severity: Severity::High,
        description: "SMB is a common lateral movement and ransomware vector. Restrict to trusted hosts.",
    },
    PortRule {
        rule_id: "exposure:rdp",
        ports: &[3389],
        label: "RDP",
        severity: Severity::High,
        description: "Remote Desktop is frequently brute-forced. Put it behind a VPN or gateway.",
    },
    PortRule {
        rule_id: "exposure:vnc",
        ports: &[5900],
        label: "VNC",
        severity: Severity::High,
        description: "VNC often runs with weak or no authentication and no encryption.",
    },
    PortRule {
        rule_id: "exposure:snmp",
        ports: &[161],
        label: "SNMP",
        severity: Severity::Medium,
        description: "SNMP v1/v2c community strings leak device configuration.",
    },
    PortRule {
        rule_id: "exposure:database",
        ports: &[3306, 5432, 1433, 27017, 6379],
        label: "Database",
        severity: Severity::Medium,
        description: "Database listeners should not be reachable from the general network.",
    },
];

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Evaluate every exposure rule against a device's open ports.
pub fn evaluate(device: &NetworkDevice) -> Vec<Exposure> {
    let mut exposures: Vec<Exposure> = device
        .open_ports
        .iter()
        .flat_map(|port| match_port(port))
        .collect();

    let ports = device.port_numbers();
    if ports.contains(&HTTP_PORT) && !ports.contains(&HTTPS_PORT) {
        exposures.push(Exposure {
            rule_id: "exposure:http-only",
            port: HTTP_PORT,
            severity: Severity::Low,
            title: "HTTP without HTTPS on port 80".to_string(),
            description: "Web interface is only offered unencrypted. Enable HTTPS.",
        });
    }

    exposures
}

fn match_port(port: &OpenPort) -> impl Iterator<Item = Exposure> + '_ {
    PORT_RULES
        .iter()
        .filter(move |rule| rule.ports.contains(&port.port))
        .map(move |rule| Exposure {
            rule_id: rule.rule_id,
            port: port.port,
            severity: rule.severity,
            title: format!("{} exposed on port {}", rule.label, port.port),
            description: rule.description,
        })
}

/// Whether a port number triggers any exposure rule.
pub fn is_risky_port(port: u16) -> bool {
    PORT_RULES.iter().any(|rule| rule.ports.contains(&port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netguard_core::OrgId;

    fn device_with(ports: &[u16]) -> NetworkDevice {
        let mut device = NetworkDevice::new(OrgId::new(), "10.0.0.7".parse().unwrap(), Utc::now());
        device.open_ports = ports.iter().map(|&p| OpenPort::tcp(p)).collect();
        device
    }

    #[test]
    fn cleartext_services_are_flagged() {
        let found = evaluate(&device_with(&[21, 23, 22]));
        let ids: Vec<&str> = found.iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec!["exposure:ftp", "exposure:telnet"]);
        assert_eq!(found[1].severity, Severity::High);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[test]
    fn http_only_is_low_and_suppressed_by_https() {
        let plain = evaluate(&device_with(&[80]));
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].severity, Severity::Low);

        assert!(evaluate(&device_with(&[80, 443])).is_empty());
    }

    #[test]
    fn databases_are_medium() {
        let found = evaluate(&device_with(&[5432, 6379]));
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.severity == Severity::Medium));
        assert!(found.iter().all(|e| e.rule_id == "exposure:database"));
        assert_eq!(found[1].port, 6379);
    }

    #[test]
    fn risky_port_lookup() {
        assert!(is_risky_port(3389));
        assert!(is_risky_port(27017));
        assert!(!is_risky_port(443));
    }
}

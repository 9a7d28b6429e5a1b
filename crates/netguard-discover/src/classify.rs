//! Device type classification.
//!
//! Evidence is weighed in a fixed order: hostname keywords, then vendor
//! keywords, then open port signatures. The first rule that fires wins.

use netguard_core::DeviceType;

const HOSTNAME_RULES: &[(&[&str], DeviceType)] = &[
    (&["printer", "prn", "mfp"], DeviceType::Printer),
    (&["camera", "cam", "ipcam", "nvr"], DeviceType::Camera),
    (&["firewall", "fw", "pfsense", "opnsense"], DeviceType::Firewall),
    (&["router", "gateway", "gw", "rtr"], DeviceType::Router),
    (&["switch", "sw"], DeviceType::Switch),
    (&["ap", "wap", "accesspoint"], DeviceType::AccessPoint),
    (&["nas", "synology", "diskstation", "qnap"], DeviceType::Nas),
    (&["iphone", "ipad", "android", "pixel", "galaxy"], DeviceType::Mobile),
    (&["server", "srv", "web", "db", "mail", "dns"], DeviceType::Server),
    (&["desktop", "laptop", "workstation", "macbook", "pc"], DeviceType::Workstation),
    (&["esp", "shelly", "sonoff", "tasmota", "hue"], DeviceType::Iot),
];

const VENDOR_RULES: &[(&[&str], DeviceType)] = &[
    (&["fortinet", "palo alto", "sonicwall", "watchguard"], DeviceType::Firewall),
    (&["mikrotik", "juniper", "cisco"], DeviceType::Router),
    (&["ubiquiti", "aruba", "ruckus", "meraki"], DeviceType::AccessPoint),
    (&["synology", "qnap", "western digital"], DeviceType::Nas),
    (&["epson", "brother", "lexmark", "xerox", "kyocera"], DeviceType::Printer),
    (&["hikvision", "axis communications", "dahua"], DeviceType::Camera),
    (&["espressif", "philips", "nest", "sonos", "tuya", "raspberry"], DeviceType::Iot),
    (&["vmware", "virtualbox", "supermicro"], DeviceType::Server),
];

const PRINTER_PORTS: &[u16] = &[9100, 515, 631];
const CAMERA_PORTS: &[u16] = &[554];
const IOT_PORTS: &[u16] = &[1883, 8883, 5683];
const WORKSTATION_PORTS: &[u16] = &[445, 139, 3389];
const DATABASE_PORTS: &[u16] = &[1433, 3306, 5432, 27017];

/// Classify a device from whatever evidence the scan produced.
pub fn classify(vendor: Option<&str>, hostname: Option<&str>, ports: &[u16]) -> DeviceType {
    hostname
        .and_then(by_hostname)
        .or_else(|| vendor.and_then(by_vendor))
        .or_else(|| by_ports(ports))
        .unwrap_or(DeviceType::Unknown)
}

fn by_hostname(hostname: &str) -> Option<DeviceType> {
    let lower = hostname.to_ascii_lowercase();
    // Only the host label counts; "printer.corp" and "laptop-7.corp" alike.
    let label = lower.split('.').next().unwrap_or(&lower);
    let tokens: Vec<&str> = label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    HOSTNAME_RULES
        .iter()
        .find(|(keywords, _)| {
            tokens
                .iter()
                .any(|token| keywords.iter().any(|kw| token_matches(token, kw)))
        })
        .map(|(_, device_type)| *device_type)
}

/// Short keywords must match the whole token, optionally followed by
/// digits ("sw01", "gw2"). Longer keywords match as a prefix.
fn token_matches(token: &str, keyword: &str) -> bool {
    if keyword.len() <= 3 {
        token
            .strip_prefix(keyword)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
    } else {
        token.starts_with(keyword)
    }
}

fn by_vendor(vendor: &str) -> Option<DeviceType> {
    let lower = vendor.to_ascii_lowercase();
    VENDOR_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(_, device_type)| *device_type)
}

fn by_ports(ports: &[u16]) -> Option<DeviceType> {
    let has = |p: u16| ports.contains(&p);
    let any = |set: &[u16]| set.iter().any(|p| ports.contains(p));

    if any(PRINTER_PORTS) {
        Some(DeviceType::Printer)
    } else if any(CAMERA_PORTS) {
        Some(DeviceType::Camera)
    } else if any(IOT_PORTS) {
        Some(DeviceType::Iot)
    } else if has(161) && (has(22) || has(23)) {
        Some(DeviceType::Switch)
    } else if has(53) && (has(80) || has(443)) && !has(22) {
        Some(DeviceType::Router)
    } else if any(WORKSTATION_PORTS) {
        Some(DeviceType::Workstation)
    } else if (has(22) && (has(80) || has(443))) || any(DATABASE_PORTS) {
        Some(DeviceType::Server)
    } else {
        None
    }
}

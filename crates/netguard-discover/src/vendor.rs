//! MAC vendor lookup from the OUI (first three octets).

/// Vendor reported for locally administered MAC addresses. Phones and
/// laptops randomize their MAC per network, so the OUI means nothing.
pub const RANDOMIZED_VENDOR: &str = "Private (randomized MAC)";

const OUI_TABLE: &[(&str, &str)] = &[
    ("00:00:48", "Seiko Epson"),
    ("00:09:0F", "Fortinet"),
    ("00:0C:29", "VMware"),
    ("00:11:32", "Synology"),
    ("00:17:88", "Philips Lighting"),
    ("00:18:0A", "Cisco Meraki"),
    ("00:1B:17", "Palo Alto Networks"),
    ("00:40:8C", "Axis Communications"),
    ("00:50:56", "VMware"),
    ("00:80:77", "Brother Industries"),
    ("08:00:27", "PCS Systemtechnik (VirtualBox)"),
    ("18:B4:30", "Nest Labs"),
    ("24:0A:C4", "Espressif"),
    ("24:5E:BE", "QNAP Systems"),
    ("24:A4:3C", "Ubiquiti Networks"),
    ("3C:5A:B4", "Google"),
    ("44:19:B6", "Hikvision"),
    ("4C:5E:0C", "MikroTik (Routerboard)"),
    ("B8:27:EB", "Raspberry Pi Foundation"),
    ("DC:A6:32", "Raspberry Pi Trading"),
    ("F0:18:98", "Apple"),
];

/// Whether the locally administered bit is set. Expects a normalized MAC.
pub fn is_randomized(mac: &str) -> bool {
    mac.get(0..2)
        .and_then(|octet| u8::from_str_radix(octet, 16).ok())
        .is_some_and(|first| first & 0x02 != 0)
}

/// Vendor for a normalized (`AA:BB:CC:DD:EE:FF`) MAC address.
pub fn lookup(mac: &str) -> Option<&'static str> {
    if is_randomized(mac) {
        return Some(RANDOMIZED_VENDOR);
    }
    let oui = mac.get(0..8)?;
    OUI_TABLE
        .iter()
        .find(|(prefix, _)| *prefix == oui)
        .map(|(_, vendor)| *vendor)
}

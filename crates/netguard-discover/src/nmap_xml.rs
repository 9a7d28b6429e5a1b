//! Deserialization of `nmap -oX -` output.
//!
//! Only the parts the scanner consumes are modelled. Attribute values nmap
//! documents as enumerations are typed; anything unrecognised falls into an
//! `Other` variant instead of failing the whole document.

use std::net::IpAddr;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// `<nmaprun>`
#[derive(Debug, Clone, Deserialize)]
pub struct NmapRun {
    #[serde(rename = "@version")]
    pub version: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
    pub runstats: Option<RunStats>,
}

impl NmapRun {
    /// Live hosts as counted by nmap itself, falling back to the parsed list.
    pub fn hosts_up(&self) -> u32 {
        self.runstats
            .as_ref()
            .and_then(|r| r.hosts.as_ref())
            .map(|h| h.up)
            .unwrap_or_else(|| self.hosts.iter().filter(|h| h.is_up()).count() as u32)
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.runstats.as_ref()?.finished.as_ref()?.elapsed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Ipv4,
    Ipv6,
    Mac,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PortState {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "open|filtered")]
    OpenFiltered,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    #[serde(rename = "status")]
    pub status: Option<Status>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<Os>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(rename = "@state")]
    pub state: HostState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub kind: AddressKind,
    /// Only present on MAC addresses.
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub entries: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub entries: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port: u16,
    #[serde(rename = "state")]
    pub state: PortStateElement,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortStateElement {
    #[serde(rename = "@state")]
    pub value: PortState,
}

impl NmapPort {
    pub fn is_open(&self) -> bool {
        self.state.value == PortState::Open
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Os {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStats {
    pub finished: Option<Finished>,
    pub hosts: Option<HostCounts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Finished {
    #[serde(rename = "@elapsed")]
    pub elapsed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostCounts {
    #[serde(rename = "@up", default)]
    pub up: u32,
    #[serde(rename = "@down", default)]
    pub down: u32,
}

impl NmapHost {
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == HostState::Up)
    }

    /// IPv4 address if present, otherwise IPv6.
    pub fn ip(&self) -> Option<IpAddr> {
        [AddressKind::Ipv4, AddressKind::Ipv6]
            .into_iter()
            .find_map(|kind| self.address(kind).and_then(|a| a.addr.parse().ok()))
    }

    pub fn mac(&self) -> Option<&str> {
        self.address(AddressKind::Mac).map(|a| a.addr.as_str())
    }

    /// Vendor nmap resolved for the MAC address, if any.
    pub fn mac_vendor(&self) -> Option<&str> {
        self.address(AddressKind::Mac)
            .and_then(|a| a.vendor.as_deref())
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()?
            .entries
            .first()
            .map(|h| h.name.as_str())
    }

    /// Most accurate OS guess.
    pub fn os_name(&self) -> Option<&str> {
        self.os
            .as_ref()?
            .matches
            .iter()
            .max_by_key(|m| m.accuracy.unwrap_or(0))
            .map(|m| m.name.as_str())
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &NmapPort> {
        self.ports
            .iter()
            .flat_map(|p| p.entries.iter())
            .filter(|p| p.is_open())
    }

    fn address(&self, kind: AddressKind) -> Option<&Address> {
        self.addresses.iter().find(|a| a.kind == kind)
    }
}

pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(e.to_string()))
}

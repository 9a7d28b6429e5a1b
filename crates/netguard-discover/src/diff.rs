//! Change detection: turn scanner output into devices and diff them
//! against what the store already knows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;

use netguard_core::{DeviceId, DeviceStatus, DeviceType, NetworkDevice, OrgId};
use netguard_store::{DeviceFilter, Store};

use crate::classify::classify;
use crate::error::Result;
use crate::scanner::ObservedHost;

/// Upper bound on stored devices considered for offline detection.
const MAX_RANGE_DEVICES: u32 = 10_000;

/// Port changes of one device against its stored state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortChurn {
    pub opened: Vec<u16>,
    pub closed: Vec<u16>,
}

impl PortChurn {
    pub fn between(previous: &[u16], current: &[u16]) -> Self {
        let before: BTreeSet<u16> = previous.iter().copied().collect();
        let after: BTreeSet<u16> = current.iter().copied().collect();
        Self {
            opened: after.difference(&before).copied().collect(),
            closed: before.difference(&after).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

/// The outcome of diffing scan results against the store.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Devices seen for the first time.
    pub new_devices: Vec<NetworkDevice>,
    /// Previously known devices, merged with what this scan observed.
    pub known_devices: Vec<NetworkDevice>,
    /// Online devices inside the scanned range that this scan did not see.
    pub offline_devices: Vec<NetworkDevice>,
    /// Port churn for every device that was seen.
    pub churn: HashMap<DeviceId, PortChurn>,
    pub summary: DiffSummary,
}

impl DiffResult {
    /// Every device seen by the scan, new ones first.
    pub fn seen(&self) -> impl Iterator<Item = &NetworkDevice> {
        self.new_devices.iter().chain(self.known_devices.iter())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub total_scanned: u32,
    pub new_count: u32,
    pub changed_count: u32,
    pub offline_count: u32,
}

/// Convert observed hosts into classified devices of `org`.
pub fn build_devices(
    org: &OrgId,
    hosts: &[ObservedHost],
    seen_at: DateTime<Utc>,
) -> Vec<NetworkDevice> {
    hosts
        .iter()
        .map(|host| {
            let mut device = NetworkDevice::new(*org, host.ip, seen_at);
            device.mac_address = host.mac.clone();
            device.hostname = host.hostname.clone();
            device.vendor = host.vendor.clone();
            device.os = host.os.clone();
            device.open_ports = host.ports.clone();
            device.device_type = classify(
                host.vendor.as_deref(),
                host.hostname.as_deref(),
                &device.port_numbers(),
            );
            device
        })
        .collect()
}

/// Compare discovered devices against the store.
///
/// When `ports_scanned` is false the scan only checked liveness, so known
/// devices keep their stored ports and report no churn.
pub async fn compute_diff(
    store: &dyn Store,
    org: &OrgId,
    discovered: Vec<NetworkDevice>,
    target: &str,
    ports_scanned: bool,
) -> Result<DiffResult> {
    let mut result = DiffResult::default();
    let mut seen_ips: HashSet<IpAddr> = HashSet::new();

    for device in discovered {
        if !seen_ips.insert(device.ip_address) {
            continue;
        }

        match store.find_device_by_ip(org, &device.ip_address).await? {
            None => {
                let churn = if ports_scanned {
                    PortChurn::between(&[], &device.port_numbers())
                } else {
                    PortChurn::default()
                };
                result.churn.insert(device.id, churn);
                result.new_devices.push(device);
            }
            Some(existing) => {
                let (merged, changed, churn) = merge_known(existing, device, ports_scanned);
                if changed {
                    result.summary.changed_count += 1;
                }
                result.churn.insert(merged.id, churn);
                result.known_devices.push(merged);
            }
        }
    }

    result.offline_devices = find_offline(store, org, target, &seen_ips).await?;

    result.summary.total_scanned = seen_ips.len() as u32;
    result.summary.new_count = result.new_devices.len() as u32;
    result.summary.offline_count = result.offline_devices.len() as u32;

    Ok(result)
}

/// Fold a fresh observation into the stored device. Returns the merged
/// device, whether anything beyond `last_seen` changed, and the port churn.
fn merge_known(
    existing: NetworkDevice,
    observed: NetworkDevice,
    ports_scanned: bool,
) -> (NetworkDevice, bool, PortChurn) {
    let churn = if ports_scanned {
        PortChurn::between(&existing.port_numbers(), &observed.port_numbers())
    } else {
        PortChurn::default()
    };

    let device_type = if observed.device_type == DeviceType::Unknown {
        existing.device_type
    } else {
        observed.device_type
    };

    let merged = NetworkDevice {
        id: existing.id,
        organization_id: existing.organization_id,
        ip_address: existing.ip_address,
        mac_address: observed.mac_address.or_else(|| existing.mac_address.clone()),
        hostname: observed.hostname.or_else(|| existing.hostname.clone()),
        vendor: observed.vendor.or_else(|| existing.vendor.clone()),
        os: observed.os.or_else(|| existing.os.clone()),
        device_type,
        status: if existing.status == DeviceStatus::Retired {
            DeviceStatus::Retired
        } else {
            DeviceStatus::Online
        },
        open_ports: if ports_scanned {
            observed.open_ports
        } else {
            existing.open_ports.clone()
        },
        risk_score: existing.risk_score,
        first_seen: existing.first_seen.min(observed.first_seen),
        last_seen: observed.last_seen.max(existing.last_seen),
    };

    let changed = !churn.is_empty()
        || merged.hostname != existing.hostname
        || merged.os != existing.os
        || merged.mac_address != existing.mac_address
        || merged.device_type != existing.device_type
        || merged.open_ports != existing.open_ports;

    (merged, changed, churn)
}

/// Online devices inside the scanned range that the scan did not see.
/// Targets that are not an IP or CIDR skip offline detection.
async fn find_offline(
    store: &dyn Store,
    org: &OrgId,
    target: &str,
    seen_ips: &HashSet<IpAddr>,
) -> Result<Vec<NetworkDevice>> {
    let Some(range) = target_range(target) else {
        return Ok(Vec::new());
    };

    let filter = DeviceFilter {
        status: Some(DeviceStatus::Online),
        device_type: None,
        limit: Some(MAX_RANGE_DEVICES),
    };
    let online = store.list_devices(org, &filter).await?;

    Ok(online
        .into_iter()
        .filter(|d| range.contains(&d.ip_address) && !seen_ips.contains(&d.ip_address))
        .collect())
}

fn target_range(target: &str) -> Option<IpNet> {
    let trimmed = target.trim();
    trimmed.parse::<IpNet>().ok().or_else(|| {
        let ip: IpAddr = trimmed.parse().ok()?;
        IpNet::new(ip, if ip.is_ipv4() { 32 } else { 128 }).ok()
    })
}

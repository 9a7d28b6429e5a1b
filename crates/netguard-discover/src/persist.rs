//! Store persistence for a diff result.

use chrono::{DateTime, TimeDelta, Utc};

use netguard_core::{DeviceStatus, NetworkDevice, OrgId, TelemetrySample};
use netguard_store::{Store, UpsertOutcome};
use netguard_vuln::exposure::is_risky_port;

use crate::diff::{DiffResult, PortChurn};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub created: u32,
    pub updated: u32,
    pub marked_offline: u32,
    pub marked_stale: u64,
    pub telemetry_recorded: u32,
}

/// Persist a full diff result.
///
/// Upserts every seen device, marks unseen in-range devices offline, marks
/// devices past the stale threshold stale, and records one telemetry sample
/// per seen device.
pub async fn persist_diff(
    store: &dyn Store,
    org: &OrgId,
    diff: &DiffResult,
    stale_threshold_hours: u64,
) -> Result<PersistOutcome> {
    let mut outcome = PersistOutcome::default();

    for device in diff.seen() {
        match store.upsert_device(device).await? {
            UpsertOutcome::Created => outcome.created += 1,
            UpsertOutcome::Updated => outcome.updated += 1,
        }
    }

    for device in &diff.offline_devices {
        store
            .set_device_status(org, &device.id, DeviceStatus::Offline)
            .await?;
        outcome.marked_offline += 1;
    }

    if let Some(delta) = TimeDelta::try_hours(stale_threshold_hours as i64) {
        let cutoff = Utc::now() - delta;
        outcome.marked_stale = store.mark_stale(org, cutoff).await?;
        if outcome.marked_stale > 0 {
            tracing::info!(org = %org, stale = outcome.marked_stale, "Marked stale devices");
        }
    }

    let observed_at = Utc::now();
    for device in diff.seen() {
        let churn = diff.churn.get(&device.id).cloned().unwrap_or_default();
        store
            .record_telemetry(&telemetry_for(device, &churn, observed_at))
            .await?;
        outcome.telemetry_recorded += 1;
    }

    Ok(outcome)
}

/// Scan-derived telemetry. Traffic counters stay zero; those arrive from
/// external collectors.
pub fn telemetry_for(
    device: &NetworkDevice,
    churn: &PortChurn,
    observed_at: DateTime<Utc>,
) -> TelemetrySample {
    let ports = device.port_numbers();
    TelemetrySample {
        organization_id: device.organization_id,
        device_id: device.id,
        observed_at,
        open_port_count: ports.len() as u32,
        service_count: device
            .open_ports
            .iter()
            .filter(|p| p.service.is_some())
            .count() as u32,
        new_ports: churn.opened.len() as u32,
        closed_ports: churn.closed.len() as u32,
        risky_port_count: ports.iter().filter(|p| is_risky_port(**p)).count() as u32,
        bytes_in: 0,
        bytes_out: 0,
        connection_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_diff;
    use netguard_core::OpenPort;
    use netguard_store::{DeviceFilter, MemoryStore};

    fn org() -> OrgId {
        OrgId(uuid::Uuid::from_u128(11))
    }

    #[test]
    fn test_telemetry_counts() {
        let mut device = NetworkDevice::new(org(), "10.0.0.5".parse().unwrap(), Utc::now());
        device.open_ports = vec![
            OpenPort {
                service: Some("telnet".to_string()),
                ..OpenPort::tcp(23)
            },
            OpenPort::tcp(443),
            OpenPort::tcp(3389),
        ];
        let churn = PortChurn {
            opened: vec![3389],
            closed: vec![80, 8080],
        };
        let sample = telemetry_for(&device, &churn, Utc::now());

        assert_eq!(sample.open_port_count, 3);
        assert_eq!(sample.service_count, 1);
        assert_eq!(sample.new_ports, 1);
        assert_eq!(sample.closed_ports, 2);
        assert_eq!(sample.risky_port_count, 2);
    }

    #[tokio::test]
    async fn test_persist_marks_offline_and_stale() {
        let store = MemoryStore::new();
        let old = Utc::now() - TimeDelta::hours(72);

        // Unseen and long gone: offline, then stale.
        let gone = NetworkDevice::new(org(), "10.0.0.9".parse().unwrap(), old);
        store.upsert_device(&gone).await.unwrap();

        let mut fresh = NetworkDevice::new(org(), "10.0.0.2".parse().unwrap(), Utc::now());
        fresh.open_ports = vec![OpenPort::tcp(22)];

        let diff = compute_diff(&store, &org(), vec![fresh.clone()], "10.0.0.0/24", true)
            .await
            .unwrap();
        let outcome = persist_diff(&store, &org(), &diff, 24).await.unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.marked_offline, 1);
        assert_eq!(outcome.marked_stale, 1);
        assert_eq!(outcome.telemetry_recorded, 1);

        let stored = store.get_device(&org(), &gone.id).await.unwrap();
        assert_eq!(stored.status, DeviceStatus::Stale);

        let all = store
            .list_devices(&org(), &DeviceFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2, "devices are never deleted");

        let samples = store.telemetry_since(&org(), old).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].device_id, fresh.id);
        assert_eq!(samples[0].new_ports, 1);
    }
}

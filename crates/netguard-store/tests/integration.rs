//! Integration tests for netguard-store.
//!
//! The `memory_*` tests always run. The `pg_*` tests need a live PostgreSQL
//! reachable through `DATABASE_URL`.
//! Run with: cargo test --package netguard-store --test integration -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};

use netguard_core::{
    Anomaly, AnomalyId, AnomalyStatus, AnomalyType, DeviceStatus, FindingId, FindingStatus,
    NetworkDevice, OpenPort, OrgId, Organization, ScanType, SecurityFinding, SecurityScan,
    Severity, TelemetrySample,
};
use netguard_store::{
    ensure_organization, AnomalyFilter, DatabaseConfig, DeviceFilter, FindingFilter, MemoryStore,
    PgStore, Store, StoreError,
};

fn device(org: OrgId, ip: &str) -> NetworkDevice {
    let mut d = NetworkDevice::new(org, ip.parse().unwrap(), Utc::now());
    d.open_ports = vec![OpenPort::tcp(22), OpenPort::tcp(443)];
    d
}

fn finding(scan: &SecurityScan, device: &NetworkDevice, severity: Severity) -> SecurityFinding {
    SecurityFinding {
        id: FindingId::new(),
        organization_id: scan.organization_id,
        scan_id: scan.id,
        device_id: device.id,
        severity,
        title: "Telnet exposed".to_string(),
        description: "Port 23 accepts connections".to_string(),
        cve_id: None,
        cvss_score: None,
        port: Some(23),
        status: FindingStatus::Open,
        created_at: Utc::now(),
    }
}

fn sample(org: OrgId, device: &NetworkDevice, minutes_ago: i64) -> TelemetrySample {
    TelemetrySample {
        organization_id: org,
        device_id: device.id,
        observed_at: Utc::now() - Duration::minutes(minutes_ago),
        open_port_count: 2,
        service_count: 2,
        new_ports: 0,
        closed_ports: 0,
        risky_port_count: 0,
        bytes_in: 1_000,
        bytes_out: 2_000,
        connection_count: 10,
    }
}

/// Writes under two tenants and checks that no read leaks across them.
async fn exercise_tenant_isolation(store: Arc<dyn Store>) {
    let a = Organization::new("tenant-a");
    let b = Organization::new("tenant-b");
    store.upsert_organization(&a).await.unwrap();
    store.upsert_organization(&b).await.unwrap();

    // Same IP in both tenants: two distinct devices.
    let dev_a = device(a.id, "192.168.1.10");
    let dev_b = device(b.id, "192.168.1.10");
    store.upsert_device(&dev_a).await.unwrap();
    store.upsert_device(&dev_b).await.unwrap();
    assert_ne!(dev_a.id, dev_b.id);

    let listed = store.list_devices(&a.id, &DeviceFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, dev_a.id);
    assert_eq!(listed[0].open_ports.len(), 2);

    // Cross-tenant reads and writes look like missing rows.
    let err = store.get_device(&b.id, &dev_a.id).await.unwrap_err();
    assert!(err.is_not_found());
    let err = store
        .set_device_status(&b.id, &dev_a.id, DeviceStatus::Retired)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // A tenant cannot attach findings to another tenant's scan.
    let mut scan_a = SecurityScan::new(a.id, ScanType::Security, "192.168.1.0/24", "standard");
    store.create_scan(&scan_a).await.unwrap();
    let mut smuggled = finding(&scan_a, &dev_b, Severity::High);
    smuggled.organization_id = b.id;
    let err = store.insert_findings(&b.id, &[smuggled]).await.unwrap_err();
    assert!(matches!(err, StoreError::ScanNotFound { .. }));

    store
        .insert_findings(&a.id, &[finding(&scan_a, &dev_a, Severity::High)])
        .await
        .unwrap();
    scan_a.start().unwrap();
    store.update_scan(&scan_a).await.unwrap();
    scan_a.complete(1, 1).unwrap();
    store.update_scan(&scan_a).await.unwrap();

    assert_eq!(
        store
            .list_findings(&a.id, &FindingFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(store
        .list_findings(&b.id, &FindingFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(store.get_scan(&b.id, &scan_a.id).await.is_err());
    assert_eq!(store.list_scans(&a.id, 10).await.unwrap().len(), 1);

    let anomaly = Anomaly {
        id: AnomalyId::new(),
        organization_id: a.id,
        device_id: Some(dev_a.id),
        anomaly_type: AnomalyType::UnusualPorts,
        severity: Severity::Medium,
        score: 0.68,
        description: "port count far above baseline".to_string(),
        status: AnomalyStatus::Open,
        detected_at: Utc::now(),
    };
    store.insert_anomaly(&anomaly).await.unwrap();
    assert!(store
        .list_anomalies(&b.id, &AnomalyFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .set_anomaly_status(&b.id, &anomaly.id, AnomalyStatus::Dismissed)
        .await
        .is_err());

    store.record_telemetry(&sample(a.id, &dev_a, 30)).await.unwrap();
    store.record_telemetry(&sample(a.id, &dev_a, 5)).await.unwrap();
    let recent = store
        .telemetry_since(&a.id, Utc::now() - Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert!(store
        .telemetry_since(&b.id, Utc::now() - Duration::days(1))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .organizations_with_telemetry()
        .await
        .unwrap()
        .contains(&a.id));
}

/// Counts beyond `i32::MAX` survive a write and read, and devices seen at the
/// same instant list in numeric IP order.
async fn exercise_large_counts_and_ip_order(store: Arc<dyn Store>) {
    let org = Organization::new("wide-counts");
    store.upsert_organization(&org).await.unwrap();

    let seen = Utc::now();
    for ip in ["10.0.0.10", "10.0.0.2", "10.0.0.1"] {
        let mut d = device(org.id, ip);
        d.last_seen = seen;
        store.upsert_device(&d).await.unwrap();
    }
    let ips: Vec<String> = store
        .list_devices(&org.id, &DeviceFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|d| d.ip_address.to_string())
        .collect();
    assert_eq!(ips, ["10.0.0.1", "10.0.0.2", "10.0.0.10"]);

    let dev = device(org.id, "10.0.0.1");
    let mut wide = sample(org.id, &dev, 1);
    wide.new_ports = 3_000_000_000;
    wide.closed_ports = u32::MAX;
    store.record_telemetry(&wide).await.unwrap();
    let stored = store
        .telemetry_since(&org.id, Utc::now() - Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].new_ports, 3_000_000_000);
    assert_eq!(stored[0].closed_ports, u32::MAX);

    let mut scan = SecurityScan::new(org.id, ScanType::Network, "10.0.0.0/8", "quick");
    store.create_scan(&scan).await.unwrap();
    scan.start().unwrap();
    store.update_scan(&scan).await.unwrap();
    scan.complete(u32::MAX, 0).unwrap();
    store.update_scan(&scan).await.unwrap();
    assert_eq!(
        store.get_scan(&org.id, &scan.id).await.unwrap().devices_found,
        u32::MAX
    );
}

#[tokio::test]
async fn memory_keeps_large_counts_and_ip_order() {
    exercise_large_counts_and_ip_order(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn memory_store_isolates_tenants() {
    exercise_tenant_isolation(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn memory_ensure_organization_registers_once() {
    let store = MemoryStore::new();
    let id = OrgId::new();

    let first = ensure_organization(&store, &id, "lab").await.unwrap();
    let second = ensure_organization(&store, &id, "other-name").await.unwrap();
    assert_eq!(first.name, "lab");
    assert_eq!(second.name, "lab");
    assert_eq!(store.list_organizations().await.unwrap().len(), 1);
}

async fn connect_or_skip() -> Option<PgStore> {
    let config = DatabaseConfig::load("netguard").ok()?;
    match PgStore::connect(&config).await {
        Ok(store) => {
            store.migrate().await.ok()?;
            Some(store)
        }
        Err(e) => {
            eprintln!("Skipping integration test (PostgreSQL not available): {e}");
            None
        }
    }
}

#[tokio::test]
#[ignore = "requires live PostgreSQL: cargo test --package netguard-store --test integration -- --ignored"]
async fn pg_store_isolates_tenants() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    exercise_tenant_isolation(Arc::new(store)).await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL: cargo test --package netguard-store --test integration -- --ignored"]
async fn pg_upsert_preserves_first_seen_and_retirement() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let org = Organization::new("pg-upsert");
    store.upsert_organization(&org).await.unwrap();

    let mut original = device(org.id, "10.20.30.40");
    original.first_seen = Utc::now() - Duration::days(3);
    Store::upsert_device(&store, &original).await.unwrap();
    Store::set_device_status(&store, &org.id, &original.id, DeviceStatus::Retired)
        .await
        .unwrap();

    let rediscovered = device(org.id, "10.20.30.40");
    Store::upsert_device(&store, &rediscovered).await.unwrap();

    let stored = Store::get_device(&store, &org.id, &original.id).await.unwrap();
    assert_eq!(stored.status, DeviceStatus::Retired);
    assert!(stored.first_seen < rediscovered.first_seen);
}

#[tokio::test]
#[ignore = "requires live PostgreSQL: cargo test --package netguard-store --test integration -- --ignored"]
async fn pg_keeps_large_counts_and_ip_order() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    exercise_large_counts_and_ip_order(Arc::new(store)).await;
}

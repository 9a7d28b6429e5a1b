//! Scoring runs over an in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};

use netguard_anomaly::{AnomalyConfig, AnomalyEngine, ScoringReport};
use netguard_core::events::{EventPayload, MemorySink};
use netguard_core::{AnomalyStatus, AnomalyType, DeviceId, OrgId, Organization, Severity, TelemetrySample};
use netguard_journal::{FileJournalStore, JournalQuery, JournalStore};
use netguard_store::{AnomalyFilter, MemoryStore, Store};

fn baseline(org: OrgId, device_id: DeviceId, hours_ago: i64) -> TelemetrySample {
    TelemetrySample {
        organization_id: org,
        device_id,
        observed_at: Utc::now() - Duration::hours(hours_ago),
        open_port_count: 3,
        service_count: 3,
        new_ports: 0,
        closed_ports: 0,
        risky_port_count: 0,
        bytes_in: 20_000,
        bytes_out: 15_000,
        connection_count: 40,
    }
}

struct Fleet {
    store: Arc<MemoryStore>,
    sink: Arc<MemorySink>,
    org: OrgId,
    noisy: DeviceId,
}

/// Twenty quiet devices with three identical samples each, plus one device
/// whose latest sample shows a connection burst.
async fn fleet() -> Fleet {
    let store = Arc::new(MemoryStore::new());
    let org = Organization::new("acme");
    store.upsert_organization(&org).await.unwrap();

    let devices: Vec<DeviceId> = (0..20).map(|_| DeviceId::new()).collect();
    for hours_ago in [48, 24, 1] {
        for device in &devices {
            store
                .record_telemetry(&baseline(org.id, *device, hours_ago))
                .await
                .unwrap();
        }
    }

    let noisy = devices[7];
    let mut burst = baseline(org.id, noisy, 0);
    burst.connection_count = 250_000;
    store.record_telemetry(&burst).await.unwrap();

    Fleet {
        store,
        sink: Arc::new(MemorySink::default()),
        org: org.id,
        noisy,
    }
}

fn engine(fleet: &Fleet) -> AnomalyEngine {
    AnomalyEngine::new(fleet.store.clone(), fleet.sink.clone()).with_config(AnomalyConfig {
        seed: Some(42),
        ..Default::default()
    })
}

#[tokio::test]
async fn flags_only_the_outlying_device() {
    let fleet = fleet().await;
    let report = engine(&fleet).score_organization(&fleet.org).await.unwrap();

    let ScoringReport::Scored {
        samples,
        devices_scored,
        anomalies,
        ..
    } = &report
    else {
        panic!("expected a scored report, got {report:?}");
    };
    assert_eq!(*samples, 61);
    assert_eq!(*devices_scored, 20);
    assert_eq!(anomalies.len(), 1);

    let anomaly = &anomalies[0];
    assert_eq!(anomaly.device_id, Some(fleet.noisy));
    assert_eq!(anomaly.anomaly_type, AnomalyType::ConnectionBurst);
    assert_eq!(anomaly.severity, Severity::Critical);
    assert_eq!(anomaly.status, AnomalyStatus::Open);
    assert!(anomaly.score >= 0.8 && anomaly.score < 1.0);

    let stored = fleet
        .store
        .list_anomalies(&fleet.org, &AnomalyFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);

    let events = fleet.sink.events_for(&fleet.org);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].payload,
        EventPayload::AnomalyDetected {
            anomaly_type: AnomalyType::ConnectionBurst,
            ..
        }
    ));
}

#[tokio::test]
async fn open_anomaly_suppresses_repeat() {
    let fleet = fleet().await;
    let engine = engine(&fleet);

    engine.score_organization(&fleet.org).await.unwrap();
    let second = engine.score_organization(&fleet.org).await.unwrap();

    assert!(second.anomalies().is_empty());
    assert!(matches!(second, ScoringReport::Scored { suppressed: 1, .. }));
    assert_eq!(
        fleet
            .store
            .list_anomalies(&fleet.org, &AnomalyFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn resolved_anomaly_can_be_raised_again() {
    let fleet = fleet().await;
    let engine = engine(&fleet);

    let first = engine.score_organization(&fleet.org).await.unwrap();
    let id = first.anomalies()[0].id;
    fleet
        .store
        .set_anomaly_status(&fleet.org, &id, AnomalyStatus::Resolved)
        .await
        .unwrap();

    let second = engine.score_organization(&fleet.org).await.unwrap();
    assert_eq!(second.anomalies().len(), 1);
}

#[tokio::test]
async fn short_history_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let org = Organization::new("tiny");
    store.upsert_organization(&org).await.unwrap();
    for hours_ago in 0..10 {
        store
            .record_telemetry(&baseline(org.id, DeviceId::new(), hours_ago))
            .await
            .unwrap();
    }

    let engine = AnomalyEngine::new(store.clone(), Arc::new(MemorySink::default()));
    let report = engine.score_organization(&org.id).await.unwrap();
    assert!(matches!(
        report,
        ScoringReport::Skipped {
            samples: 10,
            required: 32,
            ..
        }
    ));
}

#[tokio::test]
async fn history_window_excludes_old_samples() {
    let fleet = fleet().await;
    let engine = AnomalyEngine::new(fleet.store.clone(), fleet.sink.clone()).with_config(
        AnomalyConfig {
            history_days: 0,
            seed: Some(42),
            ..Default::default()
        },
    );
    assert!(engine.score_organization(&fleet.org).await.unwrap().is_skipped());
}

#[tokio::test]
async fn score_all_covers_every_org_and_journals() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(FileJournalStore::new(dir.path()).unwrap());
    let fleet = fleet().await;

    let other = Organization::new("globex");
    fleet.store.upsert_organization(&other).await.unwrap();
    fleet
        .store
        .record_telemetry(&baseline(other.id, DeviceId::new(), 2))
        .await
        .unwrap();

    let engine = engine(&fleet).with_journal(journal.clone());
    let reports = engine.score_all().await.unwrap();
    assert_eq!(reports.len(), 2);

    let acme = reports.iter().find(|r| r.organization_id() == fleet.org).unwrap();
    assert_eq!(acme.anomalies().len(), 1);
    let globex = reports.iter().find(|r| r.organization_id() == other.id).unwrap();
    assert!(globex.is_skipped());

    let entries = journal.list(&JournalQuery::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.component == "netguard-anomaly"));
    assert_eq!(journal.verify_chain(&fleet.org).unwrap().entries, 1);
}

#[tokio::test]
async fn tenant_scope_scores_only_that_org() {
    let fleet = fleet().await;
    let other = Organization::new("initech");
    fleet.store.upsert_organization(&other).await.unwrap();
    fleet
        .store
        .record_telemetry(&baseline(other.id, DeviceId::new(), 2))
        .await
        .unwrap();

    let engine = engine(&fleet);
    let scoped = engine.score_scope(Some(&other.id)).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].organization_id(), other.id);
    assert!(fleet.sink.events_for(&fleet.org).is_empty());

    let everyone = engine.score_scope(None).await.unwrap();
    assert_eq!(everyone.len(), 2);
}

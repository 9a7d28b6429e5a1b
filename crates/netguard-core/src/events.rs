//! Event types for the notification surface.
//!
//! Pipeline stages publish events to an [`EventSink`]. Sinks decide where
//! they go: structured logs, an in-memory buffer, or several at once.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    AnomalyId, AnomalyType, DeviceId, DeviceType, FindingId, OrgId, ScanId, ScanType, Severity,
};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by a NetGuard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetguardEvent {
    pub id: EventId,
    pub organization_id: OrgId,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub payload: EventPayload,
}

impl NetguardEvent {
    pub fn new(organization_id: OrgId, source: EventSource, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            organization_id,
            timestamp: Utc::now(),
            source,
            payload,
        }
    }
}

/// Which service emitted the event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Discover,
    Vuln,
    Anomaly,
    Api,
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Scan lifecycle ────────────────────────────────────────
    ScanStarted {
        scan_id: ScanId,
        scan_type: ScanType,
        target: String,
    },
    ScanCompleted {
        scan_id: ScanId,
        devices_found: u32,
        new_devices: u32,
        offline_devices: u32,
        findings_count: u32,
        duration_ms: u64,
    },
    ScanFailed {
        scan_id: ScanId,
        error: String,
    },

    // ── Discovery ─────────────────────────────────────────────
    /// A device was seen for the first time.
    DeviceDiscovered {
        device_id: DeviceId,
        ip_address: String,
        device_type: DeviceType,
    },
    /// A known device was missing from a scan of its range.
    DeviceOffline {
        device_id: DeviceId,
        ip_address: String,
    },

    // ── Findings ──────────────────────────────────────────────
    FindingRaised {
        finding_id: FindingId,
        device_id: DeviceId,
        severity: Severity,
        title: String,
        cve_id: Option<String>,
    },

    // ── Anomalies ─────────────────────────────────────────────
    AnomalyDetected {
        anomaly_id: AnomalyId,
        device_id: Option<DeviceId>,
        anomaly_type: AnomalyType,
        severity: Severity,
        score: f64,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ScanStarted { .. } => "ScanStarted",
            Self::ScanCompleted { .. } => "ScanCompleted",
            Self::ScanFailed { .. } => "ScanFailed",
            Self::DeviceDiscovered { .. } => "DeviceDiscovered",
            Self::DeviceOffline { .. } => "DeviceOffline",
            Self::FindingRaised { .. } => "FindingRaised",
            Self::AnomalyDetected { .. } => "AnomalyDetected",
        }
    }

    /// Severity attached to the payload, if any.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::FindingRaised { severity, .. } | Self::AnomalyDetected { severity, .. } => {
                Some(*severity)
            }
            Self::ScanFailed { .. } => Some(Severity::Medium),
            _ => None,
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────

/// Destination for published events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &NetguardEvent);
}

/// Emits each event as a structured tracing record. Urgent events log at
/// `warn`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &NetguardEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        let urgent = event.payload.severity().is_some_and(|s| s.is_urgent());
        if urgent {
            tracing::warn!(
                event_id = %event.id.0,
                org = %event.organization_id,
                source = ?event.source,
                event_type = event.payload.event_type(),
                payload = %payload,
                "NetGuard alert"
            );
        } else {
            tracing::info!(
                event_id = %event.id.0,
                org = %event.organization_id,
                source = ?event.source,
                event_type = event.payload.event_type(),
                payload = %payload,
                "NetGuard event"
            );
        }
    }
}

/// Keeps the most recent events in memory.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    events: Mutex<Vec<NetguardEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of buffered events, oldest first.
    pub fn events(&self) -> Vec<NetguardEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Buffered events for one organization, oldest first.
    pub fn events_for(&self, org: &OrgId) -> Vec<NetguardEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.organization_id == org)
            .collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &NetguardEvent) {
        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.capacity {
                events.remove(0);
            }
            events.push(event.clone());
        }
    }
}

/// Forwards every event to each of its sinks.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: &NetguardEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_failed(org: OrgId) -> NetguardEvent {
        NetguardEvent::new(
            org,
            EventSource::Discover,
            EventPayload::ScanFailed {
                scan_id: ScanId::new(),
                error: "boom".to_string(),
            },
        )
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = NetguardEvent::new(
            OrgId::new(),
            EventSource::Discover,
            EventPayload::DeviceDiscovered {
                device_id: DeviceId::new(),
                ip_address: "10.0.1.1".to_string(),
                device_type: DeviceType::Router,
            },
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: NetguardEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, deserialized.id);
    }

    #[test]
    fn event_payload_tags() {
        let payload = EventPayload::FindingRaised {
            finding_id: FindingId::new(),
            device_id: DeviceId::new(),
            severity: Severity::Critical,
            title: "EternalBlue".to_string(),
            cve_id: Some("CVE-2017-0144".to_string()),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"FindingRaised\""));
        assert_eq!(payload.event_type(), "FindingRaised");
        assert_eq!(payload.severity(), Some(Severity::Critical));
    }

    #[test]
    fn memory_sink_drops_oldest_when_full() {
        let sink = MemorySink::new(2);
        let org = OrgId::new();
        let first = scan_failed(org);
        sink.publish(&first);
        sink.publish(&scan_failed(org));
        sink.publish(&scan_failed(org));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.id != first.id));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::default());
        let b = Arc::new(MemorySink::default());
        let fanout = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(LogSink));

        let org = OrgId::new();
        fanout.publish(&scan_failed(org));

        assert_eq!(a.events_for(&org).len(), 1);
        assert_eq!(b.events_for(&org).len(), 1);
        assert!(b.events_for(&OrgId::new()).is_empty());
    }
}

//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use netguard_anomaly::AnomalyEngine;
use netguard_core::events::MemorySink;
use netguard_discover::ScanPipeline;
use netguard_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub pipeline: Arc<ScanPipeline>,
    pub anomaly: Arc<AnomalyEngine>,
    /// Recent events for the `/api/events` view.
    pub recent: Arc<MemorySink>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Arc<ScanPipeline>,
        anomaly: Arc<AnomalyEngine>,
        recent: Arc<MemorySink>,
    ) -> Self {
        Self {
            store,
            pipeline,
            anomaly,
            recent,
            started_at: Instant::now(),
        }
    }
}

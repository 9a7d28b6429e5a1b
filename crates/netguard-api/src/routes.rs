//! API route definitions.

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::*;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Network discovery
        .route("/api/network/scan", post(start_network_scan))
        .route("/api/network/devices", get(list_devices))
        .route("/api/network/devices/:id/status", patch(set_device_status))
        // Security scanning
        .route("/api/security/scan", post(start_security_scan))
        .route("/api/security/scans", get(list_scans))
        .route("/api/security/scans/:id", get(get_scan))
        .route("/api/security/findings", get(list_findings))
        .route("/api/security/findings/:id", patch(set_finding_status))
        // Anomalies
        .route("/api/anomalies/list", get(list_anomalies))
        .route("/api/anomalies/score", post(score_anomalies))
        .route("/api/anomalies/:id", patch(set_anomaly_status))
        .route("/api/telemetry", post(ingest_telemetry))
        .route("/api/organizations", post(create_organization))
        .route("/api/events", get(recent_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

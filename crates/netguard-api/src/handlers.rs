//! Request handlers. Every tenant-scoped handler takes a [`Tenant`] and
//! passes its organization to the store; nothing reads across tenants.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use netguard_anomaly::ScoringReport;
use netguard_core::events::NetguardEvent;
use netguard_core::{
    Anomaly, AnomalyId, AnomalyStatus, DeviceId, DeviceStatus, FindingId, FindingStatus,
    NetworkDevice, OrgId, Organization, ScanId, ScanType, SecurityFinding, SecurityScan,
    TelemetrySample,
};
use netguard_discover::ScanRequest;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::state::AppState;
use crate::tenant::Tenant;

type Reply<T> = Result<Json<ApiResponse<T>>>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>)>;

const DEFAULT_SCAN_LIMIT: u32 = 50;
const DEFAULT_EVENT_LIMIT: usize = 100;

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

// ── Scans ────────────────────────────────────────────────────────

pub async fn start_network_scan(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Json(body): Json<StartScanRequest>,
) -> Created<SecurityScan> {
    start_scan(state, org, ScanType::Network, body).await
}

pub async fn start_security_scan(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Json(body): Json<StartScanRequest>,
) -> Created<SecurityScan> {
    start_scan(state, org, ScanType::Security, body).await
}

/// Persist the scan as `pending` and run it in the background.
async fn start_scan(
    state: AppState,
    org: OrgId,
    scan_type: ScanType,
    body: StartScanRequest,
) -> Created<SecurityScan> {
    let request = ScanRequest::new(&body.target, scan_type, body.profile.unwrap_or_default());
    let scan = state.pipeline.begin(&org, &request).await?;

    let pipeline = state.pipeline.clone();
    let pending = scan.clone();
    tokio::spawn(async move {
        let scan_id = pending.id;
        if let Err(e) = pipeline.execute(pending).await {
            tracing::warn!(scan_id = %scan_id, error = %e, "Background scan failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(scan))))
}

pub async fn list_scans(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Query(query): Query<ScanListQuery>,
) -> Reply<Vec<SecurityScan>> {
    let scans = state
        .store
        .list_scans(&org, query.limit.unwrap_or(DEFAULT_SCAN_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(scans)))
}

pub async fn get_scan(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Path(id): Path<Uuid>,
) -> Reply<SecurityScan> {
    let scan = state.store.get_scan(&org, &ScanId(id)).await?;
    Ok(Json(ApiResponse::success(scan)))
}

// ── Devices ──────────────────────────────────────────────────────

pub async fn list_devices(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Query(query): Query<DeviceQuery>,
) -> Reply<Vec<NetworkDevice>> {
    let devices = state.store.list_devices(&org, &query.into()).await?;
    Ok(Json(ApiResponse::success(devices)))
}

/// Setting `retired` is the soft delete.
pub async fn set_device_status(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdate<DeviceStatus>>,
) -> Reply<NetworkDevice> {
    let id = DeviceId(id);
    state.store.set_device_status(&org, &id, body.status).await?;
    tracing::info!(org = %org, device_id = %id, status = %body.status, "Device status updated");
    let device = state.store.get_device(&org, &id).await?;
    Ok(Json(ApiResponse::success(device)))
}

// ── Findings ─────────────────────────────────────────────────────

pub async fn list_findings(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Query(query): Query<FindingQuery>,
) -> Reply<Vec<SecurityFinding>> {
    let findings = state.store.list_findings(&org, &query.into()).await?;
    Ok(Json(ApiResponse::success(findings)))
}

pub async fn set_finding_status(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdate<FindingStatus>>,
) -> Reply<StatusUpdated> {
    state
        .store
        .set_finding_status(&org, &FindingId(id), body.status)
        .await?;
    tracing::info!(org = %org, finding_id = %id, status = %body.status, "Finding status updated");
    Ok(Json(ApiResponse::success(StatusUpdated {
        id,
        status: body.status.to_string(),
    })))
}

// ── Anomalies ────────────────────────────────────────────────────

pub async fn list_anomalies(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Query(query): Query<AnomalyQuery>,
) -> Reply<Vec<Anomaly>> {
    let anomalies = state.store.list_anomalies(&org, &query.into()).await?;
    Ok(Json(ApiResponse::success(anomalies)))
}

pub async fn set_anomaly_status(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdate<AnomalyStatus>>,
) -> Reply<StatusUpdated> {
    state
        .store
        .set_anomaly_status(&org, &AnomalyId(id), body.status)
        .await?;
    tracing::info!(org = %org, anomaly_id = %id, status = %body.status, "Anomaly status updated");
    Ok(Json(ApiResponse::success(StatusUpdated {
        id,
        status: body.status.to_string(),
    })))
}

pub async fn score_anomalies(
    State(state): State<AppState>,
    Tenant(org): Tenant,
) -> Reply<ScoringReport> {
    let report = state.anomaly.score_organization(&org).await?;
    Ok(Json(ApiResponse::success(report)))
}

// ── Telemetry ────────────────────────────────────────────────────

pub async fn ingest_telemetry(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Json(body): Json<TelemetryIngest>,
) -> Created<TelemetrySample> {
    let device_id = DeviceId(body.device_id);
    // The device must belong to the tenant.
    state.store.get_device(&org, &device_id).await?;

    let sample = TelemetrySample {
        organization_id: org,
        device_id,
        observed_at: body.observed_at.unwrap_or_else(Utc::now),
        open_port_count: body.open_port_count,
        service_count: body.service_count,
        new_ports: body.new_ports,
        closed_ports: body.closed_ports,
        risky_port_count: body.risky_port_count,
        bytes_in: body.bytes_in,
        bytes_out: body.bytes_out,
        connection_count: body.connection_count,
    };
    state.store.record_telemetry(&sample).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(sample))))
}

// ── Organizations and events ─────────────────────────────────────

/// Bootstrap a tenant. Not tenant-scoped.
pub async fn create_organization(
    State(state): State<AppState>,
    Json(body): Json<CreateOrganization>,
) -> Created<Organization> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("organization name is required".to_string()));
    }

    let mut org = Organization::new(name);
    if let Some(id) = body.id {
        org.id = OrgId::parse(&id.to_string())?;
        if state.store.get_organization(&org.id).await.is_ok() {
            return Err(ApiError::Conflict(format!("organization {} already exists", org.id)));
        }
    }

    state.store.upsert_organization(&org).await?;
    tracing::info!(org = %org.id, name = %org.name, "Organization created");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(org))))
}

/// Most recent events for the tenant, newest last.
pub async fn recent_events(
    State(state): State<AppState>,
    Tenant(org): Tenant,
    Query(query): Query<EventQuery>,
) -> Json<ApiResponse<Vec<NetguardEvent>>> {
    let mut events = state.recent.events_for(&org);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    if events.len() > limit {
        events.drain(..events.len() - limit);
    }
    Json(ApiResponse::success(events))
}

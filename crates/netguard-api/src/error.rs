//! API errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use netguard_anomaly::AnomalyError;
use netguard_core::NetguardError;
use netguard_discover::DiscoverError;
use netguard_store::StoreError;

use crate::models::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } | StoreError::ScanNotFound { .. } => {
                Self::NotFound(e.to_string())
            }
            StoreError::InvalidTransition { .. } | StoreError::Conflict { .. } => {
                Self::Conflict(e.to_string())
            }
            StoreError::TenantMismatch { .. } => Self::BadRequest(e.to_string()),
            StoreError::Connection(_) | StoreError::Database(_) | StoreError::Serialization(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<NetguardError> for ApiError {
    fn from(e: NetguardError) -> Self {
        match e {
            NetguardError::InvalidInput(_) | NetguardError::Config(_) => {
                Self::BadRequest(e.to_string())
            }
            NetguardError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            NetguardError::Serialization(_) | NetguardError::Internal(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<DiscoverError> for ApiError {
    fn from(e: DiscoverError) -> Self {
        match e {
            DiscoverError::Store(e) => e.into(),
            DiscoverError::Core(e) => e.into(),
            DiscoverError::InvalidTarget(_)
            | DiscoverError::TargetTooLarge { .. }
            | DiscoverError::Config(_) => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AnomalyError> for ApiError {
    fn from(e: AnomalyError) -> Self {
        match e {
            AnomalyError::Store(e) => e.into(),
            AnomalyError::Core(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_core::{OrgId, ScanId, ScanStatus};

    #[test]
    fn store_errors_map_to_statuses() {
        let org = OrgId::new();
        let missing: ApiError = StoreError::ScanNotFound {
            scan_id: ScanId::new(),
            organization_id: org,
        }
        .into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let terminal: ApiError = StoreError::InvalidTransition {
            scan_id: ScanId::new(),
            from: ScanStatus::Completed,
            to: ScanStatus::Running,
        }
        .into();
        assert_eq!(terminal.status(), StatusCode::CONFLICT);

        let db: ApiError = StoreError::Connection("refused".to_string()).into();
        assert_eq!(db.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_targets_are_client_errors() {
        let e: ApiError = DiscoverError::InvalidTarget("target is empty".to_string()).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }
}

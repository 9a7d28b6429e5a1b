//! Tenant selection from the `X-Organization-Id` header.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use netguard_core::OrgId;

use crate::error::ApiError;
use crate::state::AppState;

pub const TENANT_HEADER: &str = "x-organization-id";

/// The organization a request acts on. Extraction fails with 400 when the
/// header is missing or malformed and with 404 when the organization is
/// unknown.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub OrgId);

#[async_trait]
impl FromRequestParts<AppState> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| ApiError::BadRequest("X-Organization-Id header is required".to_string()))?
            .to_str()
            .map_err(|_| ApiError::BadRequest("X-Organization-Id is not valid text".to_string()))?;

        let org = OrgId::parse(raw)?;
        state.store.get_organization(&org).await?;
        Ok(Self(org))
    }
}

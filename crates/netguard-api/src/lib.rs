//! netguard-api: REST surface over the NetGuard store, scan pipeline, and
//! anomaly engine.
//!
//! Every tenant-scoped route requires an `X-Organization-Id` header and
//! returns the `{ success, data, error }` envelope.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod tenant;

pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use models::ApiResponse;
pub use routes::create_router;
pub use state::AppState;
pub use tenant::{Tenant, TENANT_HEADER};

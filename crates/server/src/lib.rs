//! HTTP API server for the Alcove settings store.
//!
//! This crate provides the HTTP control plane:
//! - Entry CRUD endpoints
//! - Streaming list endpoint with filter, ordering, and pagination
//! - Bulk upload endpoint with bounded-concurrency ingestion
//! - Tenant provisioning and health check

pub mod error;
pub mod handlers;
pub mod identity;
pub mod ingest;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use identity::Identity;
pub use routes::create_router;
pub use state::AppState;

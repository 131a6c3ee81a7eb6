//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart upload intake for full conversions and previews
//! - Server-sent-event progress streaming
//! - Frame artifact retrieval with tier fallback
//! - Background reaping of expired workspaces
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod upload;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::WorkspaceReaper;
pub use state::AppState;

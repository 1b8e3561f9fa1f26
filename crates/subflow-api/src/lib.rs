//! Axum HTTP API server.
//!
//! This crate provides:
//! - RevenueCat webhook ingestion with shared-secret auth
//! - Renewal detection and credit allocation per event
//! - Internal credit balance lookups
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{EntitlementObserver, EntitlementService, EntitlementUpdate, ProcessedEvent};
pub use state::AppState;

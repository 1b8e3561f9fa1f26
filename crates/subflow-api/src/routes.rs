//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::credits::get_credit_balance;
use crate::handlers::health::{health, ready};
use crate::handlers::webhook::revenuecat_webhook;
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    // Webhook deliveries come from one provider; a tighter limit still
    // leaves headroom over its delivery rate.
    let webhook_rate_limiter = std::sync::Arc::new(RateLimiterCache::new(5, 20));

    let webhook_routes = Router::new()
        .route("/webhooks/revenuecat", post(revenuecat_webhook))
        .layer(middleware::from_fn_with_state(
            webhook_rate_limiter,
            rate_limit_middleware,
        ));

    let api_routes = Router::new()
        .route("/users/:uid/credits", get(get_credit_balance))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Request body size limit; webhook payloads are small
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

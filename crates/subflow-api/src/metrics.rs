//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use subflow_models::AllocationStrategy;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "subflow_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "subflow_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "subflow_http_requests_in_flight";

    // Webhook and entitlement metrics
    pub const WEBHOOK_EVENTS_TOTAL: &str = "subflow_webhook_events_total";
    pub const WEBHOOK_REJECTED_TOTAL: &str = "subflow_webhook_rejected_total";
    pub const RENEWALS_DETECTED_TOTAL: &str = "subflow_renewals_detected_total";
    pub const PLAN_CHANGES_TOTAL: &str = "subflow_plan_changes_total";
    pub const CREDIT_ALLOCATIONS_TOTAL: &str = "subflow_credit_allocations_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "subflow_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a received webhook event by type.
pub fn record_webhook_event(event_type: &str) {
    let labels = [("type", event_type.to_string())];
    counter!(names::WEBHOOK_EVENTS_TOTAL, &labels).increment(1);
}

/// Record a rejected webhook delivery.
pub fn record_webhook_rejected(reason: &'static str) {
    let labels = [("reason", reason)];
    counter!(names::WEBHOOK_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a detected subscription renewal.
pub fn record_renewal() {
    counter!(names::RENEWALS_DETECTED_TOTAL).increment(1);
}

/// Record a detected plan change.
pub fn record_plan_change(direction: &'static str) {
    let labels = [("direction", direction)];
    counter!(names::PLAN_CHANGES_TOTAL, &labels).increment(1);
}

/// Record a credit allocation by strategy.
pub fn record_allocation(strategy: AllocationStrategy) {
    let labels = [("strategy", strategy.as_str())];
    counter!(names::CREDIT_ALLOCATIONS_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove user ids).
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut segments = path.split('/');
    while let Some(segment) = segments.next() {
        out.push(segment.to_string());
        if segment == "users" && segments.next().is_some() {
            out.push(":uid".to_string());
        }
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/users/firebase-uid-123/credits"),
            "/api/users/:uid/credits"
        );
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/api/users/abc"), "/api/users/:uid");
    }
}

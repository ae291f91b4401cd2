//! Metrics tracking middleware
//!
//! Tracks request latency and counts per route, plus the credential
//! lifecycle counters (authentication outcomes, revocations, failed
//! background work). Everything lives in a process-wide Prometheus
//! registry rendered by [`render`].

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        #[cfg(target_os = "linux")]
        if let Err(e) = registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        )) {
            tracing::warn!(error = %e, "Process metrics unavailable");
        }
        registry
    };

    static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "vigil_http_requests_total",
        "HTTP requests by method, route and status",
        &["method", "endpoint", "status"],
        REGISTRY
    )
    .expect("metric can be registered");

    static ref HTTP_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "vigil_http_request_duration_seconds",
        "HTTP request latency by method and route",
        &["method", "endpoint"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
        REGISTRY
    )
    .expect("metric can be registered");

    static ref AUTH_ATTEMPTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "vigil_auth_attempts_total",
        "Authentication attempts by credential type and outcome",
        &["method", "outcome"],
        REGISTRY
    )
    .expect("metric can be registered");

    static ref REVOCATIONS: IntCounterVec = register_int_counter_vec_with_registry!(
        "vigil_revocations_total",
        "Revoked credentials by scope",
        &["scope"],
        REGISTRY
    )
    .expect("metric can be registered");

    static ref BACKGROUND_FAILURES: IntCounterVec = register_int_counter_vec_with_registry!(
        "vigil_background_failures_total",
        "Detached tasks that failed and were swallowed",
        &["task"],
        REGISTRY
    )
    .expect("metric can be registered");
}

/// Metrics tracking middleware
///
/// Labels use the matched route template when available so ids never
/// become label values.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| normalize_endpoint(request.uri().path()));

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
        .inc();
    HTTP_DURATION
        .with_label_values(&[method.as_str(), endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Count an authentication attempt. `method` is "api_key", "bearer" or "password".
pub fn record_auth_attempt(method: &str, outcome: &str) {
    AUTH_ATTEMPTS.with_label_values(&[method, outcome]).inc();
}

/// Count credentials revoked in one operation
pub fn record_revocations(scope: &str, count: u64) {
    if count > 0 {
        REVOCATIONS.with_label_values(&[scope]).inc_by(count);
    }
}

/// Count a swallowed failure in detached work
pub fn record_background_failure(task: &str) {
    BACKGROUND_FAILURES.with_label_values(&[task]).inc();
}

/// Render the registry in the Prometheus text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Normalize endpoint paths for consistent metrics
///
/// Replaces UUID/ID segments with placeholders to group similar endpoints
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_uuid(seg) || is_numeric(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string looks like a UUID
fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// Check if a string is numeric (likely an ID)
fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/api/users/123"), "/api/users/:id");
        assert_eq!(
            normalize_endpoint("/api/sessions/550e8400-e29b-41d4-a716-446655440000"),
            "/api/sessions/:id"
        );
        assert_eq!(normalize_endpoint("/api/sessions/me"), "/api/sessions/me");
        assert_eq!(normalize_endpoint("/health"), "/health");
    }

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid("123"));
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("123"));
        assert!(!is_numeric("abc"));
        assert!(!is_numeric("12a"));
        assert!(!is_numeric(""));
    }

    #[test]
    fn test_counters_are_rendered() {
        record_auth_attempt("api_key", "invalid");
        record_revocations("all", 3);
        record_revocations("all", 0);
        record_background_failure("audit_write");

        let text = render().unwrap();
        assert!(text.contains("vigil_auth_attempts_total{method=\"api_key\",outcome=\"invalid\"}"));
        assert!(text.contains("vigil_revocations_total{scope=\"all\"}"));
        assert!(text.contains("vigil_background_failures_total{task=\"audit_write\"}"));
    }
}

//! Prometheus metrics for the csvhub API
//!
//! Compiled only with the `metrics` feature.
//!
//! - `csvhub_http_requests_total{method,route,status}`
//! - `csvhub_http_request_duration_seconds{method,route}`
//! - `csvhub_operations_total{operation,status}`: uploads and joins by outcome
//! - `csvhub_fetch_duration_seconds{outcome}`: remote API calls made by joins
//! - `csvhub_join_output_rows`: size of each stored join result

use axum::{
    extract::{MatchedPath, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_counter_vec, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::time::{Duration, Instant};

lazy_static! {
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "csvhub_http_requests_total",
        "HTTP requests by route template and status",
        &["method", "route", "status"]
    )
    .unwrap();

    pub static ref HTTP_LATENCY: HistogramVec = register_histogram_vec!(
        "csvhub_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "route"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref OPERATIONS: CounterVec = register_counter_vec!(
        "csvhub_operations_total",
        "Catalog operations by outcome",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref FETCH_LATENCY: HistogramVec = register_histogram_vec!(
        "csvhub_fetch_duration_seconds",
        "Remote API fetch latency in seconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref JOIN_ROWS: Histogram = register_histogram!(
        "csvhub_join_output_rows",
        "Rows in each stored join result",
        exponential_buckets(1.0, 10.0, 7).unwrap()
    )
    .unwrap();
}

/// Middleware counting requests per route template.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", |p| p.as_str())
        .to_owned();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS
        .with_label_values(&[&method, &route, &status])
        .inc();
    HTTP_LATENCY
        .with_label_values(&[&method, &route])
        .observe(start.elapsed().as_secs_f64());
    response
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
        buffer,
    )
        .into_response()
}

pub fn record_operation(operation: &str, status: &str) {
    OPERATIONS.with_label_values(&[operation, status]).inc();
}

/// `outcome` is `success`, `timeout` or `error`.
pub fn observe_fetch(outcome: &str, elapsed: Duration) {
    FETCH_LATENCY
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn observe_join_rows(rows: usize) {
    JOIN_ROWS.observe(rows as f64);
}

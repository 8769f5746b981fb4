//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (RPS, latency, rejections, breaker state)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): limiter rejections by route
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_fallbacks_total` (counter): fallbacks by route and reason
//! - `gateway_retries_total` (counter): second attempts by route
//! - `gateway_registry_syncs_total` (counter): registry polls by outcome
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Labels for route, method, status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::BreakerMode;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route: &str) {
    counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_breaker_state(route: &str, mode: BreakerMode) {
    gauge!("gateway_breaker_state", "route" => route.to_string()).set(mode.as_gauge());
}

pub fn record_fallback(route: &str, reason: &'static str) {
    counter!("gateway_fallbacks_total", "route" => route.to_string(), "reason" => reason).increment(1);
}

pub fn record_retry(route: &str) {
    counter!("gateway_retries_total", "route" => route.to_string()).increment(1);
}

pub fn record_registry_sync(source: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("gateway_registry_syncs_total", "source" => source, "outcome" => outcome).increment(1);
}

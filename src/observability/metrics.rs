//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by service, status
//! - `gateway_request_duration_seconds` (histogram): latency by service
//! - `gateway_rate_limited_total` (counter): denials by traffic class
//! - `gateway_auth_failures_total` (counter): rejections by reason
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_events_total` / `gateway_events_dropped_total` (counters)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitStatus;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(service: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &str) {
    counter!("gateway_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_auth_failure(reason: &str) {
    counter!("gateway_auth_failures_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_breaker_state(service: &str, status: CircuitStatus) {
    let value = match status {
        CircuitStatus::Closed => 0.0,
        CircuitStatus::HalfOpen => 1.0,
        CircuitStatus::Open => 2.0,
    };
    gauge!("gateway_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_event(kind: &str) {
    counter!("gateway_events_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_event_dropped(reason: &str) {
    counter!("gateway_events_dropped_total", "reason" => reason.to_string()).increment(1);
}

//! Per-request context and identifiers.
//!
//! # Responsibilities
//! - Propagate or generate the request ID and correlation ID
//! - Carry the per-request pipeline state (`GatewayContext`)
//!
//! # Design Decisions
//! - IDs accepted from callers only if short and printable; otherwise regenerated
//! - Correlation ID defaults to the request ID when the caller sends none
//! - The context is owned by one request and never shared

use std::time::Instant;

use axum::http::HeaderMap;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_CORRELATION_ID: &str = "x-correlation-id";
pub const X_USER_ID: &str = "x-user-id";

const MAX_ID_LEN: usize = 128;

/// State of one request as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub request_id: String,
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub service_name: String,
    pub start_time: Instant,
    pub authenticated: bool,
}

impl GatewayContext {
    pub fn new(headers: &HeaderMap, service_name: &str) -> Self {
        let request_id =
            incoming_id(headers, X_REQUEST_ID).unwrap_or_else(|| Uuid::new_v4().to_string());
        let correlation_id =
            incoming_id(headers, X_CORRELATION_ID).unwrap_or_else(|| request_id.clone());

        Self {
            request_id,
            correlation_id,
            user_id: None,
            service_name: service_name.to_string(),
            start_time: Instant::now(),
            authenticated: false,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

fn incoming_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| is_valid_id(v))
        .map(str::to_string)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

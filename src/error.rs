//! Gateway error taxonomy.
//!
//! Every rejection the pipeline can produce is a [`GatewayError`]. Rendering
//! to HTTP happens in one place so the JSON body always carries a stable
//! `error` code plus whatever metadata lets a caller back off or correct
//! itself.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::clock::{millis_to_secs_ceil, now_millis};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        limit: u32,
        remaining: u32,
        /// Window reset, ms since epoch.
        reset_at: u64,
    },

    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("principal lacks permission `{permission}`")]
    InsufficientPermission { permission: String },

    #[error("unknown service `{name}`")]
    UnknownService {
        name: String,
        available: Vec<String>,
    },

    #[error("circuit open for service `{service}`")]
    CircuitOpen { service: String },

    #[error("service `{service}` did not answer within {timeout_ms}ms")]
    ForwardingTimeout { service: String, timeout_ms: u64 },

    #[error("forwarding to `{service}` failed: {reason}")]
    ForwardingFailed {
        service: String,
        reason: String,
        /// Connection could not be established at all.
        unreachable: bool,
    },

    #[error("response transform failed: {0}")]
    ResponseTransformFailed(String),

    #[error("event publish failed: {0}")]
    EventPublishFailed(String),
}

impl GatewayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::AuthenticationFailed { .. } => "authentication_failed",
            GatewayError::InsufficientPermission { .. } => "insufficient_permission",
            GatewayError::UnknownService { .. } => "unknown_service",
            GatewayError::CircuitOpen { .. } => "service_unavailable",
            GatewayError::ForwardingTimeout { .. } => "gateway_timeout",
            GatewayError::ForwardingFailed { .. } => "forwarding_failed",
            GatewayError::ResponseTransformFailed(_) => "response_transform_failed",
            GatewayError::EventPublishFailed(_) => "event_publish_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::InsufficientPermission { .. } => StatusCode::FORBIDDEN,
            GatewayError::UnknownService { .. } => StatusCode::NOT_FOUND,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ForwardingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ForwardingFailed { unreachable: true, .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::ForwardingFailed { .. }
            | GatewayError::ResponseTransformFailed(_)
            | GatewayError::EventPublishFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the breaker should count this as a backend failure.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::ForwardingTimeout { .. } | GatewayError::ForwardingFailed { .. }
        )
    }

    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        match self {
            GatewayError::RateLimitExceeded { limit, remaining, reset_at } => {
                body["limit"] = json!(limit);
                body["remaining"] = json!(remaining);
                body["resetTime"] = json!(reset_at);
                body["retryAfter"] = json!(retry_after_secs(*reset_at));
            }
            GatewayError::InsufficientPermission { permission } => {
                body["required_permission"] = json!(permission);
            }
            GatewayError::UnknownService { available, .. } => {
                body["available_services"] = json!(available);
            }
            GatewayError::CircuitOpen { service } => {
                body["service"] = json!(service);
            }
            GatewayError::ForwardingTimeout { service, timeout_ms } => {
                body["service"] = json!(service);
                body["timeout_ms"] = json!(timeout_ms);
            }
            GatewayError::ForwardingFailed { service, .. } => {
                body["service"] = json!(service);
            }
            _ => {}
        }
        body
    }
}

/// Seconds until `reset_at`, never less than one.
pub fn retry_after_secs(reset_at: u64) -> u64 {
    millis_to_secs_ceil(reset_at.saturating_sub(now_millis())).max(1)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let GatewayError::RateLimitExceeded { reset_at, .. } = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(*reset_at)),
            );
        }
        response
    }
}

//! Response transformation.
//!
//! # Responsibilities
//! - Attach gateway diagnostic headers (request id, correlation id, service, timing)
//! - Attach permissive CORS headers and rate limit headers
//! - Leave the backend status code and body untouched
//!
//! # Design Decisions
//! - Headers are built into a separate map first, so a failure leaves the
//!   backend response exactly as received
//! - Streaming responses are never buffered

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Response, header},
};

use crate::error::GatewayError;
use crate::http::request::GatewayContext;
use crate::security::RateLimitDecision;

pub const X_GATEWAY_REQUEST_ID: &str = "x-gateway-request-id";
pub const X_GATEWAY_CORRELATION_ID: &str = "x-gateway-correlation-id";
pub const X_GATEWAY_SERVICE: &str = "x-gateway-service";
pub const X_GATEWAY_RESPONSE_TIME: &str = "x-gateway-response-time";

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-API-Key, X-Request-ID, X-Correlation-ID";
const EXPOSE_HEADERS: &str = "x-gateway-request-id, x-gateway-correlation-id, \
    x-gateway-service, x-gateway-response-time, x-ratelimit-limit, \
    x-ratelimit-remaining, x-ratelimit-reset, retry-after";

/// Decorate `response` with gateway headers, falling back to it unchanged.
pub fn transform_response(
    mut response: Response<Body>,
    ctx: &GatewayContext,
    rate_limit: Option<&RateLimitDecision>,
) -> Response<Body> {
    match gateway_headers(ctx, rate_limit) {
        Ok(extra) => {
            response.headers_mut().extend(extra);
        }
        Err(e) => {
            tracing::warn!(
                request_id = %ctx.request_id,
                service = %ctx.service_name,
                error = %e,
                "Passing backend response through untransformed"
            );
        }
    }
    response
}

fn gateway_headers(
    ctx: &GatewayContext,
    rate_limit: Option<&RateLimitDecision>,
) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();

    insert(&mut headers, X_GATEWAY_REQUEST_ID, &ctx.request_id)?;
    insert(&mut headers, X_GATEWAY_CORRELATION_ID, &ctx.correlation_id)?;
    insert(&mut headers, X_GATEWAY_SERVICE, &ctx.service_name)?;
    insert(&mut headers, X_GATEWAY_RESPONSE_TIME, &format!("{}ms", ctx.elapsed_ms()))?;

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static(EXPOSE_HEADERS));

    if let Some(decision) = rate_limit {
        decision.apply_headers(&mut headers);
    }
    Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), GatewayError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| GatewayError::ResponseTransformFailed(format!("{name}: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

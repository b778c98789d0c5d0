//! Backend forwarding.
//!
//! # Responsibilities
//! - Build the outbound request (ids, user, service marker; method, body, query kept)
//! - Send it once, bounded by the service deadline
//! - Classify failures as timeout, unreachable, or other
//!
//! # Design Decisions
//! - Exactly one attempt; the gateway never retries
//! - Hop-by-hop headers and `Host` are not forwarded
//! - Request and response bodies are streamed, not buffered

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response, Uri, request::Parts},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::GatewayError;
use crate::http::request::{GatewayContext, X_CORRELATION_ID, X_REQUEST_ID, X_USER_ID};
use crate::http::response::X_GATEWAY_SERVICE;
use crate::resilience::{with_deadline, DeadlineExceeded};
use crate::routing::ServiceEntry;

pub type HttpClient = Client<HttpConnector, Body>;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Build the request sent to `service`.
pub fn build_outbound(
    parts: &Parts,
    body: Body,
    service: &ServiceEntry,
    backend_path: &str,
    ctx: &GatewayContext,
) -> Result<Request<Body>, GatewayError> {
    let target = service.target_url(backend_path, parts.uri.query());
    let uri: Uri = target.parse().map_err(|e| GatewayError::ForwardingFailed {
        service: service.name.clone(),
        reason: format!("invalid target `{target}`: {e}"),
        unreachable: false,
    })?;

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(body)
        .map_err(|e| GatewayError::ForwardingFailed {
            service: service.name.clone(),
            reason: e.to_string(),
            unreachable: false,
        })?;

    let headers = request.headers_mut();
    for (name, value) in parts.headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    // Never let a caller assert an identity the gateway did not verify.
    headers.remove(X_USER_ID);

    let mut set = |name: &'static str, value: &str| -> Result<(), GatewayError> {
        let value = HeaderValue::from_str(value).map_err(|e| GatewayError::ForwardingFailed {
            service: service.name.clone(),
            reason: format!("{name}: {e}"),
            unreachable: false,
        })?;
        headers.insert(HeaderName::from_static(name), value);
        Ok(())
    };
    set(X_REQUEST_ID, &ctx.request_id)?;
    set(X_CORRELATION_ID, &ctx.correlation_id)?;
    set(X_GATEWAY_SERVICE, &service.name)?;
    if let Some(user_id) = &ctx.user_id {
        set(X_USER_ID, user_id)?;
    }

    Ok(request)
}

/// Send `request` once, cancelling it if the service deadline passes.
pub async fn forward(
    client: &HttpClient,
    request: Request<Body>,
    service: &ServiceEntry,
) -> Result<Response<Incoming>, GatewayError> {
    match with_deadline(service.timeout_ms, client.request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(GatewayError::ForwardingFailed {
            service: service.name.clone(),
            reason: e.to_string(),
            unreachable: e.is_connect(),
        }),
        Err(DeadlineExceeded { timeout_ms }) => Err(GatewayError::ForwardingTimeout {
            service: service.name.clone(),
            timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::routing::ServiceRegistry;
    use axum::http::{HeaderMap, Method};

    fn registry() -> ServiceRegistry {
        let config = GatewayConfig::default();
        ServiceRegistry::from_config(&config.services, &config.circuit_breaker).unwrap()
    }

    #[test]
    fn test_outbound_request_shape() {
        let registry = registry();
        let service = registry.get("intake").unwrap();

        let incoming = Request::builder()
            .method(Method::POST)
            .uri("/api/gateway/intake/forms?draft=1")
            .header("host", "gateway.local")
            .header("connection", "keep-alive")
            .header("content-type", "application/json")
            .header(X_USER_ID, "spoofed")
            .body(())
            .unwrap();
        let (parts, _) = incoming.into_parts();

        let mut ctx = GatewayContext::new(&HeaderMap::new(), "intake");
        ctx.user_id = Some("user-42".into());

        let out = build_outbound(&parts, Body::empty(), &service, "/forms", &ctx).unwrap();
        assert_eq!(out.method(), Method::POST);
        assert_eq!(out.uri(), "http://127.0.0.1:3001/forms?draft=1");

        let h = out.headers();
        assert!(h.get("host").is_none());
        assert!(h.get("connection").is_none());
        assert_eq!(h["content-type"], "application/json");
        assert_eq!(h[X_USER_ID], "user-42");
        assert_eq!(h[X_GATEWAY_SERVICE], "intake");
        assert_eq!(h[X_REQUEST_ID], ctx.request_id.as_str());
    }

    #[test]
    fn test_unverified_user_header_is_stripped() {
        let registry = registry();
        let service = registry.get("intake").unwrap();
        let incoming = Request::builder()
            .uri("/api/gateway/intake/health")
            .header(X_USER_ID, "spoofed")
            .body(())
            .unwrap();
        let (parts, _) = incoming.into_parts();
        let ctx = GatewayContext::new(&HeaderMap::new(), "intake");

        let out = build_outbound(&parts, Body::empty(), &service, "/health", &ctx).unwrap();
        assert!(out.headers().get(X_USER_ID).is_none());
    }
}

//! Gateway path parsing.
//!
//! # Responsibilities
//! - Split `/api/gateway/{service}/{...path}` into service name and backend path
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching
//! - The backend path always starts with `/`

pub const GATEWAY_PREFIX: &str = "/api/gateway";

/// A request path resolved against the gateway prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPath<'a> {
    pub service: &'a str,
    /// Remaining path forwarded to the backend.
    pub backend_path: String,
}

/// Parse a gateway request path. Returns `None` if it is not under the prefix
/// or names no service.
pub fn parse_gateway_path(path: &str) -> Option<GatewayPath<'_>> {
    let rest = path.strip_prefix(GATEWAY_PREFIX)?.strip_prefix('/')?;
    let (service, backend) = match rest.split_once('/') {
        Some((service, backend)) => (service, backend),
        None => (rest, ""),
    };
    if service.is_empty() {
        return None;
    }
    Some(GatewayPath {
        service,
        backend_path: format!("/{backend}"),
    })
}

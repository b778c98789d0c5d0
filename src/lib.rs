//! Strategy platform request gateway.
//!
//! Every call to `/api/gateway/{service}/...` is rate limited, authenticated,
//! checked against the service's circuit breaker, forwarded once under the
//! service deadline, and decorated with gateway headers. Each terminal
//! outcome is published as a lifecycle event.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

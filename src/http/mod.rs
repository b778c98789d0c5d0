//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, gateway pipeline)
//!     → request.rs (request id, correlation id, per-request context)
//!     → [security + resilience stages]
//!     → forward.rs (single deadline-bounded call to the backend)
//!     → response.rs (diagnostic, CORS and rate limit headers)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use request::{GatewayContext, X_CORRELATION_ID, X_REQUEST_ID};
pub use server::{AppState, HttpServer};

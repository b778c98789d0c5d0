//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (service already resolved):
//!     → rate_limit.rs (per-class fixed window, cheapest check first)
//!     → auth.rs (API key, bearer token, session cookie)
//!     → permission check against the service's requirements
//!     → Pass to resilience
//! ```
//!
//! # Design Decisions
//! - Abusive traffic is rejected before any credential verification
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod auth;
pub mod rate_limit;

pub use auth::{AuthError, AuthOutcome, AuthPrincipal, Authenticator};
pub use rate_limit::{RateLimitDecision, RateLimitEntry, RateLimiter, RateLimiters};

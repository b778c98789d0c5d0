//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (fail fast if open, admit one trial when half-open)
//!     → timeouts.rs (enforce the service deadline)
//!     → outcome recorded back on the breaker
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: one forwarding attempt per request, retry policy belongs to the caller
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerState, CircuitOpen, CircuitStatus};
pub use timeouts::{with_deadline, DeadlineExceeded};

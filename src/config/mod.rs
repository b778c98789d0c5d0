//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup to build the registry and limiters
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the service registry is static
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiKeyConfig, AuthConfig, CircuitBreakerConfig, EventsConfig, GatewayConfig, KeyStrategy,
    ListenerConfig, ObservabilityConfig, RateLimitConfig, RateLimitProfile, Role,
    SecurityConfig, ServiceConfig, TrafficClass,
};

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request path
//!     → matcher.rs (split /api/gateway/{service}/{...path})
//!     → registry.rs (service lookup)
//!     → Return: ServiceEntry or UnknownService
//!
//! Registry Compilation (at startup):
//!     ServiceConfig[]
//!     → Parse base URLs
//!     → Attach one circuit breaker per service
//!     → Freeze as immutable ServiceRegistry
//! ```
//!
//! # Design Decisions
//! - Registry built at startup, immutable at runtime
//! - Deterministic: same path always resolves to the same service

pub mod matcher;
pub mod registry;

pub use matcher::{parse_gateway_path, GatewayPath, GATEWAY_PREFIX};
pub use registry::{RegistryError, ServiceEntry, ServiceRegistry};

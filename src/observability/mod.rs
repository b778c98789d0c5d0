//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway pipeline produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → events.rs (lifecycle events, delivered off the request path)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Event sinks (log, webhook)
//! ```
//!
//! # Design Decisions
//! - Request and correlation IDs flow through logs and events
//! - Metrics are cheap (atomic increments)
//! - Observability failures never affect the request path

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventKind, EventPublisher, EventSink, EventWorker, GatewayEvent};

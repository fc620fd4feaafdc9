//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Circuits, middleware, gateway produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters for calls, rejections, transitions)
//!
//! Consumers:
//!     → stdout (fmt subscriber, EnvFilter)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every event carries the circuit identifier as a field
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

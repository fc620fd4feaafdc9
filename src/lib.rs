//! Per-destination circuit breakers for outbound calls.
//!
//! The core is [`resilience`]: a [`CircuitRegistry`] of [`Circuit`]s whose
//! counters live in a [`CircuitStore`], and a [`RequestGuard`] wrapping single
//! calls. [`http`] applies the same guard to any tower HTTP client service and
//! turns failures into 503 fallback responses; the `circuit-gateway` binary
//! puts that client behind an Axum reverse proxy.
//!
//! ```
//! use std::sync::Arc;
//! use circuit_guard::{CircuitConfig, CircuitRegistry, RequestGuard};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(CircuitRegistry::in_memory(CircuitConfig::default()));
//! let guard = RequestGuard::new(registry);
//!
//! let value = guard
//!     .run("inventory.internal", || async { Ok::<_, std::io::Error>(42) })
//!     .await;
//! assert_eq!(value.unwrap(), 42);
//! # }
//! ```

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod store;

pub use config::{CircuitConfig, FailureThreshold, GatewayConfig};
pub use http::{CircuitBreakerLayer, GuardedResponse, HttpServer};
pub use lifecycle::Shutdown;
pub use resilience::{CallError, Circuit, CircuitRegistry, CircuitState, OpenCircuitError, RequestGuard};
pub use store::{CircuitStore, MemoryStore, StoreError};

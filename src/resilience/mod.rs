//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → guard.rs (RequestGuard::run)
//!     → registry.rs (one shared Circuit per identifier)
//!     → circuit_breaker.rs (admit or refuse, CallPermit)
//!     → timeouts.rs (optional deadline around the operation)
//!     → policy.rs (classify the outcome)
//!     → circuit_breaker.rs (record outcome, maybe transition)
//! ```
//!
//! # Design Decisions
//! - Circuits are per identifier (per destination), never global
//! - Fail fast while Open; no waiting on a destination known to be down
//! - Single probe in Half-Open to avoid hammering a recovering destination
//! - Store failures degrade to "allow the call"; availability beats protection
//! - No retries here; callers decide what to do with a refused call

pub mod circuit_breaker;
pub mod guard;
pub mod policy;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{CallPermit, Circuit, CircuitState, CircuitStats, OpenCircuitError};
pub use guard::{CallError, RequestGuard};
pub use policy::{policy_fn, CallOutcome, DefaultPolicy, FailurePolicy, PolicyFn};
pub use registry::CircuitRegistry;

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → CircuitRegistry swaps its default circuit policy
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Reload only affects circuits created afterwards; a live circuit keeps its policy

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, CircuitConfig, CircuitsConfig, ClientConfig, FailureStatuses, FailureThreshold,
    GatewayConfig, IdentifierStrategy, ListenerConfig, ObservabilityConfig, RouteConfig,
};

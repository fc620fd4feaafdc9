//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum, request ID, tracing)
//!     → [routing decides upstream]
//!     → middleware.rs (CircuitBreakerService around the hyper client)
//!         → identifier.rs (request → circuit identifier)
//!         → resilience::RequestGuard (admit, call, record)
//!     → response.rs (GuardedResponse: upstream response or 503 fallback)
//!     → Send to client
//! ```

pub mod identifier;
pub mod middleware;
pub mod response;
pub mod server;

pub use identifier::{resolver_for, AuthorityResolver, HostResolver, IdentifierResolver};
pub use middleware::{CircuitBreakerLayer, CircuitBreakerService, StatusPolicy};
pub use response::{CircuitFallback, Fallback, GuardedResponse, RequestFailed, FALLBACK_HEADER};
pub use server::{guarded_client, AppState, GuardedClient, HttpServer, X_REQUEST_ID};

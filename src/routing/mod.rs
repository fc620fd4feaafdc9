//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (longest matching prefix)
//!     → Route::upstream_uri (absolute upstream URI)
//!     → guarded client
//!
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → parse upstream URLs
//!     → sort by prefix length
//!     → freeze as immutable Router
//! ```

pub mod router;

pub use router::{Route, RouteError, Router};

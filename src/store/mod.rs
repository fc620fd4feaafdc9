//! Circuit counter storage.
//!
//! # Data Flow
//! ```text
//! Circuit (per identifier)
//!     → CircuitStore::increment / get / set / expire
//!     → memory.rs (DashMap with access-time expiry)
//! ```
//!
//! # Design Decisions
//! - Counters carry a TTL so stale circuits heal by expiry, not by reset
//! - Increments are atomic per key (no lost updates under concurrency)
//! - Store failures never reach callers; circuits fail open

pub mod memory;

use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors reported by a [`CircuitStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached or refused the operation.
    #[error("circuit store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value contract consumed by circuits.
///
/// Values are unsigned integers: counters and millisecond timestamps.
/// Implementations must make [`increment`](Self::increment) atomic and must
/// treat keys whose TTL elapsed as absent.
pub trait CircuitStore: Send + Sync + std::fmt::Debug {
    /// Add one to `key`, creating it with `ttl` when absent. Returns the new value.
    ///
    /// The TTL of an existing key is left untouched, so a counter measures a
    /// fixed window starting at its first increment.
    fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Read `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Write `key` with a fresh TTL.
    fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError>;

    /// Replace the TTL of an existing key. Missing keys are ignored.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

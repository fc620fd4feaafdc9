//! Circuit breaker for destination protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are counted
//! - Open: destination assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the destination recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: attempts >= volume_threshold and failures reach failure_threshold
//! Open → Half-Open: sleep window elapsed (observed lazily by the next call)
//! Half-Open → Closed: probe succeeds, counters reset
//! Half-Open → Open: probe fails, sleep window restarts
//! ```
//!
//! # Storage
//! State lives in the [`CircuitStore`] under `circuit:{identifier}:{metric}`:
//! - `window`: start of the current counting window, expiring after `time_window`
//! - `success` / `failure`: counters of the current window
//! - `open`: opened-at timestamp, expiring after `sleep_window`
//! - `half_open`: marker expiring after `sleep_window + time_window`
//!
//! Both counters belong to the window that is live when they are
//! incremented; when `window` expires they are reset together. A circuit
//! whose keys all expired is Closed again without any reset.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use crate::config::CircuitConfig;
use crate::observability::metrics;
use crate::store::{CircuitStore, StoreError};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call was refused without being attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit `{identifier}` is {state}, call not attempted")]
pub struct OpenCircuitError {
    /// Identifier of the refusing circuit.
    pub identifier: String,
    /// State observed at refusal (Open, or Half-Open with a probe in flight).
    pub state: CircuitState,
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub identifier: String,
    pub state: CircuitState,
    pub success_count: u64,
    pub failure_count: u64,
    /// Unix millis of the last transition to Open, while the open marker lives.
    pub opened_at_ms: Option<u64>,
    pub probe_in_flight: bool,
    pub config: CircuitConfig,
}

#[derive(Debug)]
struct Keys {
    window: String,
    success: String,
    failure: String,
    open: String,
    half_open: String,
}

impl Keys {
    fn new(identifier: &str) -> Self {
        Self {
            window: format!("circuit:{identifier}:window"),
            success: format!("circuit:{identifier}:success"),
            failure: format!("circuit:{identifier}:failure"),
            open: format!("circuit:{identifier}:open"),
            half_open: format!("circuit:{identifier}:half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Probe,
}

/// State machine and failure accounting for one destination.
///
/// Every read-modify-write on the circuit's keys, and probe admission, runs
/// under the circuit's lock. The lock guards only the probe flag; counters
/// and markers live in the store.
#[derive(Debug)]
pub struct Circuit {
    identifier: String,
    config: CircuitConfig,
    store: Arc<dyn CircuitStore>,
    keys: Keys,
    probe_in_flight: Mutex<bool>,
}

impl Circuit {
    /// Create a circuit. Prefer [`CircuitRegistry::get`](super::CircuitRegistry::get),
    /// which guarantees a single instance per identifier.
    pub fn new(
        identifier: impl Into<String>,
        config: CircuitConfig,
        store: Arc<dyn CircuitStore>,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            keys: Keys::new(&identifier),
            identifier,
            config,
            store,
            probe_in_flight: Mutex::new(false),
        }
    }

    /// Get the circuit identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the circuit policy.
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Get the current state. An unreachable store reads as Closed.
    pub fn state(&self) -> CircuitState {
        let _lock = self.lock();
        match self.read_state() {
            Ok(state) => state,
            Err(e) => {
                self.degraded("read_state", &e);
                CircuitState::Closed
            }
        }
    }

    /// Ask permission to run one call.
    ///
    /// Returns a [`CallPermit`] that must be completed with the call outcome,
    /// or [`OpenCircuitError`] when the circuit is Open or a Half-Open probe
    /// is already in flight.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, OpenCircuitError> {
        let mut probe_in_flight = self.lock();

        let state = match self.read_state() {
            Ok(state) => state,
            Err(e) => {
                self.degraded("read_state", &e);
                return Ok(CallPermit::new(self.clone(), PermitKind::Normal));
            }
        };

        match state {
            CircuitState::Closed => Ok(CallPermit::new(self.clone(), PermitKind::Normal)),
            CircuitState::HalfOpen if !*probe_in_flight => {
                *probe_in_flight = true;
                tracing::info!(circuit = %self.identifier, "Admitting half-open probe");
                Ok(CallPermit::new(self.clone(), PermitKind::Probe))
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                tracing::debug!(circuit = %self.identifier, state = %state, "Call refused");
                metrics::record_rejection(&self.identifier);
                Err(OpenCircuitError {
                    identifier: self.identifier.clone(),
                    state,
                })
            }
        }
    }

    /// Snapshot counters and state.
    pub fn stats(&self) -> CircuitStats {
        let probe_in_flight = self.lock();
        let state = self.read_state().unwrap_or_else(|e| {
            self.degraded("read_state", &e);
            CircuitState::Closed
        });
        let (success_count, failure_count) = self.window_counts();
        CircuitStats {
            identifier: self.identifier.clone(),
            state,
            success_count,
            failure_count,
            opened_at_ms: self.read(&self.keys.open),
            probe_in_flight: *probe_in_flight,
            config: self.config.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // The flag stays meaningful after a panic elsewhere; keep using it.
        self.probe_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> Result<CircuitState, StoreError> {
        if self.store.get(&self.keys.open)?.is_some() {
            Ok(CircuitState::Open)
        } else if self.store.get(&self.keys.half_open)?.is_some() {
            Ok(CircuitState::HalfOpen)
        } else {
            Ok(CircuitState::Closed)
        }
    }

    fn read(&self, key: &str) -> Option<u64> {
        self.store.get(key).unwrap_or_else(|e| {
            self.degraded("get", &e);
            None
        })
    }

    /// `(successes, failures)` of the live window; zero when none is live.
    fn window_counts(&self) -> (u64, u64) {
        match self.read(&self.keys.window) {
            Some(_) => (
                self.read(&self.keys.success).unwrap_or(0),
                self.read(&self.keys.failure).unwrap_or(0),
            ),
            None => (0, 0),
        }
    }

    /// Start a new window, dropping the old counters, unless one is live.
    fn ensure_window(&self) -> Result<(), StoreError> {
        if self.store.get(&self.keys.window)?.is_some() {
            return Ok(());
        }
        self.store.delete(&self.keys.success)?;
        self.store.delete(&self.keys.failure)?;
        self.store
            .set(&self.keys.window, unix_millis(), self.config.time_window())
    }

    fn complete(&self, kind: PermitKind, failed: bool) {
        let mut probe_in_flight = self.lock();
        metrics::record_call(&self.identifier, failed);

        if kind == PermitKind::Probe {
            *probe_in_flight = false;
            if failed {
                tracing::warn!(circuit = %self.identifier, "Half-open probe failed, reopening");
                self.trip();
            } else {
                self.close();
            }
            return;
        }

        if let Err(e) = self.ensure_window() {
            self.degraded("window", &e);
            return;
        }
        let counter = if failed { &self.keys.failure } else { &self.keys.success };
        if let Err(e) = self.store.increment(counter, self.config.time_window()) {
            self.degraded("increment", &e);
            return;
        }

        // Only a closed circuit evaluates its thresholds; late completions of
        // calls admitted before a trip are counted and nothing more.
        match self.read_state() {
            Ok(CircuitState::Closed) => {}
            Ok(_) => return,
            Err(e) => {
                self.degraded("read_state", &e);
                return;
            }
        }

        let (successes, failures) = self.window_counts();
        let total = successes + failures;
        if total >= self.config.volume_threshold
            && self.config.failure_threshold.is_exceeded(failures, total)
        {
            tracing::warn!(
                circuit = %self.identifier,
                failures,
                total,
                sleep_window_ms = self.config.sleep_window_ms,
                "Failure threshold reached, opening circuit"
            );
            self.trip();
        }
    }

    fn trip(&self) {
        let sleep_window = self.config.sleep_window();
        let opened_at = unix_millis();
        let result = self
            .store
            .set(&self.keys.open, opened_at, sleep_window)
            .and_then(|_| {
                self.store.set(
                    &self.keys.half_open,
                    opened_at,
                    sleep_window + self.config.time_window(),
                )
            });
        match result {
            Ok(()) => metrics::record_transition(&self.identifier, CircuitState::Open.as_str()),
            Err(e) => self.degraded("set", &e),
        }
    }

    fn close(&self) {
        let result = [
            &self.keys.window,
            &self.keys.open,
            &self.keys.half_open,
            &self.keys.success,
            &self.keys.failure,
        ]
        .into_iter()
        .try_for_each(|key| self.store.delete(key));
        match result {
            Ok(()) => {
                tracing::info!(circuit = %self.identifier, "Half-open probe succeeded, circuit closed");
                metrics::record_transition(&self.identifier, CircuitState::Closed.as_str());
            }
            Err(e) => self.degraded("delete", &e),
        }
    }

    fn degraded(&self, operation: &'static str, error: &StoreError) {
        tracing::warn!(
            circuit = %self.identifier,
            operation,
            error = %error,
            "Circuit store unavailable, failing open"
        );
        metrics::record_store_error(operation);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Permission to run one call against a circuit.
///
/// Complete it with [`record`](Self::record). A permit dropped without an
/// outcome (the caller abandoned the call) is counted as a failure, which
/// also releases a Half-Open probe slot.
#[must_use = "a permit records a failure when dropped without an outcome"]
#[derive(Debug)]
pub struct CallPermit {
    circuit: Arc<Circuit>,
    kind: PermitKind,
    completed: bool,
}

impl CallPermit {
    fn new(circuit: Arc<Circuit>, kind: PermitKind) -> Self {
        Self {
            circuit,
            kind,
            completed: false,
        }
    }

    /// Whether this permit is the single Half-Open probe.
    pub fn is_probe(&self) -> bool {
        self.kind == PermitKind::Probe
    }

    /// The circuit this permit belongs to.
    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Record the classified outcome of the call.
    pub fn record(mut self, failed: bool) {
        self.completed = true;
        self.circuit.complete(self.kind, failed);
    }

    /// Shorthand for `record(false)`.
    pub fn record_success(self) {
        self.record(false);
    }

    /// Shorthand for `record(true)`.
    pub fn record_failure(self) {
        self.record(true);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(
                circuit = %self.circuit.identifier,
                probe = self.is_probe(),
                "Call abandoned before completion, counting as failure"
            );
            self.circuit.complete(self.kind, true);
        }
    }
}

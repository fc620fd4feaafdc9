//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! and its circuits. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the circuit gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping path prefixes to upstreams.
    pub routes: Vec<RouteConfig>,

    /// Circuit breaker policy.
    pub circuits: CircuitsConfig,

    /// Outbound client settings.
    pub client: ClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping a path prefix to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Upstream base URL (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    /// Remove the matched prefix before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,
}

/// Failure threshold for tripping a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureThreshold {
    /// Absolute number of failures within the time window.
    Count(u64),
    /// Fraction of failed attempts within the time window (0.0 - 1.0].
    Ratio(f64),
}

impl FailureThreshold {
    /// Whether `failures` out of `total` attempts reach the threshold.
    pub fn is_exceeded(&self, failures: u64, total: u64) -> bool {
        match *self {
            FailureThreshold::Count(limit) => failures >= limit,
            FailureThreshold::Ratio(ratio) => {
                total > 0 && (failures as f64 / total as f64) >= ratio
            }
        }
    }
}

impl Default for FailureThreshold {
    fn default() -> Self {
        FailureThreshold::Ratio(0.5)
    }
}

/// Policy for a single circuit. Immutable once the circuit exists.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failure count or ratio that trips the circuit.
    pub failure_threshold: FailureThreshold,

    /// Minimum attempts in the window before the threshold applies.
    pub volume_threshold: u64,

    /// How long an open circuit refuses calls before probing, in milliseconds.
    pub sleep_window_ms: u64,

    /// Window over which counters are measured, in milliseconds.
    pub time_window_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: FailureThreshold::default(),
            volume_threshold: 5,
            sleep_window_ms: 90_000,
            time_window_ms: 60_000,
        }
    }
}

impl CircuitConfig {
    /// Sleep window as a duration.
    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    /// Time window as a duration.
    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

/// How requests are mapped to circuit identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    /// Target host only (e.g., "api.example.com").
    #[default]
    Host,
    /// Host and port (e.g., "api.example.com:8443").
    Authority,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitsConfig {
    /// Policy for circuits without an override.
    pub defaults: CircuitConfig,

    /// Per-identifier policies.
    pub overrides: HashMap<String, CircuitConfig>,

    /// Identifier derivation for outbound requests.
    pub identifier: IdentifierStrategy,
}

/// Which upstream statuses count as circuit failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatuses {
    /// 5xx responses.
    #[default]
    ServerError,
    /// Any 4xx or 5xx response.
    AnyError,
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for each upstream call in milliseconds (0 = none).
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Response statuses classified as failures.
    pub failure_statuses: FailureStatuses,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
            failure_statuses: FailureStatuses::default(),
        }
    }
}

impl ClientConfig {
    /// Per-call deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

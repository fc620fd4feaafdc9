//! Configuration validation.
//!
//! Returns every problem found, not just the first, so a broken file can be
//! fixed in one pass.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{CircuitConfig, FailureThreshold, GatewayConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid bind address for {field}: {value}")]
    BindAddress { field: &'static str, value: String },

    #[error("circuit `{circuit}`: volume_threshold must be at least 1")]
    VolumeThreshold { circuit: String },

    #[error("circuit `{circuit}`: failure ratio {ratio} must be within (0, 1]")]
    FailureRatio { circuit: String, ratio: f64 },

    #[error("circuit `{circuit}`: failure count must be at least 1")]
    FailureCount { circuit: String },

    #[error("circuit `{circuit}`: {field} must be greater than zero")]
    ZeroWindow { circuit: String, field: &'static str },

    #[error("route `{route}`: path_prefix must start with '/'")]
    PathPrefix { route: String },

    #[error("route `{route}`: invalid upstream `{upstream}`")]
    Upstream { route: String, upstream: String },

    #[error("duplicate route name `{0}`")]
    DuplicateRoute(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_bind("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.admin.enabled {
        check_bind("admin.bind_address", &config.admin.bind_address, &mut errors);
    }
    if config.observability.metrics_enabled {
        check_bind(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    check_circuit("defaults", &config.circuits.defaults, &mut errors);
    let mut overrides: Vec<_> = config.circuits.overrides.iter().collect();
    overrides.sort_by(|a, b| a.0.cmp(b.0));
    for (name, circuit) in overrides {
        check_circuit(name, circuit, &mut errors);
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix {
                route: route.name.clone(),
            });
        }
        let upstream_ok = Url::parse(&route.upstream)
            .map(|url| url.scheme() == "http" && url.host_str().is_some())
            .unwrap_or(false);
        if !upstream_ok {
            errors.push(ValidationError::Upstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_circuit(name: &str, circuit: &CircuitConfig, errors: &mut Vec<ValidationError>) {
    if circuit.volume_threshold == 0 {
        errors.push(ValidationError::VolumeThreshold {
            circuit: name.to_string(),
        });
    }
    match circuit.failure_threshold {
        FailureThreshold::Ratio(ratio) if !(ratio > 0.0 && ratio <= 1.0) => {
            errors.push(ValidationError::FailureRatio {
                circuit: name.to_string(),
                ratio,
            });
        }
        FailureThreshold::Count(0) => errors.push(ValidationError::FailureCount {
            circuit: name.to_string(),
        }),
        _ => {}
    }
    if circuit.sleep_window_ms == 0 {
        errors.push(ValidationError::ZeroWindow {
            circuit: name.to_string(),
            field: "sleep_window_ms",
        });
    }
    if circuit.time_window_ms == 0 {
        errors.push(ValidationError::ZeroWindow {
            circuit: name.to_string(),
            field: "time_window_ms",
        });
    }
}

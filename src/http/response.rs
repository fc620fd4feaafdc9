//! Guarded responses and synthetic fallbacks.
//!
//! Every request through the circuit breaker middleware yields a
//! [`GuardedResponse`]: either the upstream response, untouched, or a
//! [`Fallback`] standing in for a failed or refused exchange. Fallbacks
//! always report status 503 so callers branch on one shape.

use std::fmt;
use std::time::Duration;

use axum::http::{HeaderValue, Response, StatusCode};
use thiserror::Error;
use tower::BoxError;

use crate::resilience::{CallError, OpenCircuitError};

/// Header set on rendered fallbacks: `open` or `upstream_failure`.
pub const FALLBACK_HEADER: &str = "x-circuit-fallback";

/// Why a request produced a fallback instead of an upstream response.
#[derive(Debug, Error)]
pub enum RequestFailed {
    /// The circuit refused the request; nothing was sent.
    #[error(transparent)]
    Open(#[from] OpenCircuitError),

    /// The transport failed (connect, I/O, protocol).
    #[error("upstream request failed: {0}")]
    Transport(#[source] BoxError),

    /// The upstream did not answer within the deadline.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
}

/// Extension attached to a rendered fallback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitFallback {
    pub identifier: String,
    pub circuit_open: bool,
}

/// A locally synthesized failure in place of a real exchange.
#[derive(Debug)]
pub struct Fallback<B> {
    identifier: String,
    original_response: Option<Response<B>>,
    original_error: Option<RequestFailed>,
}

impl<B> Fallback<B> {
    /// Fallback for a response the policy classified as a failure.
    pub fn from_response(identifier: impl Into<String>, response: Response<B>) -> Self {
        Self {
            identifier: identifier.into(),
            original_response: Some(response),
            original_error: None,
        }
    }

    /// Fallback for a request that errored, timed out or was refused.
    pub fn from_error(identifier: impl Into<String>, error: RequestFailed) -> Self {
        Self {
            identifier: identifier.into(),
            original_response: None,
            original_error: Some(error),
        }
    }

    /// Identifier of the circuit that produced this fallback.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The upstream response, when one was received.
    pub fn original_response(&self) -> Option<&Response<B>> {
        self.original_response.as_ref()
    }

    /// The error, when no usable response was received.
    pub fn original_error(&self) -> Option<&RequestFailed> {
        self.original_error.as_ref()
    }

    /// Whether the circuit refused the request without attempting it.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.original_error, Some(RequestFailed::Open(_)))
    }

    /// Take the upstream response, if any.
    pub fn into_original_response(self) -> Option<Response<B>> {
        self.original_response
    }

    fn map_body<C>(self, f: impl FnOnce(B) -> C) -> Fallback<C> {
        Fallback {
            identifier: self.identifier,
            original_response: self.original_response.map(|r| r.map(f)),
            original_error: self.original_error,
        }
    }
}

impl<B> fmt::Display for Fallback<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.original_error, &self.original_response) {
            (Some(error), _) => write!(f, "{}", error),
            (None, Some(response)) => write!(
                f,
                "upstream `{}` responded with {}",
                self.identifier,
                response.status()
            ),
            (None, None) => write!(f, "upstream `{}` unavailable", self.identifier),
        }
    }
}

/// Result of a request sent through the circuit breaker middleware.
#[derive(Debug)]
pub enum GuardedResponse<B> {
    /// The real upstream response, classified as a success.
    Upstream(Response<B>),
    /// A synthetic 503 standing in for a failed or refused exchange.
    Fallback(Fallback<B>),
}

impl<B> GuardedResponse<B> {
    pub(crate) fn from_call(
        identifier: String,
        result: Result<Response<B>, CallError<Response<B>, BoxError>>,
    ) -> Self {
        match result {
            Ok(response) => GuardedResponse::Upstream(response),
            Err(CallError::Unsuccessful(response)) => {
                tracing::debug!(circuit = %identifier, status = %response.status(), "Upstream response classified as failure");
                GuardedResponse::Fallback(Fallback::from_response(identifier, response))
            }
            Err(CallError::Failed(error)) => {
                tracing::warn!(circuit = %identifier, error = %error, "Upstream request failed");
                GuardedResponse::Fallback(Fallback::from_error(identifier, RequestFailed::Transport(error)))
            }
            Err(CallError::TimedOut(after)) => {
                tracing::warn!(circuit = %identifier, timeout = ?after, "Upstream request timed out");
                GuardedResponse::Fallback(Fallback::from_error(identifier, RequestFailed::Timeout(after)))
            }
            Err(CallError::Open(error)) => {
                GuardedResponse::Fallback(Fallback::from_error(identifier, RequestFailed::Open(error)))
            }
        }
    }

    /// Upstream status, or 503 for a fallback.
    pub fn status(&self) -> StatusCode {
        match self {
            GuardedResponse::Upstream(response) => response.status(),
            GuardedResponse::Fallback(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// True only for an upstream response with a 2xx status.
    pub fn is_success(&self) -> bool {
        match self {
            GuardedResponse::Upstream(response) => response.status().is_success(),
            GuardedResponse::Fallback(_) => false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GuardedResponse::Fallback(_))
    }

    /// Whether the request was refused by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        self.fallback().is_some_and(Fallback::is_circuit_open)
    }

    pub fn fallback(&self) -> Option<&Fallback<B>> {
        match self {
            GuardedResponse::Fallback(fallback) => Some(fallback),
            GuardedResponse::Upstream(_) => None,
        }
    }

    /// The upstream response behind a fallback. `None` for upstream
    /// responses (use [`response`](Self::response)) and for fallbacks
    /// without a received response.
    pub fn original_response(&self) -> Option<&Response<B>> {
        self.fallback().and_then(Fallback::original_response)
    }

    /// The error behind a fallback.
    pub fn original_error(&self) -> Option<&RequestFailed> {
        self.fallback().and_then(Fallback::original_error)
    }

    /// The upstream response, when the exchange succeeded.
    pub fn response(&self) -> Option<&Response<B>> {
        match self {
            GuardedResponse::Upstream(response) => Some(response),
            GuardedResponse::Fallback(_) => None,
        }
    }

    /// Convert the body type of every contained response.
    pub fn map_body<C>(self, f: impl FnOnce(B) -> C) -> GuardedResponse<C> {
        match self {
            GuardedResponse::Upstream(response) => GuardedResponse::Upstream(response.map(f)),
            GuardedResponse::Fallback(fallback) => GuardedResponse::Fallback(fallback.map_body(f)),
        }
    }

    /// Render as a plain response, building fallback bodies with `body`.
    ///
    /// A fallback becomes a 503 carrying [`FALLBACK_HEADER`] and a
    /// [`CircuitFallback`] extension.
    pub fn into_response_with(self, body: impl FnOnce(&Fallback<B>) -> B) -> Response<B> {
        let fallback = match self {
            GuardedResponse::Upstream(response) => return response,
            GuardedResponse::Fallback(fallback) => fallback,
        };

        let circuit_open = fallback.is_circuit_open();
        let mut response = Response::new(body(&fallback));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        response.headers_mut().insert(
            FALLBACK_HEADER,
            HeaderValue::from_static(if circuit_open { "open" } else { "upstream_failure" }),
        );
        response.extensions_mut().insert(CircuitFallback {
            identifier: fallback.identifier,
            circuit_open,
        });
        response
    }

    /// Render as a plain response with empty fallback bodies.
    pub fn into_response(self) -> Response<B>
    where
        B: Default,
    {
        self.into_response_with(|_| B::default())
    }
}

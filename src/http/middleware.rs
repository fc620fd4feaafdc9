//! Tower middleware guarding outbound HTTP calls.
//!
//! Wrap any client service (e.g. a `hyper_util` legacy client) with
//! [`CircuitBreakerLayer`]. Each request is mapped to a circuit identifier,
//! refused with a 503 fallback while that circuit is open, and otherwise
//! forwarded with its outcome recorded.
//!
//! ```text
//! Request
//!     → IdentifierResolver (host or authority)
//!     → RequestGuard::run_with (admit / refuse)
//!     → inner service (optional deadline)
//!     → StatusPolicy (classify)
//!     → GuardedResponse (upstream response or fallback)
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use tower::{BoxError, Layer, Service};

use crate::config::FailureStatuses;
use crate::http::identifier::{HostResolver, IdentifierResolver};
use crate::http::response::{Fallback, GuardedResponse, RequestFailed};
use crate::resilience::{CallOutcome, FailurePolicy, RequestGuard};

/// Classifies upstream responses by status code.
///
/// Responses at or above `min_failure_status` count as failures, as do
/// transport errors and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    min_failure_status: u16,
}

impl StatusPolicy {
    /// 5xx responses are failures.
    pub fn server_errors() -> Self {
        Self {
            min_failure_status: 500,
        }
    }

    /// 4xx and 5xx responses are failures.
    pub fn any_errors() -> Self {
        Self {
            min_failure_status: 400,
        }
    }

    pub fn is_failure_status(&self, status: StatusCode) -> bool {
        status.as_u16() >= self.min_failure_status
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::server_errors()
    }
}

impl From<FailureStatuses> for StatusPolicy {
    fn from(statuses: FailureStatuses) -> Self {
        match statuses {
            FailureStatuses::ServerError => Self::server_errors(),
            FailureStatuses::AnyError => Self::any_errors(),
        }
    }
}

impl<B, E> FailurePolicy<Response<B>, E> for StatusPolicy {
    fn is_failure(&self, outcome: CallOutcome<'_, Response<B>, E>) -> bool {
        match outcome {
            CallOutcome::Success(response) => self.is_failure_status(response.status()),
            CallOutcome::Error(_) | CallOutcome::Timeout(_) => true,
        }
    }
}

/// Layer applying circuit breaking to an HTTP client service.
pub struct CircuitBreakerLayer<P = StatusPolicy> {
    guard: RequestGuard,
    policy: Arc<P>,
    resolver: Arc<dyn IdentifierResolver>,
    timeout: Option<Duration>,
}

impl CircuitBreakerLayer {
    /// Host-based identifiers, 5xx-as-failure, no deadline.
    pub fn new(guard: RequestGuard) -> Self {
        Self {
            guard,
            policy: Arc::new(StatusPolicy::default()),
            resolver: Arc::new(HostResolver),
            timeout: None,
        }
    }
}

impl<P> CircuitBreakerLayer<P> {
    /// Replace the outcome classification.
    pub fn policy<Q>(self, policy: Q) -> CircuitBreakerLayer<Q> {
        CircuitBreakerLayer {
            guard: self.guard,
            policy: Arc::new(policy),
            resolver: self.resolver,
            timeout: self.timeout,
        }
    }

    /// Replace the request-to-identifier mapping.
    pub fn identifier_resolver<R>(mut self, resolver: R) -> Self
    where
        R: IdentifierResolver + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Same as [`identifier_resolver`](Self::identifier_resolver) for an
    /// already shared resolver.
    pub fn shared_resolver(mut self, resolver: Arc<dyn IdentifierResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Deadline for each call. Elapsed calls count as failures.
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }
}

impl<P> Clone for CircuitBreakerLayer<P> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            policy: self.policy.clone(),
            resolver: self.resolver.clone(),
            timeout: self.timeout,
        }
    }
}

impl<P> fmt::Debug for CircuitBreakerLayer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerLayer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S, P> Layer<S> for CircuitBreakerLayer<P> {
    type Service = CircuitBreakerService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            guard: self.guard.clone(),
            policy: self.policy.clone(),
            resolver: self.resolver.clone(),
            timeout: self.timeout,
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
///
/// Never fails for a request: transport errors, timeouts and refusals are
/// all returned as [`GuardedResponse::Fallback`]. Errors from `poll_ready`
/// are passed through.
pub struct CircuitBreakerService<S, P = StatusPolicy> {
    inner: S,
    guard: RequestGuard,
    policy: Arc<P>,
    resolver: Arc<dyn IdentifierResolver>,
    timeout: Option<Duration>,
}

impl<S, P> CircuitBreakerService<S, P> {
    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }
}

impl<S: Clone, P> Clone for CircuitBreakerService<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            guard: self.guard.clone(),
            policy: self.policy.clone(),
            resolver: self.resolver.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: fmt::Debug, P> fmt::Debug for CircuitBreakerService<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerService")
            .field("inner", &self.inner)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S, P, ReqBody, ResBody> Service<Request<ReqBody>> for CircuitBreakerService<S, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    S::Future: Send + 'static,
    P: FailurePolicy<Response<ResBody>, BoxError> + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = GuardedResponse<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // Keep the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let identifier = self.resolver.resolve(request.uri(), request.headers());
        let guard = self.guard.clone();
        let policy = self.policy.clone();
        let timeout = self.timeout;

        // The call runs to completion even if the caller goes away, so its
        // real outcome is recorded.
        let task_identifier = identifier.clone();
        let task = tokio::spawn(async move {
            let result = guard
                .run_with(&task_identifier, &*policy, timeout, move || async move {
                    inner.call(request).await.map_err(Into::into)
                })
                .await;
            GuardedResponse::from_call(task_identifier, result)
        });

        Box::pin(async move {
            match task.await {
                Ok(guarded) => Ok(guarded),
                Err(e) => {
                    tracing::error!(circuit = %identifier, error = %e, "Guarded request task failed");
                    Ok(GuardedResponse::Fallback(Fallback::from_error(
                        identifier,
                        RequestFailed::Transport(Box::new(e)),
                    )))
                }
            }
        })
    }
}

//! Protected-call primitive.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::OpenCircuitError;
use super::policy::{CallOutcome, DefaultPolicy, FailurePolicy};
use super::registry::CircuitRegistry;
use super::timeouts::{with_deadline, Deadline};

/// Why a guarded call did not produce a successful value.
///
/// `Open` means the operation was never invoked; every other variant means
/// it ran and carries its original outcome.
#[derive(Debug)]
pub enum CallError<T, E> {
    /// The circuit refused the call.
    Open(OpenCircuitError),
    /// The operation returned a value the policy classified as a failure.
    Unsuccessful(T),
    /// The operation returned an error.
    Failed(E),
    /// The operation did not finish within the deadline.
    TimedOut(Duration),
}

impl<T, E> CallError<T, E> {
    /// Whether the call was refused without being attempted.
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }
}

impl<T, E: fmt::Display> fmt::Display for CallError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Open(e) => write!(f, "{}", e),
            CallError::Unsuccessful(_) => write!(f, "call returned an unsuccessful result"),
            CallError::Failed(e) => write!(f, "call failed: {}", e),
            CallError::TimedOut(after) => write!(f, "call timed out after {:?}", after),
        }
    }
}

impl<T, E> std::error::Error for CallError<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Open(e) => Some(e),
            CallError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<T, E> From<OpenCircuitError> for CallError<T, E> {
    fn from(e: OpenCircuitError) -> Self {
        CallError::Open(e)
    }
}

/// Wraps single calls with circuit accounting.
///
/// Cheap to clone; all clones share one [`CircuitRegistry`].
#[derive(Debug, Clone)]
pub struct RequestGuard {
    registry: Arc<CircuitRegistry>,
}

impl RequestGuard {
    pub fn new(registry: Arc<CircuitRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CircuitRegistry> {
        &self.registry
    }

    /// Run `operation` through the circuit for `identifier` with the
    /// [`DefaultPolicy`] and no deadline.
    pub async fn run<T, E, F, Fut>(
        &self,
        identifier: &str,
        operation: F,
    ) -> Result<T, CallError<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(identifier, &DefaultPolicy, None, operation).await
    }

    /// Run `operation` through the circuit for `identifier`.
    ///
    /// The operation is not invoked when the circuit refuses the call. Its
    /// outcome is classified by `policy` and recorded before being returned
    /// unchanged inside `Ok` or [`CallError`]. If this future is dropped
    /// while the operation runs, the call counts as a failure.
    pub async fn run_with<T, E, P, F, Fut>(
        &self,
        identifier: &str,
        policy: &P,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, CallError<T, E>>
    where
        P: FailurePolicy<T, E> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let circuit = self.registry.get(identifier);
        let permit = circuit.try_acquire()?;

        match with_deadline(timeout, operation()).await {
            Deadline::Completed(Ok(value)) => {
                let failed = policy.is_failure(CallOutcome::Success(&value));
                permit.record(failed);
                if failed {
                    Err(CallError::Unsuccessful(value))
                } else {
                    Ok(value)
                }
            }
            Deadline::Completed(Err(error)) => {
                permit.record(policy.is_failure(CallOutcome::Error(&error)));
                Err(CallError::Failed(error))
            }
            Deadline::Elapsed(after) => {
                tracing::debug!(circuit = %identifier, timeout = ?after, "Guarded call timed out");
                permit.record(policy.is_failure(CallOutcome::Timeout(after)));
                Err(CallError::TimedOut(after))
            }
        }
    }
}

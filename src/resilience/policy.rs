//! Outcome classification.
//!
//! A [`FailurePolicy`] decides whether the result of a guarded call counts
//! against its circuit. The default counts errors and timeouts; callers can
//! widen it, e.g. to treat an HTTP 5xx or a slow response as a failure.

use std::sync::Arc;
use std::time::Duration;

/// The result of a guarded operation, as seen by a [`FailurePolicy`].
#[derive(Debug)]
pub enum CallOutcome<'a, T, E> {
    /// The operation returned a value.
    Success(&'a T),
    /// The operation returned an error.
    Error(&'a E),
    /// The operation did not finish before its deadline.
    Timeout(Duration),
}

impl<T, E> Clone for CallOutcome<'_, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for CallOutcome<'_, T, E> {}

/// Strategy deciding whether an outcome is a circuit failure.
pub trait FailurePolicy<T, E>: Send + Sync {
    /// Returns true if `outcome` should count as a failure.
    fn is_failure(&self, outcome: CallOutcome<'_, T, E>) -> bool;
}

/// Errors and timeouts are failures; returned values are successes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl<T, E> FailurePolicy<T, E> for DefaultPolicy {
    fn is_failure(&self, outcome: CallOutcome<'_, T, E>) -> bool {
        !matches!(outcome, CallOutcome::Success(_))
    }
}

/// A [`FailurePolicy`] backed by a closure. Built with [`policy_fn`].
#[derive(Debug, Clone, Copy)]
pub struct PolicyFn<F>(F);

/// Build a policy from a closure over [`CallOutcome`].
///
/// ```
/// use circuit_guard::resilience::{policy_fn, CallOutcome};
///
/// // Only timeouts trip the circuit.
/// let policy = policy_fn(|outcome: CallOutcome<'_, u16, std::io::Error>| {
///     matches!(outcome, CallOutcome::Timeout(_))
/// });
/// # let _ = policy;
/// ```
pub fn policy_fn<T, E, F>(f: F) -> PolicyFn<F>
where
    F: Fn(CallOutcome<'_, T, E>) -> bool + Send + Sync,
{
    PolicyFn(f)
}

impl<T, E, F> FailurePolicy<T, E> for PolicyFn<F>
where
    F: Fn(CallOutcome<'_, T, E>) -> bool + Send + Sync,
{
    fn is_failure(&self, outcome: CallOutcome<'_, T, E>) -> bool {
        (self.0)(outcome)
    }
}

impl<T, E, P> FailurePolicy<T, E> for Arc<P>
where
    P: FailurePolicy<T, E> + ?Sized,
{
    fn is_failure(&self, outcome: CallOutcome<'_, T, E>) -> bool {
        (**self).is_failure(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let error = "boom".to_string();
        assert!(!DefaultPolicy.is_failure(CallOutcome::<u32, String>::Success(&1)));
        assert!(DefaultPolicy.is_failure(CallOutcome::<u32, String>::Error(&error)));
        assert!(DefaultPolicy.is_failure(CallOutcome::<u32, String>::Timeout(Duration::from_secs(1))));
    }

    #[test]
    fn test_closure_policy_can_widen_and_narrow() {
        let slow_only = policy_fn(|outcome: CallOutcome<'_, u32, String>| {
            matches!(outcome, CallOutcome::Timeout(_))
        });
        assert!(!slow_only.is_failure(CallOutcome::Error(&"boom".to_string())));
        assert!(slow_only.is_failure(CallOutcome::Timeout(Duration::from_millis(100))));

        let odd_is_bad = Arc::new(policy_fn(|outcome: CallOutcome<'_, u32, String>| match outcome {
            CallOutcome::Success(v) => v % 2 == 1,
            _ => true,
        }));
        assert!(odd_is_bad.is_failure(CallOutcome::Success(&3)));
        assert!(!odd_is_bad.is_failure(CallOutcome::Success(&4)));
    }
}

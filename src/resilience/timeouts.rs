//! Deadline enforcement for guarded calls.
//!
//! A deadline is reported as its own outcome, distinct from an operation
//! error, so policies can classify slow calls separately.

use std::future::Future;
use std::time::Duration;

/// Result of running a future under an optional deadline.
#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<T> {
    /// The future finished in time.
    Completed(T),
    /// The deadline elapsed first; the future was dropped.
    Elapsed(Duration),
}

/// Run `future`, giving up after `limit` when one is set.
pub async fn with_deadline<F>(limit: Option<Duration>, future: F) -> Deadline<F::Output>
where
    F: Future,
{
    match limit {
        None => Deadline::Completed(future.await),
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(output) => Deadline::Completed(output),
            Err(_) => Deadline::Elapsed(limit),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed() {
        let slow = tokio::time::sleep(Duration::from_secs(5));
        let result = with_deadline(Some(Duration::from_millis(100)), slow).await;
        assert_eq!(result, Deadline::Elapsed(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_completed_without_limit() {
        let result = with_deadline(None, async { 7 }).await;
        assert_eq!(result, Deadline::Completed(7));
    }
}

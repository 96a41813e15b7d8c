//! Runtime glue for the transports.
//!
//! Every call owns exactly one background task (the socket driver or the
//! fetch exchange). They are spawned through this module so the rest of the
//! crate never names the executor directly.

use std::future::Future;
use std::time::Duration;

/// Spawn a detached background task.
///
/// Must be called from within a Tokio runtime.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

/// Run a future with a timeout.
pub async fn timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when [`timeout`] elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError {
    /// How long the operation was allowed to run.
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_display() {
        let err = TimeoutError {
            duration: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "operation timed out after 250ms");
    }

    #[tokio::test]
    async fn test_timeout_elapses() {
        let result = timeout(Duration::from_millis(10), std::future::pending::<()>()).await;
        assert!(result.is_err());

        let result = timeout(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }
}

//! Async testing utilities.
//!
//! Transports report through callbacks on background tasks, so tests wait
//! for conditions rather than awaiting a result directly.

use std::future::Future;
use std::time::Duration;

/// Default timeout for async operations in tests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async function with a timeout.
///
/// # Panics
///
/// Panics if the future does not complete within the timeout.
///
/// # Example
///
/// ```rust
/// use rpcwire_testing::async_helpers::with_timeout;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result = with_timeout(Duration::from_secs(1), async { "hello" }).await;
/// assert_eq!(result, "hello");
/// # }
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Test timed out")
}

/// Run an async function with the default timeout.
///
/// Uses [`DEFAULT_TIMEOUT`] (5 seconds) as the timeout.
pub async fn with_default_timeout<T, F>(future: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout(DEFAULT_TIMEOUT, future).await
}

/// Wait for a condition to become true.
///
/// Polls the condition function at regular intervals until it returns true
/// or the timeout is reached.
///
/// # Panics
///
/// Panics if the condition is not met within the timeout.
pub async fn wait_for<F>(timeout: Duration, interval: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while !condition() {
        assert!(
            start.elapsed() <= timeout,
            "Condition not met within timeout"
        );
        tokio::time::sleep(interval).await;
    }
}

/// Assert that a condition stays false for `duration`.
///
/// # Panics
///
/// Panics if the condition becomes true.
pub async fn assert_stays_false<F>(duration: Duration, interval: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < duration {
        assert!(!condition(), "Condition became true");
        tokio::time::sleep(interval).await;
    }
}

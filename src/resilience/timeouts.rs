//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with the service's deadline
//! - Cancel the in-flight call cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the wrapped future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {timeout_ms}ms exceeded")]
pub struct DeadlineExceeded {
    pub timeout_ms: u64,
}

/// Run `fut` with a hard deadline of `timeout_ms`.
pub async fn with_deadline<F, T>(timeout_ms: u64, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
        .await
        .map_err(|_| DeadlineExceeded { timeout_ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let slow = tokio::time::sleep(Duration::from_secs(5));
        let err = with_deadline(100, slow).await.unwrap_err();
        assert_eq!(err.timeout_ms, 100);
    }

    #[tokio::test]
    async fn test_fast_future_completes() {
        assert_eq!(with_deadline(1_000, async { 7 }).await, Ok(7));
    }
}

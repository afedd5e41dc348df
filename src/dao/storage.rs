use std::{error::Error, future::Future, time::Duration};

use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or aborted the transaction; safe to retry.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A uniqueness or foreign key constraint rejected the write.
    #[error("storage conflict: {message}")]
    Conflict { message: String },
    /// The backend rejected the statement for a non transient reason.
    #[error("storage query failed: {message}")]
    Query {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A row holds a value the application does not understand.
    #[error("corrupt value `{value}` in column `{column}`")]
    Corrupt { column: &'static str, value: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a non transient query error.
    pub fn query(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Query {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        StorageError::Conflict {
            message: message.into(),
        }
    }

    /// Construct a corrupt column error.
    pub fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        StorageError::Corrupt {
            column,
            value: value.into(),
        }
    }
}

/// Errors that know whether retrying the failed operation may succeed.
pub trait Retryable {
    /// `true` when the failure is transient.
    fn is_transient(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

/// Exponential backoff applied to whole storage transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every following one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configured values.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run `op` until it succeeds, fails permanently or the retry budget is spent.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(
                        operation,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage failure; retrying"
                    );
                    sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> StorageError {
        StorageError::unavailable("connection reset".into(), std::io::Error::other("reset"))
    }

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy();

        let result: Result<u32, StorageError> = policy
            .run("test", || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 { Err(transient()) } else { Ok(attempt) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy();

        let result: Result<(), StorageError> = policy
            .run("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), StorageError> = policy
            .run("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::conflict("duplicate room code"))
            })
            .await;

        assert!(matches!(result, Err(StorageError::Conflict { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

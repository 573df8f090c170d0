//! Persistence retry
//!
//! Wraps a single repository call and repeats it when it fails with a
//! transient error. Reads and writes carry independent policies.

use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, warn};

use crate::config::{PersistenceRetryConfig, RetryPolicy};
use crate::error::RepositoryError;

/// Policy selector for a wrapped call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    Read,
    Write,
}

impl Display for RetryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryCategory::Read => write!(f, "read"),
            RetryCategory::Write => write!(f, "write"),
        }
    }
}

/// Errors that may go away when the call is attempted again
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RepositoryError {
    fn is_retryable(&self) -> bool {
        RepositoryError::is_retryable(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceRetry {
    config: PersistenceRetryConfig,
}

impl PersistenceRetry {
    pub fn new(config: PersistenceRetryConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self, category: RetryCategory) -> &RetryPolicy {
        match category {
            RetryCategory::Read => &self.config.read,
            RetryCategory::Write => &self.config.write,
        }
    }

    /// Runs `action` until it succeeds, fails with a non-retryable error, or
    /// the category's attempts are used up
    ///
    /// The last error is returned unchanged. No timeout is applied.
    pub async fn execute<T, E, F, Fut>(&self, category: RetryCategory, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let policy = self.policy(category);
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match action().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "Persistence {} succeeded after {} attempt(s)",
                            category, attempt
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= max_attempts {
                        error!(
                            "Persistence {} failed after {} attempts: {}",
                            category, attempt, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Persistence {} attempt {}/{} failed: {}. Retrying in {:?}...",
                        category, attempt, max_attempts, e, policy.backoff
                    );
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    pub async fn read<T, F, Fut>(&self, action: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        self.execute(RetryCategory::Read, action).await
    }

    pub async fn write<T, F, Fut>(&self, action: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        self.execute(RetryCategory::Write, action).await
    }
}

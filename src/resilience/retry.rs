use crate::client::providers::ProviderError;
use crate::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryConfig {
    /// Config for tests and callers that must not wait
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// What a call site gets back once every attempt has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExhausted {
    /// Return the last error to the caller
    #[default]
    Propagate,
    /// Log the last error and return an empty result
    ReturnEmpty,
}

/// Errors that know whether another attempt could succeed
pub trait Retryable: fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Execute an operation, retrying transient failures with a fixed delay
///
/// Non-retryable errors are returned after the first attempt.
pub async fn retry_with_config<T, E, F, Fut>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(
            "Executing operation '{}' (attempt {}/{})",
            operation_name, attempt, max_attempts
        );

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(error) if !error.is_retryable() => {
                debug!(
                    "Operation '{}' failed with non-retryable error: {}",
                    operation_name, error
                );
                return Err(error);
            }
            Err(error) if attempt >= max_attempts => {
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation_name, attempt, error
                );
                return Err(error);
            }
            Err(error) => {
                warn!(
                    "Operation '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, config.delay, error
                );
                sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry_with_config`], but exhausted or permanent failures become an
/// empty result so the caller can carry on with the rest of its run
pub async fn retry_or_default<T, E, F, Fut>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> T
where
    T: Default,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    match retry_with_config(operation, config, operation_name).await {
        Ok(value) => value,
        Err(e) => {
            error!("Operation '{}' gave up, continuing without results: {}", operation_name, e);
            T::default()
        }
    }
}

/// Run with the exhaustion behavior chosen by the call site
pub async fn retry_with_mode<T, E, F, Fut>(
    operation: F,
    config: &RetryConfig,
    mode: OnExhausted,
    operation_name: &str,
) -> Result<T, E>
where
    T: Default,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    match mode {
        OnExhausted::Propagate => retry_with_config(operation, config, operation_name).await,
        OnExhausted::ReturnEmpty => Ok(retry_or_default(operation, config, operation_name).await),
    }
}

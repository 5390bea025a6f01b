use std::time::Duration;
use thiserror::Error;

/// Crate-wide error type, categorized for the retry layer
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing credential: {variable} is not set")]
    MissingCredential { variable: String },

    // Network errors (transient - should retry)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Service temporarily unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Timeout error: operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // Client errors (permanent - don't retry)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // Malformed responses are retried like network failures
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
}

impl Error {
    /// Categorize error for retry logic
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_)
            | Self::MissingCredential { .. }
            | Self::InvalidInput { .. }
            | Self::AuthenticationFailed(_) => ErrorCategory::Permanent,

            Self::Http(_)
            | Self::RateLimitExceeded { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Timeout { .. }
            | Self::Parse { .. }
            | Self::Provider(_) => ErrorCategory::Transient,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    pub(crate) fn invalid_input(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::client::providers::ProviderError> for Error {
    fn from(err: crate::client::providers::ProviderError) -> Self {
        use crate::client::providers::ProviderError;

        match err {
            ProviderError::Network(msg) => Self::Provider(format!("Network error: {msg}")),
            ProviderError::Parse(msg) => Self::Parse {
                context: "provider".to_string(),
                message: msg,
            },
            ProviderError::RateLimit => Self::RateLimitExceeded {
                retry_after: Duration::from_secs(60),
            },
            ProviderError::Auth(msg) => Self::AuthenticationFailed(msg),
            ProviderError::Configuration(variable) => Self::MissingCredential { variable },
            ProviderError::InvalidQuery(msg) => Self::InvalidInput {
                field: "query".to_string(),
                reason: msg,
            },
            ProviderError::ServiceUnavailable(msg) => Self::ServiceUnavailable {
                service: "provider".to_string(),
                reason: msg,
            },
            ProviderError::Timeout => Self::Timeout {
                timeout: Duration::from_secs(30),
            },
            ProviderError::Other(msg) => Self::Provider(msg),
        }
    }
}

pub mod retry;

pub use retry::{
    retry_or_default, retry_with_config, retry_with_mode, OnExhausted, RetryConfig, Retryable,
};

//! Progress reporting for long-running pipeline stages.

use tracing::info;

/// Observer for fractional progress `(0.0..=1.0, message)`
///
/// Implementations must return quickly; they are called from the
/// coordinating task between units of work.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message);
    }
}

/// Discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}

/// Emits progress updates as log events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f64, message: &str) {
        info!("[{:>3.0}%] {}", fraction * 100.0, message);
    }
}

/// Completed-over-total as a fraction; an empty batch counts as done
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

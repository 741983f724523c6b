//! Delay policies: how long to wait before a given retry.

use super::exponential::ExponentialBackoff;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a retry number to a wait duration.
///
/// Every variant answers the same question through [`DelayPolicy::delay`],
/// so constant and attempt-scaled delays are interchangeable. Retry numbers
/// are 1-indexed: `delay(1)` is the wait before the second attempt.
#[derive(Clone)]
pub enum DelayPolicy {
    /// Same wait before every retry.
    Fixed(Duration),

    /// `step * retry`.
    Linear {
        /// Increment added per retry.
        step: Duration,
    },

    /// Exponential curve with jitter.
    Exponential(ExponentialBackoff),

    /// Caller-supplied function of the retry number.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayPolicy {
    /// Fixed delay in milliseconds.
    pub fn fixed_ms(ms: u64) -> Self {
        DelayPolicy::Fixed(Duration::from_millis(ms))
    }

    /// Linear delay with the given step in milliseconds.
    pub fn linear_ms(step_ms: u64) -> Self {
        DelayPolicy::Linear {
            step: Duration::from_millis(step_ms),
        }
    }

    /// Wrap an arbitrary function of the retry number.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        DelayPolicy::Custom(Arc::new(f))
    }

    /// Wait before retry number `retry` (1-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            DelayPolicy::Fixed(d) => *d,
            DelayPolicy::Linear { step } => step.saturating_mul(retry),
            DelayPolicy::Exponential(backoff) => backoff.delay_for_retry(retry),
            DelayPolicy::Custom(f) => f(retry),
        }
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        DelayPolicy::Fixed(Duration::from_secs(1))
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            DelayPolicy::Linear { step } => f.debug_struct("Linear").field("step", step).finish(),
            DelayPolicy::Exponential(b) => f.debug_tuple("Exponential").field(b).finish(),
            DelayPolicy::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl From<Duration> for DelayPolicy {
    fn from(d: Duration) -> Self {
        DelayPolicy::Fixed(d)
    }
}

impl From<ExponentialBackoff> for DelayPolicy {
    fn from(b: ExponentialBackoff) -> Self {
        DelayPolicy::Exponential(b)
    }
}

//! Exponential backoff with jitter.

use std::time::Duration;

/// Exponential delay curve with configurable jitter.
///
/// Delays grow as `initial_delay * multiplier^(retry - 1)`, capped at
/// `max_delay`. Jitter spreads each delay by up to `±jitter` of its value.
///
/// # Mathematical Formula
///
/// For retry `n` (1-indexed, the first retry is `n = 1`):
/// ```text
/// base_delay = initial_delay * (multiplier ^ (n - 1))
/// jittered   = base_delay + base_delay * jitter * random(-1.0, +1.0)
/// final      = min(jittered, max_delay)
/// ```
///
/// # Examples
///
/// ```rust
/// use steadyload_core::retry::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30))
///     .multiplier(2.0)
///     .jitter(0.0)
///     .build();
///
/// assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        let jittered = if self.jitter > 0.0 {
            // Range is [base * (1 - jitter), base * (1 + jitter)]
            let jitter_amount = base_delay * self.jitter * (rand::random::<f64>() - 0.5) * 2.0;
            base_delay + jitter_amount
        } else {
            base_delay
        };

        let capped = jittered.min(self.max_delay.as_secs_f64()).max(0.0);
        if capped.is_finite() {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Upper bound on any delay this curve produces.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `initial_delay`: 500ms
    /// - `max_delay`: 30s
    /// - `multiplier`: 2.0 (doubles each time)
    /// - `jitter`: 0.1 (10% randomization)
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

/// Builder for configuring [`ExponentialBackoff`].
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Set the delay before the first retry.
    ///
    /// Default: 500ms
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay between retries.
    ///
    /// Default: 30s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the exponential multiplier. Values below 1.0 are raised to 1.0.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier.max(1.0));
        self
    }

    /// Set the jitter factor (0.0 to 1.0).
    ///
    /// Default: 0.1
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the `ExponentialBackoff` instance.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(500)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, multiplier: f64) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .initial_delay(Duration::from_millis(initial_ms))
            .max_delay(Duration::from_millis(max_ms))
            .multiplier(multiplier)
            .jitter(0.0)
            .build()
    }

    #[test]
    fn test_exponential_delay_calculation() {
        let backoff = no_jitter(100, 10_000, 2.0);
        assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_retry(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_cap() {
        let backoff = no_jitter(1_000, 5_000, 10.0);
        for retry in 5..40 {
            assert!(backoff.delay_for_retry(retry) <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jitter_variation() {
        let backoff = ExponentialBackoff::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .jitter(0.5)
            .build();

        let delays: Vec<_> = (0..20).map(|_| backoff.delay_for_retry(1)).collect();
        for delay in &delays {
            let millis = delay.as_millis();
            assert!(
                (500..=1500).contains(&millis),
                "Delay with 50% jitter should be in range [500ms, 1500ms], got {}ms",
                millis
            );
        }
        assert!(!delays.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_builder_defaults() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.initial_delay, Duration::from_millis(500));
        assert_eq!(backoff.max_delay, Duration::from_secs(30));
        assert_eq!(backoff.multiplier, 2.0);
        assert_eq!(backoff.jitter, 0.1);
    }

    #[test]
    fn test_jitter_and_multiplier_clamped() {
        let backoff = ExponentialBackoff::builder().jitter(2.0).multiplier(0.5).build();
        assert_eq!(backoff.jitter, 1.0);
        assert_eq!(backoff.multiplier, 1.0);

        let backoff = ExponentialBackoff::builder().jitter(-0.5).build();
        assert_eq!(backoff.jitter, 0.0);
    }
}

//! Configuration for loaders and invokers.
//!
//! A [`ResilienceConfig`] carries the options hosts usually keep outside the
//! code: retry count and delay, watchdog deadline, indicator floor and
//! presentation. It can be read from TOML, from `STEADYLOAD_*` environment
//! variables, or built in code, and converts into [`LoaderOptions`] and
//! [`ExecuteOptions`].

use crate::error::ConfigError;
use crate::invoker::ExecuteOptions;
use crate::stand_in::LoaderOptions;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use steadyload_core::retry::{DelayPolicy, RetryPolicy};

/// Upper bound on `retries`.
pub const MAX_RETRIES: u32 = 100;

/// Upper bound on `retry_delay_ms`, `timeout_ms` and `min_display_ms`.
pub const MAX_DURATION_MS: u64 = 10 * 60 * 1000;

const ENV_PREFIX: &str = "STEADYLOAD_";

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Every retry waits `retry_delay_ms`.
    #[default]
    Fixed,
    /// Retry `n` waits `n * retry_delay_ms`.
    Linear,
}

impl FromStr for Backoff {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Backoff::Fixed),
            "linear" => Ok(Backoff::Linear),
            other => Err(ConfigError::invalid(format!(
                "unknown backoff '{other}', expected 'fixed' or 'linear'"
            ))),
        }
    }
}

/// Recognized resilience options.
///
/// ```rust
/// use steadyload::config::{Backoff, ResilienceConfig};
///
/// let config = ResilienceConfig::from_toml_str(
///     r#"
///     retries = 3
///     retry_delay_ms = 500
///     retry_backoff = "linear"
///     timeout_ms = 0
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.retries, 3);
/// assert_eq!(config.retry_backoff, Backoff::Linear);
/// assert_eq!(config.timeout(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Retries after the first attempt
    pub retries: u32,
    /// Base delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// How the delay grows
    pub retry_backoff: Backoff,
    /// Watchdog deadline in milliseconds; 0 disables the watchdog
    pub timeout_ms: u64,
    /// Minimum busy-indicator display time in milliseconds
    pub min_display_ms: u64,
    /// Present placeholders full screen
    pub full_screen: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay_ms: 1000,
            retry_backoff: Backoff::Fixed,
            timeout_ms: 10_000,
            min_display_ms: 400,
            full_screen: false,
        }
    }
}

fn env_value<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{ENV_PREFIX}{name}");
    match env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::invalid(format!("{key}={raw}: {err}"))),
        Err(_) => Ok(None),
    }
}

impl ResilienceConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `STEADYLOAD_*` environment variables over the defaults.
    ///
    /// Recognized variables: `STEADYLOAD_RETRIES`, `STEADYLOAD_RETRY_DELAY_MS`,
    /// `STEADYLOAD_RETRY_BACKOFF`, `STEADYLOAD_TIMEOUT_MS`,
    /// `STEADYLOAD_MIN_DISPLAY_MS` and `STEADYLOAD_FULL_SCREEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(retries) = env_value("RETRIES")? {
            config.retries = retries;
        }
        if let Some(delay) = env_value("RETRY_DELAY_MS")? {
            config.retry_delay_ms = delay;
        }
        if let Some(backoff) = env_value("RETRY_BACKOFF")? {
            config.retry_backoff = backoff;
        }
        if let Some(timeout) = env_value("TIMEOUT_MS")? {
            config.timeout_ms = timeout;
        }
        if let Some(floor) = env_value("MIN_DISPLAY_MS")? {
            config.min_display_ms = floor;
        }
        if let Some(full_screen) = env_value("FULL_SCREEN")? {
            config.full_screen = full_screen;
        }

        config.validate()?;
        Ok(config)
    }

    /// Merge this configuration with another, with the other taking precedence
    /// wherever it differs from the defaults.
    pub fn merge(mut self, other: ResilienceConfig) -> Self {
        let defaults = ResilienceConfig::default();
        if other.retries != defaults.retries {
            self.retries = other.retries;
        }
        if other.retry_delay_ms != defaults.retry_delay_ms {
            self.retry_delay_ms = other.retry_delay_ms;
        }
        if other.retry_backoff != defaults.retry_backoff {
            self.retry_backoff = other.retry_backoff;
        }
        if other.timeout_ms != defaults.timeout_ms {
            self.timeout_ms = other.timeout_ms;
        }
        if other.min_display_ms != defaults.min_display_ms {
            self.min_display_ms = other.min_display_ms;
        }
        if other.full_screen != defaults.full_screen {
            self.full_screen = other.full_screen;
        }
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retries > MAX_RETRIES {
            return Err(ConfigError::invalid(format!(
                "retries must be at most {MAX_RETRIES}, got {}",
                self.retries
            )));
        }
        for (name, value) in [
            ("retry_delay_ms", self.retry_delay_ms),
            ("timeout_ms", self.timeout_ms),
            ("min_display_ms", self.min_display_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(ConfigError::invalid(format!(
                    "{name} must be at most {MAX_DURATION_MS}, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Set `retries`.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set `retry_delay_ms` and `retry_backoff`.
    pub fn with_retry_delay(mut self, millis: u64, backoff: Backoff) -> Self {
        self.retry_delay_ms = millis;
        self.retry_backoff = backoff;
        self
    }

    /// Set `timeout_ms`; 0 disables the watchdog.
    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.timeout_ms = millis;
        self
    }

    /// Set `min_display_ms`.
    pub fn with_min_display_ms(mut self, millis: u64) -> Self {
        self.min_display_ms = millis;
        self
    }

    /// Set `full_screen`.
    pub fn with_full_screen(mut self, full_screen: bool) -> Self {
        self.full_screen = full_screen;
        self
    }

    /// The delay curve.
    pub fn delay_policy(&self) -> DelayPolicy {
        match self.retry_backoff {
            Backoff::Fixed => DelayPolicy::fixed_ms(self.retry_delay_ms),
            Backoff::Linear => DelayPolicy::linear_ms(self.retry_delay_ms),
        }
    }

    /// A loader retry policy with the built-in message classifier.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.retries)
            .delay(self.delay_policy())
            .build()
    }

    /// Watchdog deadline, if enabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Minimum busy-indicator display time.
    pub fn min_display(&self) -> Duration {
        Duration::from_millis(self.min_display_ms)
    }

    /// Options for [`make_loader`](crate::make_loader).
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions::default()
            .with_policy(self.retry_policy())
            .with_timeout(self.timeout())
            .with_min_display(self.min_display())
            .with_full_screen(self.full_screen)
    }

    /// Options for [`SingleFlightInvoker::execute`](crate::SingleFlightInvoker::execute).
    pub fn execute_options<T>(&self) -> ExecuteOptions<T> {
        ExecuteOptions::new()
            .max_retries(self.retries)
            .retry_delay(self.delay_policy())
    }
}

impl From<&ResilienceConfig> for LoaderOptions {
    fn from(config: &ResilienceConfig) -> Self {
        config.loader_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retries, 2);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.retry_backoff, Backoff::Fixed);
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.min_display(), Duration::from_millis(400));
        assert!(!config.full_screen);
    }

    #[test]
    fn test_toml_partial_keeps_defaults() {
        let config = ResilienceConfig::from_toml_str("retries = 5\nfull_screen = true").unwrap();
        assert_eq!(config.retries, 5);
        assert!(config.full_screen);
        assert_eq!(config.retry_delay_ms, 1000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ResilienceConfig::default()
            .with_retries(4)
            .with_retry_delay(250, Backoff::Linear);
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ResilienceConfig::from_toml_str(&text).unwrap(), config);
    }

    #[rstest]
    #[case("retries = \"three\"")]
    #[case("retry_backoff = \"exponential\"")]
    #[case("unknown_key = 1")]
    fn test_toml_parse_errors(#[case] source: &str) {
        assert!(matches!(
            ResilienceConfig::from_toml_str(source),
            Err(ConfigError::Parse(_))
        ));
    }

    #[rstest]
    #[case("retries = 1000")]
    #[case("retry_delay_ms = 9999999")]
    #[case("min_display_ms = 9999999")]
    fn test_toml_out_of_range(#[case] source: &str) {
        assert!(matches!(
            ResilienceConfig::from_toml_str(source),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("STEADYLOAD_RETRIES", Some("4")),
                ("STEADYLOAD_RETRY_DELAY_MS", Some("200")),
                ("STEADYLOAD_RETRY_BACKOFF", Some("Linear")),
                ("STEADYLOAD_TIMEOUT_MS", Some("0")),
                ("STEADYLOAD_MIN_DISPLAY_MS", None),
                ("STEADYLOAD_FULL_SCREEN", Some("true")),
            ],
            || {
                let config = ResilienceConfig::from_env().unwrap();
                assert_eq!(config.retries, 4);
                assert_eq!(config.retry_delay_ms, 200);
                assert_eq!(config.retry_backoff, Backoff::Linear);
                assert_eq!(config.timeout(), None);
                assert_eq!(config.min_display_ms, 400);
                assert!(config.full_screen);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("STEADYLOAD_RETRIES", Some("lots"), || {
            let err = ResilienceConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("STEADYLOAD_RETRIES=lots"));
        });
    }

    #[test]
    fn test_merge_prefers_non_default_values() {
        let base = ResilienceConfig::default().with_retries(5).with_full_screen(true);
        let overlay = ResilienceConfig::default().with_timeout_ms(2000);
        let merged = base.merge(overlay);
        assert_eq!(merged.retries, 5);
        assert!(merged.full_screen);
        assert_eq!(merged.timeout_ms, 2000);
    }

    #[test]
    fn test_linear_delay_policy() {
        let config = ResilienceConfig::default().with_retry_delay(100, Backoff::Linear);
        let policy = config.retry_policy();
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(300));
    }

    #[test]
    fn test_loader_options_conversion() {
        let config = ResilienceConfig::default()
            .with_timeout_ms(5000)
            .with_min_display_ms(0)
            .with_full_screen(true);
        let options = LoaderOptions::from(&config);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.min_display, Duration::ZERO);
        assert!(options.full_screen);
        assert_eq!(options.policy.max_retries(), 2);
    }
}

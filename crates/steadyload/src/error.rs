//! Error types for the steadyload runtime.
//!
//! Loader and invoker failures live in [`steadyload_core::error`] and are
//! re-exported here. This module adds what only the runtime produces: the
//! error a [`FailureBoundary`](crate::FailureBoundary) holds once it has
//! caught something, configuration errors, and the crate-level [`Error`].

use std::error::Error as StdError;
use std::sync::Arc;

pub use steadyload_core::error::{
    CleanupCallbackError, ErrorClass, ErrorRecovery, RemoteOperationError, SharedError,
    TerminalLoadError, TerminalReason,
};
pub use steadyload_core::timer::TimerError;

/// Result type for steadyload operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from setting up loaders and reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Timers could not be armed.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),

    /// Configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration could not be read or is out of range.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document is malformed or has wrongly typed fields.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not acceptable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

/// Something went wrong while instantiating or rendering loaded content.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// The unit never loaded.
    #[error(transparent)]
    Load(#[from] TerminalLoadError),

    /// The render function returned an error.
    #[error("render failed: {0}")]
    Failed(SharedError),

    /// The render function panicked.
    #[error("render panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    /// Wrap an arbitrary render failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        RenderError::Failed(Arc::new(error))
    }

    /// Whether the failure came from loading rather than rendering.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, RenderError::Load(_))
    }
}

impl From<SharedError> for RenderError {
    fn from(error: SharedError) -> Self {
        RenderError::Failed(error)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for RenderError {
    fn from(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        RenderError::Failed(Arc::from(error))
    }
}

impl ErrorRecovery for RenderError {
    fn is_retriable(&self) -> bool {
        match self {
            RenderError::Load(err) => err.is_retriable(),
            // A fresh subtree may not hit the same broken state.
            RenderError::Failed(_) | RenderError::Panicked(_) => true,
        }
    }

    fn suggested_action(&self) -> &str {
        match self {
            RenderError::Load(err) => err.suggested_action(),
            RenderError::Failed(_) | RenderError::Panicked(_) => {
                "Something went wrong on this page. Retry, go back, or reload the application."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_render_error_from_terminal_load_error() {
        let load = TerminalLoadError::new(1, TerminalReason::NotRetriable, io::Error::other("boom"));
        let err = RenderError::from(load);
        assert!(err.is_load_failure());
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_render_error_from_boxed_error() {
        let boxed: Box<dyn StdError + Send + Sync> = "widget exploded".into();
        let err = RenderError::from(boxed);
        assert!(matches!(err, RenderError::Failed(_)));
        assert!(err.is_retriable());
        assert_eq!(err.to_string(), "render failed: widget exploded");
    }

    #[test]
    fn test_config_error_wraps_into_crate_error() {
        let err: Error = ConfigError::invalid("retries too large").into();
        assert_eq!(
            err.to_string(),
            "configuration error: invalid configuration: retries too large"
        );
    }
}

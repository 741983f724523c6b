//! Error taxonomy for resilient loading and remote calls.
//!
//! Transient failures never leave this crate's retry loops; what crosses a
//! loader or invoker boundary is one of the terminal types below. Every error
//! implements [`ErrorRecovery`] so presentation code can decide what to offer
//! the user without matching on variants.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A cheaply clonable, type-erased error.
///
/// Terminal errors are published through watch channels and shared between
/// observers, so the underlying failure is reference counted.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Connectivity, timeout or partial-download failure; worth another attempt.
    Transient,
    /// Anything else; retrying would fail the same way.
    Terminal,
}

impl ErrorClass {
    /// Whether this class permits another attempt.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Why a load gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalReason {
    /// Every allowed attempt failed with a transient error.
    RetriesExhausted,
    /// The classifier rejected the error outright.
    NotRetriable,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::RetriesExhausted => write!(f, "retries exhausted"),
            TerminalReason::NotRetriable => write!(f, "not retriable"),
        }
    }
}

/// Recovery guidance attached to every terminal error.
pub trait ErrorRecovery {
    /// Whether a user-initiated retry has a reasonable chance of succeeding.
    fn is_retriable(&self) -> bool;

    /// Short, user-facing hint about what to do next.
    fn suggested_action(&self) -> &str;
}

/// A unit could not be loaded; escalated to the failure boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unit failed to load after {attempts} attempt(s), {reason}: {source}")]
pub struct TerminalLoadError {
    /// Number of times the loader function ran.
    pub attempts: u32,
    /// Why loading stopped.
    pub reason: TerminalReason,
    source: SharedError,
}

impl TerminalLoadError {
    /// Wrap the last loader failure.
    pub fn new<E>(attempts: u32, reason: TerminalReason, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            attempts,
            reason,
            source: Arc::new(error),
        }
    }

    /// Build from an already shared failure.
    pub fn from_shared(attempts: u32, reason: TerminalReason, source: SharedError) -> Self {
        Self {
            attempts,
            reason,
            source,
        }
    }

    /// The last failure reported by the loader function.
    pub fn last_error(&self) -> &SharedError {
        &self.source
    }
}

impl ErrorRecovery for TerminalLoadError {
    fn is_retriable(&self) -> bool {
        // A fresh generation may succeed once connectivity returns.
        matches!(self.reason, TerminalReason::RetriesExhausted)
    }

    fn suggested_action(&self) -> &str {
        match self.reason {
            TerminalReason::RetriesExhausted => {
                "The content could not be downloaded. Check your connection and retry."
            }
            TerminalReason::NotRetriable => {
                "The content failed to load. Go back or reload the application."
            }
        }
    }
}

/// A remote operation failed on every allowed attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote operation failed after {attempts} attempt(s): {source}")]
pub struct RemoteOperationError {
    /// Number of times the operation ran.
    pub attempts: u32,
    source: SharedError,
}

impl RemoteOperationError {
    /// Wrap the last operation failure.
    pub fn new<E>(attempts: u32, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            attempts,
            source: Arc::new(error),
        }
    }

    /// The last failure reported by the operation.
    pub fn last_error(&self) -> &SharedError {
        &self.source
    }
}

impl ErrorRecovery for RemoteOperationError {
    fn is_retriable(&self) -> bool {
        true
    }

    fn suggested_action(&self) -> &str {
        "The request did not go through. Try again in a moment."
    }
}

/// The go-back cleanup callback failed. Logged, never propagated.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cleanup before navigation failed: {source}")]
pub struct CleanupCallbackError {
    source: SharedError,
}

impl CleanupCallbackError {
    /// Wrap a cleanup failure.
    pub fn new(source: SharedError) -> Self {
        Self { source }
    }
}

impl ErrorRecovery for CleanupCallbackError {
    fn is_retriable(&self) -> bool {
        false
    }

    fn suggested_action(&self) -> &str {
        "Some page state may be stale after navigating back."
    }
}

//! Load lifecycle events and the callback that receives them.
//!
//! Logs are for operators; events are for the host application. Every state
//! change of a loader, watchdog or retry controller is reported as a
//! [`LoadEvent`] to the [`EventSink`] configured on [`LoaderOptions`](crate::LoaderOptions).
//!
//! # Example
//!
//! ```rust
//! use steadyload::lifecycle::{EventSink, LoadEvent};
//!
//! let sink = EventSink::new(|event: &LoadEvent| {
//!     if let LoadEvent::Slow { label, .. } = event {
//!         eprintln!("{label} is taking a while");
//!     }
//! });
//! sink.emit(LoadEvent::Slow {
//!     label: "dashboard".into(),
//!     generation: 0,
//!     deadline_ms: 5000,
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Something observable happened to a unit being loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadEvent {
    /// The loader function was invoked.
    AttemptStarted {
        /// Loader label
        label: String,
        /// Generation that owns the attempt
        generation: u64,
        /// Attempt index (0-indexed)
        attempt: u32,
    },

    /// An attempt failed.
    AttemptFailed {
        /// Loader label
        label: String,
        /// Generation that owns the attempt
        generation: u64,
        /// Attempt index (0-indexed)
        attempt: u32,
        /// Error message
        error: String,
        /// Whether the classifier judged the failure transient
        transient: bool,
    },

    /// A retry timer was armed.
    RetryScheduled {
        /// Loader label
        label: String,
        /// Generation that owns the retry
        generation: u64,
        /// Index of the attempt that will run
        attempt: u32,
        /// Wait before it runs
        delay_ms: u64,
    },

    /// The unit loaded.
    Succeeded {
        /// Loader label
        label: String,
        /// Generation that loaded it
        generation: u64,
        /// Number of attempts it took
        attempts: u32,
    },

    /// The loader gave up.
    Failed {
        /// Loader label
        label: String,
        /// Generation that gave up
        generation: u64,
        /// Number of attempts made
        attempts: u32,
        /// Terminal error message
        error: String,
    },

    /// The watchdog deadline passed while the load was still pending.
    Slow {
        /// Loader label
        label: String,
        /// Generation that is slow
        generation: u64,
        /// Watchdog deadline in milliseconds after the generation started
        deadline_ms: u64,
    },

    /// The retry controller discarded a generation and started a new one.
    Regenerated {
        /// Loader label
        label: String,
        /// Discarded generation
        from: u64,
        /// New generation
        to: u64,
    },
}

impl LoadEvent {
    /// Label of the loader the event belongs to
    pub fn label(&self) -> &str {
        match self {
            LoadEvent::AttemptStarted { label, .. }
            | LoadEvent::AttemptFailed { label, .. }
            | LoadEvent::RetryScheduled { label, .. }
            | LoadEvent::Succeeded { label, .. }
            | LoadEvent::Failed { label, .. }
            | LoadEvent::Slow { label, .. }
            | LoadEvent::Regenerated { label, .. } => label,
        }
    }

    /// Generation the event belongs to. For `Regenerated` this is the new one.
    pub fn generation(&self) -> u64 {
        match self {
            LoadEvent::AttemptStarted { generation, .. }
            | LoadEvent::AttemptFailed { generation, .. }
            | LoadEvent::RetryScheduled { generation, .. }
            | LoadEvent::Succeeded { generation, .. }
            | LoadEvent::Failed { generation, .. }
            | LoadEvent::Slow { generation, .. } => *generation,
            LoadEvent::Regenerated { to, .. } => *to,
        }
    }

    /// Get a human-readable description of this event
    pub fn description(&self) -> String {
        match self {
            LoadEvent::AttemptStarted { attempt, .. } => {
                format!("Loading (attempt {})", attempt + 1)
            }
            LoadEvent::AttemptFailed {
                attempt,
                error,
                transient,
                ..
            } => {
                let kind = if *transient { "transient" } else { "terminal" };
                format!("Attempt {} failed ({}): {}", attempt + 1, kind, error)
            }
            LoadEvent::RetryScheduled {
                attempt, delay_ms, ..
            } => format!("Retrying in {}ms (attempt {})", delay_ms, attempt + 1),
            LoadEvent::Succeeded { attempts, .. } => {
                format!("Loaded after {} attempt(s)", attempts)
            }
            LoadEvent::Failed {
                attempts, error, ..
            } => format!("Gave up after {} attempt(s): {}", attempts, error),
            LoadEvent::Slow { deadline_ms, .. } => {
                format!("Still loading after {}ms", deadline_ms)
            }
            LoadEvent::Regenerated { from, to, .. } => {
                format!("Restarted load (generation {} -> {})", from, to)
            }
        }
    }
}

/// Optional receiver of [`LoadEvent`]s. Clones share the same callback.
#[derive(Clone, Default)]
pub struct EventSink {
    callback: Option<Arc<dyn Fn(&LoadEvent) + Send + Sync>>,
}

impl EventSink {
    /// Deliver events to `callback`.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&LoadEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// A sink that drops every event.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a callback is installed.
    pub fn is_enabled(&self) -> bool {
        self.callback.is_some()
    }

    /// Deliver one event.
    pub fn emit(&self, event: LoadEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

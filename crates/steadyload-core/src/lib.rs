#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the steadyload ecosystem.
//!
//! This crate holds the leaf pieces every resilient loader and invoker is
//! built from:
//!
//! - **Retry classification** via [`RetryClassifier`](retry::RetryClassifier)
//!   - Message-pattern matching for connectivity, timeout and partial-download failures
//!   - Closures and always/never classifiers for special cases
//! - **Delay policies** via [`DelayPolicy`](retry::DelayPolicy)
//!   - Fixed, linear, exponential with jitter, or a custom function
//! - **Immutable retry policies** via [`RetryPolicy`](retry::RetryPolicy)
//! - **Cancellable timers** via [`TimerRegistry`](timer::TimerRegistry) and its RAII guards
//! - **The loader capability** via [`UnitLoader`](unit::UnitLoader)
//! - **A typed error taxonomy** with recovery guidance
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use steadyload_core::prelude::*;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .delay(DelayPolicy::linear_ms(500))
//!     .classifier(MessagePatterns::default())
//!     .build();
//!
//! let err = std::io::Error::other("ChunkLoadError: Loading chunk 12 failed");
//! assert!(matches!(policy.decide(0, &err), RetryDecision::RetryAfter(_)));
//! ```

pub mod error;
pub mod retry;
pub mod timer;
pub mod unit;

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use steadyload_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{
        CleanupCallbackError, ErrorClass, ErrorRecovery, RemoteOperationError, SharedError,
        TerminalLoadError, TerminalReason,
    };
    pub use crate::retry::{
        AlwaysRetry, DelayPolicy, ExponentialBackoff, MessagePatterns, NeverRetry,
        RetryClassifier, RetryDecision, RetryPolicy,
    };
    pub use crate::timer::{RegistryGuard, TimerError, TimerGuard, TimerRegistry};
    pub use crate::unit::{CachedLoader, LoaderFn, UnitLoader, loader_fn};
}

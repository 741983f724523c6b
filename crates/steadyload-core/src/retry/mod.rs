//! Retry classification, delay curves and the immutable retry policy.
//!
//! # Key Types
//!
//! - [`RetryClassifier`] - decides whether a failure is transient
//! - [`MessagePatterns`] - message-pattern classifier with built-in defaults
//! - [`DelayPolicy`] - fixed, linear, exponential or custom delays
//! - [`RetryPolicy`] - limits + delay + classifier, with an async retry loop
//!
//! # Examples
//!
//! ```rust
//! use steadyload_core::retry::{AlwaysRetry, DelayPolicy, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .delay(DelayPolicy::fixed_ms(100))
//!     .classifier(AlwaysRetry)
//!     .build();
//!
//! let value = policy
//!     .execute(|| async { Ok::<_, std::io::Error>(42) })
//!     .await
//!     .map_err(|gave_up| gave_up.error)?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

mod classify;
mod delay;
mod exponential;
mod policy;

pub use classify::{
    AlwaysRetry, DEFAULT_TRANSIENT_PATTERNS, MessagePatterns, NeverRetry, RetryClassifier,
    classify,
};
pub use delay::DelayPolicy;
pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use policy::{GaveUp, RetryDecision, RetryPolicy, RetryPolicyBuilder};

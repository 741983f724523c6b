//! # steadyload
//!
//! Resilient loading of UI units and resilient one-shot remote calls:
//! - Retrying loaders with message-based transient-failure detection
//! - Advisory timeout watchdog that flips a "slow" flag, never aborting the load
//! - Minimum display time for busy indicators
//! - Generation-based retry controller that rebuilds everything on retry
//! - Failure boundary with retry, go back and hard reload
//! - Single-flight retry invoker for remote calls
//!
//! ## Quick Start
//!
//! ```rust
//! use steadyload::{LoaderOptions, Placeholder, make_loader};
//! use steadyload_core::unit::loader_fn;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stand_in = make_loader(
//!         loader_fn(|| async { Ok::<_, std::io::Error>("dashboard module") }).with_label("dashboard"),
//!         LoaderOptions::default(),
//!     )?;
//!
//!     match stand_in.view()? {
//!         Placeholder::Busy { .. } | Placeholder::Slow { .. } => println!("loading..."),
//!         Placeholder::Ready(unit) => println!("{unit}"),
//!     }
//!
//!     let unit = stand_in.ready().await?;
//!     println!("{unit}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use boundary::{
    BoundaryState, ChildKey, FailureBoundary, Navigator, RecoveryAction, RecoveryPanel, Rendered,
};
pub use config::{Backoff, ResilienceConfig};
pub use controller::{Generation, RetryController};
pub use error::{ConfigError, Error, RenderError, Result};
pub use invoker::{ExecuteOptions, SingleFlightInvoker, SingleFlightSession};
pub use lifecycle::{EventSink, LoadEvent};
pub use loader::{LoadAttempt, LoadState, RetryingLoader};
pub use stand_in::{Frame, GuardedStandIn, LoaderOptions, Placeholder, ResilientStandIn, make_loader};
pub use watchdog::{Watchdog, WatchdogState};

// Module declarations
pub mod boundary;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod invoker;
pub mod lifecycle;
pub mod loader;
pub mod stand_in;
pub mod testing;
pub mod watchdog;

// Tracing subscriber setup (requires trace feature)
#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub mod observability;

// Re-export core items used in every loader setup
pub use steadyload_core::retry::{DelayPolicy, RetryPolicy};
pub use steadyload_core::unit::{UnitLoader, loader_fn};

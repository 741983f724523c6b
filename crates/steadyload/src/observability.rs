//! Tracing setup for applications without their own subscriber.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's job. Hosts that have none can enable the `trace` feature and call
//! [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "steadyload=info";

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
///
/// ```rust,no_run
/// steadyload::observability::init_tracing();
/// ```
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

//! Minimum display time for the busy indicator.
//!
//! A load that settles a few milliseconds after starting would otherwise make
//! the indicator flash. [`MinimumDisplay`] keeps it up until a floor duration
//! has passed since the generation started, whatever the load state.

use std::sync::Arc;
use std::time::Duration;
use steadyload_core::timer::{TimerError, TimerGuard, TimerRegistry};
use tokio::sync::watch;
use tokio::time::Instant;

/// Whether an indicator shown since `started_at` may be hidden at `now`.
///
/// ```rust
/// use steadyload::debounce::should_hide_indicator;
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let start = Instant::now();
/// let floor = Duration::from_millis(400);
/// assert!(!should_hide_indicator(start, floor, start + Duration::from_millis(10)));
/// assert!(should_hide_indicator(start, floor, start + floor));
/// ```
pub fn should_hide_indicator(started_at: Instant, floor: Duration, now: Instant) -> bool {
    now.saturating_duration_since(started_at) >= floor
}

/// Floor window for one generation. Clones share the same window.
#[derive(Clone)]
pub struct MinimumDisplay {
    started_at: Instant,
    floor: Duration,
    elapsed: Arc<watch::Sender<bool>>,
    _timer: Option<Arc<TimerGuard>>,
}

impl MinimumDisplay {
    /// Start a window of `floor` now.
    ///
    /// A zero floor is elapsed immediately and arms no timer.
    pub fn arm(floor: Duration, registry: &TimerRegistry) -> Result<Self, TimerError> {
        let started_at = Instant::now();
        let (elapsed, _) = watch::channel(floor.is_zero());
        let elapsed = Arc::new(elapsed);

        let timer = if floor.is_zero() {
            None
        } else {
            let flag = Arc::downgrade(&elapsed);
            let guard = registry.arm_guarded(floor, move || {
                if let Some(flag) = flag.upgrade() {
                    flag.send_replace(true);
                }
            })?;
            Some(Arc::new(guard))
        };

        Ok(Self {
            started_at,
            floor,
            elapsed,
            _timer: timer,
        })
    }

    /// When the window started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Length of the window.
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Whether the floor has passed.
    pub fn floor_elapsed(&self) -> bool {
        *self.elapsed.borrow() || should_hide_indicator(self.started_at, self.floor, Instant::now())
    }

    /// Whether the indicator may be hidden, given whether the load has settled.
    pub fn should_hide(&self, load_settled: bool) -> bool {
        load_settled && self.floor_elapsed()
    }

    /// Watch the floor flag; it flips once when the window closes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.elapsed.subscribe()
    }
}

impl std::fmt::Debug for MinimumDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinimumDisplay")
            .field("floor", &self.floor)
            .field("elapsed", &self.floor_elapsed())
            .finish()
    }
}

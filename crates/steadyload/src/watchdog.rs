//! Advisory timeout for a pending load.
//!
//! The watchdog never touches the load itself. When its deadline passes it
//! only flips a "slow" flag so the presentation layer can swap the plain busy
//! indicator for a "taking too long, retry?" affordance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use steadyload_core::timer::{TimerError, TimerGuard, TimerRegistry};
use tokio::sync::watch;
use tokio::time::Instant;

/// Snapshot of a watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogState {
    /// When the load will be considered slow
    pub deadline: Instant,
    /// Whether the deadline passed before the watchdog was disarmed
    pub fired: bool,
}

struct Inner {
    deadline: Instant,
    disarmed: AtomicBool,
    slow: watch::Sender<bool>,
    timer: Mutex<Option<TimerGuard>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Roughly thirty years; stands in for deadlines past the clock's range.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, clamped for timeouts such as `Duration::MAX` that
/// overflow the clock.
fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Single-shot deadline that marks a load as slow. Clones share the same timer.
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Arm a watchdog that fires after `timeout`.
    pub fn arm(timeout: Duration, registry: &TimerRegistry) -> Result<Self, TimerError> {
        Self::arm_with(timeout, registry, || {})
    }

    /// Arm a watchdog and run `on_fire` if the deadline passes first.
    pub fn arm_with<F>(
        timeout: Duration,
        registry: &TimerRegistry,
        on_fire: F,
    ) -> Result<Self, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (slow, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            deadline: deadline_after(Instant::now(), timeout),
            disarmed: AtomicBool::new(false),
            slow,
            timer: Mutex::new(None),
        });

        let fired = Arc::downgrade(&inner);
        let guard = registry.arm_guarded(timeout, move || {
            let Some(inner) = fired.upgrade() else {
                return;
            };
            if inner.disarmed.load(Ordering::SeqCst) {
                return;
            }
            inner.slow.send_replace(true);
            tracing::warn!(timeout_ms = millis(timeout), "load is slow");
            on_fire();
        })?;
        *lock(&inner.timer) = Some(guard);

        Ok(Self { inner })
    }

    /// Stop the watchdog. A flag that already flipped stays flipped.
    pub fn disarm(&self) {
        self.inner.disarmed.store(true, Ordering::SeqCst);
        if let Some(guard) = lock(&self.inner.timer).take() {
            guard.cancel();
        }
    }

    /// Whether [`disarm`](Self::disarm) was called.
    pub fn is_disarmed(&self) -> bool {
        self.inner.disarmed.load(Ordering::SeqCst)
    }

    /// Whether the deadline passed while armed.
    pub fn is_slow(&self) -> bool {
        *self.inner.slow.borrow()
    }

    /// Watch the slow flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.slow.subscribe()
    }

    /// Snapshot of deadline and flag.
    pub fn state(&self) -> WatchdogState {
        WatchdogState {
            deadline: self.inner.deadline,
            fired: self.is_slow(),
        }
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("state", &self.state())
            .field("disarmed", &self.is_disarmed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_deadline() {
        let registry = TimerRegistry::new();
        let watchdog = Watchdog::arm(Duration::from_millis(1000), &registry).unwrap();
        let deadline = watchdog.state().deadline;

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!watchdog.is_slow());

        let mut slow = watchdog.subscribe();
        slow.wait_for(|s| *s).await.unwrap();
        assert!(Instant::now() >= deadline);
        assert!(watchdog.state().fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_before_deadline_keeps_flag_clear() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::arm_with(Duration::from_millis(100), &registry, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        watchdog.disarm();
        assert_eq!(registry.armed_count(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!watchdog.is_slow());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_after_firing_leaves_flag_set() {
        let registry = TimerRegistry::new();
        let watchdog = Watchdog::arm(Duration::from_millis(10), &registry).unwrap();

        watchdog.subscribe().wait_for(|s| *s).await.unwrap();
        watchdog.disarm();
        assert!(watchdog.is_slow());
        assert!(watchdog.is_disarmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_never_fires() {
        let registry = TimerRegistry::new();
        let watchdog = Watchdog::arm(Duration::MAX, &registry).unwrap();
        assert!(watchdog.state().deadline > Instant::now() + Duration::from_secs(86_400 * 365));

        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert!(!watchdog.is_slow());
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_registry_disarms() {
        let registry = TimerRegistry::new();
        let watchdog = Watchdog::arm(Duration::from_millis(10), &registry).unwrap();
        registry.close();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!watchdog.is_slow());
    }
}

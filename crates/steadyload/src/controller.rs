//! Generation-based retry controller.
//!
//! Every load runs inside a generation slot: one timer registry shared by the
//! slot's [`RetryingLoader`], [`Watchdog`] and [`MinimumDisplay`]. Retrying
//! never resets a slot in place. [`RetryController::retry`] closes the old
//! registry, which aborts every timer and attempt of the old generation,
//! and only then builds the next slot from scratch.

use crate::debounce::MinimumDisplay;
use crate::lifecycle::LoadEvent;
use crate::loader::{LoadState, RetryingLoader};
use crate::stand_in::LoaderOptions;
use crate::watchdog::{Watchdog, WatchdogState, millis};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use steadyload_core::timer::{RegistryGuard, TimerError, TimerRegistry};
use steadyload_core::unit::UnitLoader;
use tokio::sync::watch;
use tracing::info;

/// Identity of one loader/watchdog/debounce triple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    /// The generation a controller starts with.
    pub const INITIAL: Generation = Generation(0);

    /// Raw counter value
    pub fn value(self) -> u64 {
        self.0
    }

    /// The generation after this one.
    pub fn next(self) -> Generation {
        Generation(self.0.saturating_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

struct Slot<L: UnitLoader> {
    generation: Generation,
    timers: TimerRegistry,
    loader: RetryingLoader<L>,
    watchdog: Option<Watchdog>,
    display: MinimumDisplay,
    _guard: RegistryGuard,
}

impl<L: UnitLoader> Slot<L> {
    fn build(
        loader: &Arc<L>,
        options: &LoaderOptions,
        generation: Generation,
    ) -> Result<Self, TimerError> {
        let timers = TimerRegistry::new();
        let guard = timers.guard();

        let display = MinimumDisplay::arm(options.min_display, &timers)?;

        let watchdog = match options.timeout {
            Some(timeout) => {
                let events = options.events.clone();
                let label = loader.label().to_string();
                Some(Watchdog::arm_with(timeout, &timers, move || {
                    events.emit(LoadEvent::Slow {
                        label,
                        generation: generation.value(),
                        deadline_ms: millis(timeout),
                    });
                })?)
            }
            None => None,
        };

        let retrying = RetryingLoader::start_in(
            Arc::clone(loader),
            options.policy.clone(),
            timers.clone(),
            generation,
            options.events.clone(),
        )?;

        if let Some(watchdog) = &watchdog {
            let watchdog = watchdog.clone();
            let mut states = retrying.subscribe();
            timers.schedule(Duration::ZERO, async move {
                // A closed channel means the generation is gone; disarm either way.
                let _ = states.wait_for(|state| !state.is_pending()).await;
                watchdog.disarm();
            })?;
        }

        Ok(Self {
            generation,
            timers,
            loader: retrying,
            watchdog,
            display,
            _guard: guard,
        })
    }

    fn snapshot(&self) -> Snapshot<L::Unit> {
        Snapshot {
            generation: self.generation,
            state: self.loader.state(),
            slow: self.watchdog.as_ref().is_some_and(Watchdog::is_slow),
            floor_elapsed: self.display.floor_elapsed(),
        }
    }
}

/// Consistent view of the current generation.
#[derive(Debug)]
pub struct Snapshot<T> {
    /// Current generation
    pub generation: Generation,
    /// Its load state
    pub state: LoadState<T>,
    /// Whether its watchdog fired
    pub slow: bool,
    /// Whether its minimum-display window has closed
    pub floor_elapsed: bool,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            state: self.state.clone(),
            slow: self.slow,
            floor_elapsed: self.floor_elapsed,
        }
    }
}

/// Receivers for everything a presentation layer re-renders on.
///
/// Created before reading a snapshot, so no change in between is lost.
pub struct Changes<T> {
    generation: watch::Receiver<Generation>,
    state: watch::Receiver<LoadState<T>>,
    slow: Option<watch::Receiver<bool>>,
    floor: watch::Receiver<bool>,
}

impl<T> Changes<T> {
    /// Wait until anything changes.
    pub async fn wait(self) {
        let Changes {
            mut generation,
            mut state,
            slow,
            mut floor,
        } = self;
        let slow = async move {
            match slow {
                Some(mut slow) => {
                    let _ = slow.changed().await;
                }
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = generation.changed() => {}
            _ = state.changed() => {}
            _ = floor.changed() => {}
            _ = slow => {}
        }
    }
}

struct ControllerInner<L: UnitLoader> {
    loader: Arc<L>,
    options: LoaderOptions,
    slot: Mutex<Slot<L>>,
    generation: watch::Sender<Generation>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the attempt generation of one unit. Clones share the same slot.
///
/// # Examples
///
/// ```rust
/// use steadyload::{LoaderOptions, RetryController};
/// use steadyload_core::unit::loader_fn;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = RetryController::new(
///     loader_fn(|| async { Ok::<_, std::io::Error>(1) }),
///     LoaderOptions::default(),
/// )?;
/// assert_eq!(controller.generation().value(), 0);
///
/// let next = controller.retry()?;
/// assert_eq!(next.value(), 1);
/// # Ok(())
/// # }
/// ```
pub struct RetryController<L: UnitLoader> {
    inner: Arc<ControllerInner<L>>,
}

impl<L: UnitLoader> Clone for RetryController<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: UnitLoader> RetryController<L> {
    /// Start generation 0 for `loader`.
    pub fn new(loader: L, options: LoaderOptions) -> Result<Self, TimerError> {
        Self::new_shared(Arc::new(loader), options)
    }

    /// Start generation 0 for a loader shared with other owners.
    pub fn new_shared(loader: Arc<L>, options: LoaderOptions) -> Result<Self, TimerError> {
        let slot = Slot::build(&loader, &options, Generation::INITIAL)?;
        let (generation, _) = watch::channel(Generation::INITIAL);
        Ok(Self {
            inner: Arc::new(ControllerInner {
                loader,
                options,
                slot: Mutex::new(slot),
                generation,
            }),
        })
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        *self.inner.generation.borrow()
    }

    /// Discard the current generation and start the next one.
    ///
    /// The old generation's timers are cancelled before any timer of the new
    /// one is armed, so a stale retry can never reach the new state.
    ///
    /// Fails with [`TimerError::NoRuntime`] outside a tokio runtime, leaving
    /// the current generation untouched.
    pub fn retry(&self) -> Result<Generation, TimerError> {
        tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let (from, to) = {
            let mut slot = lock(&self.inner.slot);
            let from = slot.generation;
            let to = from.next();
            slot.timers.close();
            *slot = Slot::build(&self.inner.loader, &self.inner.options, to)?;
            (from, to)
        };
        self.inner.generation.send_replace(to);

        info!(
            label = self.inner.loader.label(),
            from = from.value(),
            to = to.value(),
            "retrying unit with a fresh generation"
        );
        self.inner.options.events.emit(LoadEvent::Regenerated {
            label: self.inner.loader.label().to_string(),
            from: from.value(),
            to: to.value(),
        });
        Ok(to)
    }

    /// Consistent snapshot of the current generation.
    pub fn snapshot(&self) -> Snapshot<L::Unit> {
        lock(&self.inner.slot).snapshot()
    }

    /// Load state of the current generation.
    pub fn load_state(&self) -> LoadState<L::Unit> {
        lock(&self.inner.slot).loader.state()
    }

    /// Whether the current generation's watchdog fired.
    pub fn is_slow(&self) -> bool {
        lock(&self.inner.slot)
            .watchdog
            .as_ref()
            .is_some_and(Watchdog::is_slow)
    }

    /// Watchdog snapshot of the current generation, if a timeout is set.
    pub fn watchdog_state(&self) -> Option<WatchdogState> {
        lock(&self.inner.slot).watchdog.as_ref().map(Watchdog::state)
    }

    /// Whether the current generation's minimum-display window has closed.
    pub fn floor_elapsed(&self) -> bool {
        lock(&self.inner.slot).display.floor_elapsed()
    }

    /// Loader invocations in the current generation.
    pub fn attempts(&self) -> u32 {
        lock(&self.inner.slot).loader.attempts()
    }

    /// Watch generation bumps.
    pub fn subscribe_generation(&self) -> watch::Receiver<Generation> {
        self.inner.generation.subscribe()
    }

    /// Watch the load state of the current generation only.
    pub fn subscribe_state(&self) -> watch::Receiver<LoadState<L::Unit>> {
        lock(&self.inner.slot).loader.subscribe()
    }

    /// Receivers for the next change to anything visible.
    pub fn changes(&self) -> Changes<L::Unit> {
        let slot = lock(&self.inner.slot);
        Changes {
            generation: self.inner.generation.subscribe(),
            state: slot.loader.subscribe(),
            slow: slot.watchdog.as_ref().map(Watchdog::subscribe),
            floor: slot.display.subscribe(),
        }
    }

    /// Wait until the current generation resolves.
    ///
    /// A retry while waiting switches to the new generation.
    pub async fn resolved(&self) -> LoadState<L::Unit> {
        let mut generations = self.inner.generation.subscribe();
        loop {
            let (generation, mut states) = {
                let slot = lock(&self.inner.slot);
                (slot.generation, slot.loader.subscribe())
            };
            let settled = states
                .wait_for(|state| !state.is_pending())
                .map(|result| result.ok().map(|state| (*state).clone()));
            tokio::select! {
                state = settled => {
                    if let Some(state) = state {
                        return state;
                    }
                }
                _ = generations.wait_for(|current| *current != generation) => {}
            }
        }
    }

    /// The options every generation is built from.
    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    /// Label of the wrapped loader.
    pub fn label(&self) -> &str {
        self.inner.loader.label()
    }
}

impl<L: UnitLoader> fmt::Debug for RetryController<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("label", &self.label())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

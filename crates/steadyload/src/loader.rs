//! The retrying loader: one unit, one policy, one observable load state.
//!
//! Each attempt runs as a timer task in the loader's [`TimerRegistry`]. A
//! failed attempt is classified by the policy; a transient failure with
//! retries left arms the next attempt after the policy's delay, anything else
//! resolves the state to `Failed`. Dropping the [`RetryingLoader`] closes the
//! registry, so neither a pending retry nor an attempt in flight can touch the
//! state afterwards.

use crate::controller::Generation;
use crate::lifecycle::{EventSink, LoadEvent};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use steadyload_core::error::TerminalLoadError;
use steadyload_core::retry::{RetryDecision, RetryPolicy};
use steadyload_core::timer::{RegistryGuard, TimerError, TimerRegistry};
use steadyload_core::unit::UnitLoader;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a load currently stands.
///
/// Transitions are monotonic: `Pending` moves to exactly one of the other two
/// and never back.
pub enum LoadState<T> {
    /// Attempts are running or scheduled.
    Pending,
    /// The unit loaded.
    Succeeded(Arc<T>),
    /// The loader gave up.
    Failed {
        /// Why it gave up
        error: TerminalLoadError,
        /// Index of the last attempt (0-indexed)
        attempt: u32,
    },
}

impl<T> LoadState<T> {
    /// Still loading
    pub fn is_pending(&self) -> bool {
        matches!(self, LoadState::Pending)
    }

    /// Loaded
    pub fn is_succeeded(&self) -> bool {
        matches!(self, LoadState::Succeeded(_))
    }

    /// Gave up
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed { .. })
    }

    /// The loaded unit, if any.
    pub fn unit(&self) -> Option<&Arc<T>> {
        match self {
            LoadState::Succeeded(unit) => Some(unit),
            _ => None,
        }
    }

    /// The terminal error, if any.
    pub fn error(&self) -> Option<&TerminalLoadError> {
        match self {
            LoadState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl<T> Clone for LoadState<T> {
    fn clone(&self) -> Self {
        match self {
            LoadState::Pending => LoadState::Pending,
            LoadState::Succeeded(unit) => LoadState::Succeeded(Arc::clone(unit)),
            LoadState::Failed { error, attempt } => LoadState::Failed {
                error: error.clone(),
                attempt: *attempt,
            },
        }
    }
}

impl<T> fmt::Debug for LoadState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Pending => write!(f, "Pending"),
            LoadState::Succeeded(_) => write!(f, "Succeeded(..)"),
            LoadState::Failed { error, attempt } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("attempt", attempt)
                .finish(),
        }
    }
}

/// The attempt currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAttempt {
    /// Attempt index (0-indexed)
    pub index: u32,
    /// When the loader function was invoked
    pub started_at: Instant,
}

struct Inner<L: UnitLoader> {
    loader: Arc<L>,
    policy: RetryPolicy,
    timers: TimerRegistry,
    state: watch::Sender<LoadState<L::Unit>>,
    attempts: AtomicU32,
    current: Mutex<Option<LoadAttempt>>,
    generation: Generation,
    events: EventSink,
}

impl<L: UnitLoader> Inner<L> {
    fn label(&self) -> String {
        self.loader.label().to_string()
    }

    fn resolve(&self, next: LoadState<L::Unit>) -> bool {
        *lock(&self.current) = None;
        self.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn schedule_attempt<L: UnitLoader>(
    inner: &Arc<Inner<L>>,
    delay: Duration,
    index: u32,
) -> Result<(), TimerError> {
    inner
        .timers
        .schedule(delay, run_attempt(Arc::clone(inner), index))
        .map(|_| ())
}

fn run_attempt<L: UnitLoader>(inner: Arc<Inner<L>>, index: u32) -> BoxFuture<'static, ()> {
    async move {
        *lock(&inner.current) = Some(LoadAttempt {
            index,
            started_at: Instant::now(),
        });
        inner.attempts.fetch_add(1, Ordering::SeqCst);
        debug!(
            label = inner.loader.label(),
            generation = inner.generation.value(),
            attempt = index,
            "starting load attempt"
        );
        inner.events.emit(LoadEvent::AttemptStarted {
            label: inner.label(),
            generation: inner.generation.value(),
            attempt: index,
        });

        let error = match inner.loader.load().await {
            Ok(unit) => {
                if inner.resolve(LoadState::Succeeded(Arc::new(unit))) {
                    info!(
                        label = inner.loader.label(),
                        generation = inner.generation.value(),
                        attempts = index + 1,
                        "unit loaded"
                    );
                    inner.events.emit(LoadEvent::Succeeded {
                        label: inner.label(),
                        generation: inner.generation.value(),
                        attempts: index + 1,
                    });
                }
                return;
            }
            Err(error) => error,
        };

        let decision = inner.policy.decide(index, &error);
        inner.events.emit(LoadEvent::AttemptFailed {
            label: inner.label(),
            generation: inner.generation.value(),
            attempt: index,
            error: error.to_string(),
            transient: inner.policy.classify(&error).is_transient(),
        });

        match decision {
            RetryDecision::RetryAfter(delay) => {
                *lock(&inner.current) = None;
                debug!(
                    label = inner.loader.label(),
                    generation = inner.generation.value(),
                    attempt = index,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "load attempt failed, retrying"
                );
                inner.events.emit(LoadEvent::RetryScheduled {
                    label: inner.label(),
                    generation: inner.generation.value(),
                    attempt: index + 1,
                    delay_ms: delay.as_millis() as u64,
                });
                if let Err(err) = schedule_attempt(&inner, delay, index + 1) {
                    // Only a discarded loader refuses timers; nobody is watching.
                    debug!(error = %err, "retry not scheduled");
                }
            }
            RetryDecision::GiveUp(reason) => {
                let terminal = TerminalLoadError::new(index + 1, reason, error);
                warn!(
                    label = inner.loader.label(),
                    generation = inner.generation.value(),
                    attempts = index + 1,
                    error = %terminal,
                    "unit failed to load"
                );
                let message = terminal.to_string();
                if inner.resolve(LoadState::Failed {
                    error: terminal,
                    attempt: index,
                }) {
                    inner.events.emit(LoadEvent::Failed {
                        label: inner.label(),
                        generation: inner.generation.value(),
                        attempts: index + 1,
                        error: message,
                    });
                }
            }
        }
    }
    .boxed()
}

/// Loads one unit under a retry policy and publishes its [`LoadState`].
///
/// The first attempt starts on the next scheduler turn after
/// [`start`](Self::start). Attempts are strictly sequential.
///
/// # Examples
///
/// ```rust
/// use steadyload::loader::RetryingLoader;
/// use steadyload_core::retry::{DelayPolicy, RetryPolicy};
/// use steadyload_core::unit::loader_fn;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let loader = RetryingLoader::start(
///     loader_fn(|| async { Ok::<_, std::io::Error>("settings module") }),
///     RetryPolicy::builder().max_retries(2).delay(DelayPolicy::fixed_ms(10)).build(),
/// )?;
///
/// let state = loader.resolved().await;
/// assert_eq!(**state.unit().unwrap(), "settings module");
/// # Ok(())
/// # }
/// ```
pub struct RetryingLoader<L: UnitLoader> {
    inner: Arc<Inner<L>>,
    _timers: RegistryGuard,
}

impl<L: UnitLoader> RetryingLoader<L> {
    /// Start loading with a private timer registry.
    pub fn start(loader: L, policy: RetryPolicy) -> Result<Self, TimerError> {
        Self::start_shared(Arc::new(loader), policy)
    }

    /// Start loading with a loader that is shared with other owners.
    pub fn start_shared(loader: Arc<L>, policy: RetryPolicy) -> Result<Self, TimerError> {
        Self::start_in(
            loader,
            policy,
            TimerRegistry::new(),
            Generation::INITIAL,
            EventSink::none(),
        )
    }

    /// Start loading on `timers`. The loader closes the registry when dropped.
    pub(crate) fn start_in(
        loader: Arc<L>,
        policy: RetryPolicy,
        timers: TimerRegistry,
        generation: Generation,
        events: EventSink,
    ) -> Result<Self, TimerError> {
        let (state, _) = watch::channel(LoadState::Pending);
        let guard = timers.guard();
        let inner = Arc::new(Inner {
            loader,
            policy,
            timers,
            state,
            attempts: AtomicU32::new(0),
            current: Mutex::new(None),
            generation,
            events,
        });
        schedule_attempt(&inner, Duration::ZERO, 0)?;
        Ok(Self {
            inner,
            _timers: guard,
        })
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> LoadState<L::Unit> {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<LoadState<L::Unit>> {
        self.inner.state.subscribe()
    }

    /// Wait until the load succeeds or fails.
    pub async fn resolved(&self) -> LoadState<L::Unit> {
        let mut states = self.inner.state.subscribe();
        match states.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// How many times the loader function has been invoked.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// The attempt in flight, if one is running right now.
    pub fn current_attempt(&self) -> Option<LoadAttempt> {
        *lock(&self.inner.current)
    }

    /// Generation this loader belongs to.
    pub fn generation(&self) -> Generation {
        self.inner.generation
    }

    /// The policy driving the retries.
    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Label of the wrapped loader.
    pub fn label(&self) -> &str {
        self.inner.loader.label()
    }

    /// Stop loading. Pending retries and the attempt in flight are aborted.
    pub fn discard(self) {
        debug!(
            label = self.label(),
            generation = self.inner.generation.value(),
            "discarding loader"
        );
    }
}

impl<L: UnitLoader> fmt::Debug for RetryingLoader<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingLoader")
            .field("label", &self.label())
            .field("generation", &self.inner.generation)
            .field("attempts", &self.attempts())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

//! Cancellable single-shot timers with RAII cleanup.
//!
//! A [`TimerRegistry`] owns the abort handle of every timer armed through it.
//! Timers run on the ambient tokio runtime: the registry sleeps for the
//! requested delay and then drives the supplied future to completion. Closing
//! the registry aborts everything still pending or running and refuses new
//! timers, so a callback can never fire after its owner has moved on.
//!
//! Owners normally hold a [`RegistryGuard`] (closes on drop) or a
//! [`TimerGuard`] (cancels one timer on drop) instead of calling `close` and
//! `cancel` by hand on every exit path.
//!
//! # Example
//!
//! ```rust
//! use steadyload_core::timer::TimerRegistry;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), steadyload_core::timer::TimerError> {
//! let registry = TimerRegistry::new();
//! {
//!     let _guard = registry.guard();
//!     registry.arm(Duration::from_secs(5), || println!("never printed"))?;
//! } // guard dropped: the pending timer is aborted
//! assert!(registry.is_closed());
//! assert_eq!(registry.armed_count(), 0);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Identifies one armed timer within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Why a timer could not be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The registry was closed; its owner is gone.
    #[error("timer registry is closed")]
    Closed,
    /// No tokio runtime is running on this thread.
    #[error("no tokio runtime available to drive timers")]
    NoRuntime,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    armed: HashMap<TimerId, AbortHandle>,
    closed: bool,
}

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of cancellable timers. Clones share the same set of timers.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl TimerRegistry {
    /// Create an open, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that runs `task` after `delay`.
    ///
    /// A zero delay starts the task on the next scheduler turn. The timer
    /// stays registered until the task finishes, so closing the registry also
    /// aborts a task that is mid-flight.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<TimerId, TimerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;

        let mut state = lock(&self.state);
        if state.closed {
            return Err(TimerError::Closed);
        }
        let id = TimerId(state.next_id);
        state.next_id += 1;

        let registry: Weak<Mutex<RegistryState>> = Arc::downgrade(&self.state);
        let join = runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
            if let Some(state) = registry.upgrade() {
                lock(&state).armed.remove(&id);
            }
        });
        state.armed.insert(id, join.abort_handle());
        Ok(id)
    }

    /// Arm a timer that invokes a synchronous callback after `delay`.
    pub fn arm<F>(&self, delay: Duration, callback: F) -> Result<TimerId, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(delay, async move { callback() })
    }

    /// Arm a timer whose lifetime is bound to the returned guard.
    pub fn arm_guarded<F>(&self, delay: Duration, callback: F) -> Result<TimerGuard, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.arm(delay, callback)?;
        Ok(TimerGuard {
            registry: self.clone(),
            id: Some(id),
        })
    }

    /// Cancel one timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        match lock(&self.state).armed.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every armed timer but keep accepting new ones.
    pub fn cancel_all(&self) {
        let drained: Vec<AbortHandle> = lock(&self.state).armed.drain().map(|(_, h)| h).collect();
        for handle in drained {
            handle.abort();
        }
    }

    /// Cancel every armed timer and refuse new ones.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.cancel_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of timers that have not yet finished.
    pub fn armed_count(&self) -> usize {
        lock(&self.state).armed.len()
    }

    /// Whether a specific timer is still pending or running.
    pub fn is_armed(&self, id: TimerId) -> bool {
        lock(&self.state).armed.contains_key(&id)
    }

    /// Guard that closes this registry when dropped.
    pub fn guard(&self) -> RegistryGuard {
        RegistryGuard {
            registry: Some(self.clone()),
        }
    }
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("TimerRegistry")
            .field("armed", &state.armed.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Closes a [`TimerRegistry`] on drop.
#[must_use = "dropping the guard immediately closes the registry"]
pub struct RegistryGuard {
    registry: Option<TimerRegistry>,
}

impl RegistryGuard {
    /// Release the registry without closing it.
    pub fn disarm(mut self) -> Option<TimerRegistry> {
        self.registry.take()
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.close();
        }
    }
}

/// Cancels one timer on drop.
#[must_use = "dropping the guard immediately cancels the timer"]
pub struct TimerGuard {
    registry: TimerRegistry,
    id: Option<TimerId>,
}

impl TimerGuard {
    /// The guarded timer.
    pub fn id(&self) -> Option<TimerId> {
        self.id
    }

    /// Whether the timer is still pending.
    pub fn is_armed(&self) -> bool {
        self.id.is_some_and(|id| self.registry.is_armed(id))
    }

    /// Cancel now. Returns `true` if the timer had not fired yet.
    pub fn cancel(mut self) -> bool {
        self.id
            .take()
            .is_some_and(|id| self.registry.cancel(id))
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.registry.cancel(id);
        }
    }
}

//! Testing utilities for loaders and failure boundaries
//!
//! Provides a scripted loader and a recording navigator so host applications
//! (and this crate's own tests) can exercise retry behavior without a real
//! network.

use crate::boundary::Navigator;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use steadyload_core::unit::UnitLoader;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error returned by a scripted failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ScriptedError(pub String);

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Fail with this message
    Fail(String),
    /// Return the configured unit
    Succeed,
}

struct ScriptState<T> {
    unit: T,
    label: String,
    latency: Option<Duration>,
    fallback_failure: Option<String>,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<Instant>>,
}

/// Loader that plays back a script of failures before succeeding.
///
/// Clones share the script and the call log, so a test can hand one clone to
/// the code under test and inspect the other.
///
/// ```rust
/// use steadyload::testing::ScriptedLoader;
/// use steadyload_core::unit::UnitLoader;
///
/// # async fn example() {
/// let loader = ScriptedLoader::new("page").fail_times(1, "ChunkLoadError");
/// assert!(loader.load().await.is_err());
/// assert_eq!(loader.load().await.unwrap(), "page");
/// assert_eq!(loader.calls(), 2);
/// # }
/// ```
pub struct ScriptedLoader<T> {
    state: Arc<ScriptState<T>>,
}

impl<T> Clone for ScriptedLoader<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> ScriptedLoader<T> {
    /// A loader that succeeds with `unit` once the script runs out.
    pub fn new(unit: T) -> Self {
        Self {
            state: Arc::new(ScriptState {
                unit,
                label: "scripted".to_string(),
                latency: None,
                fallback_failure: None,
                script: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    fn configure(self, f: impl FnOnce(&mut ScriptState<T>)) -> Self {
        match Arc::try_unwrap(self.state) {
            Ok(mut state) => {
                f(&mut state);
                Self {
                    state: Arc::new(state),
                }
            }
            Err(_) => panic!("ScriptedLoader must be configured before it is cloned"),
        }
    }

    /// Fail `times` calls with `message` before moving on.
    pub fn fail_times(self, times: usize, message: &str) -> Self {
        {
            let mut script = lock(&self.state.script);
            for _ in 0..times {
                script.push_back(ScriptStep::Fail(message.to_string()));
            }
        }
        self
    }

    /// Append one step to the script.
    pub fn then(self, step: ScriptStep) -> Self {
        lock(&self.state.script).push_back(step);
        self
    }

    /// Fail with `message` whenever the script is empty, instead of succeeding.
    ///
    /// # Panics
    ///
    /// If the loader has already been cloned.
    pub fn always_failing(self, message: &str) -> Self {
        let message = message.to_string();
        self.configure(|state| state.fallback_failure = Some(message))
    }

    /// Take `latency` to settle every call.
    ///
    /// # Panics
    ///
    /// If the loader has already been cloned.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.configure(|state| state.latency = Some(latency))
    }

    /// Name the loader.
    ///
    /// # Panics
    ///
    /// If the loader has already been cloned.
    pub fn with_label(self, label: &str) -> Self {
        let label = label.to_string();
        self.configure(|state| state.label = label)
    }

    /// Number of times `load` ran.
    pub fn calls(&self) -> usize {
        lock(&self.state.calls).len()
    }

    /// When each call started.
    pub fn call_instants(&self) -> Vec<Instant> {
        lock(&self.state.calls).clone()
    }

    /// Steps not yet played.
    pub fn remaining(&self) -> usize {
        lock(&self.state.script).len()
    }
}

#[async_trait]
impl<T> UnitLoader for ScriptedLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Unit = T;
    type Error = ScriptedError;

    async fn load(&self) -> Result<T, ScriptedError> {
        lock(&self.state.calls).push(Instant::now());
        let step = lock(&self.state.script).pop_front();

        if let Some(latency) = self.state.latency {
            tokio::time::sleep(latency).await;
        }

        match step {
            Some(ScriptStep::Fail(message)) => Err(ScriptedError(message)),
            Some(ScriptStep::Succeed) => Ok(self.state.unit.clone()),
            None => match &self.state.fallback_failure {
                Some(message) => Err(ScriptedError(message.clone())),
                None => Ok(self.state.unit.clone()),
            },
        }
    }

    fn label(&self) -> &str {
        &self.state.label
    }
}

/// A navigation request observed by [`RecordingNavigator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// `go_back` was called
    Back,
    /// `reload_application` was called
    Reload,
}

/// Navigator that records requests instead of navigating.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    log: Arc<Mutex<Vec<Navigation>>>,
}

impl RecordingNavigator {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request, in order.
    pub fn history(&self) -> Vec<Navigation> {
        lock(&self.log).clone()
    }

    /// Number of `go_back` calls.
    pub fn back_count(&self) -> usize {
        lock(&self.log)
            .iter()
            .filter(|n| **n == Navigation::Back)
            .count()
    }

    /// Number of `reload_application` calls.
    pub fn reload_count(&self) -> usize {
        lock(&self.log)
            .iter()
            .filter(|n| **n == Navigation::Reload)
            .count()
    }
}

impl Navigator for RecordingNavigator {
    fn go_back(&self) {
        lock(&self.log).push(Navigation::Back);
    }

    fn reload_application(&self) {
        lock(&self.log).push(Navigation::Reload);
    }
}

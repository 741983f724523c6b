//! Single-flight retries for one-shot remote calls.
//!
//! A [`SingleFlightInvoker`] runs at most one call loop at a time. A call
//! made while another is in flight is dropped on the spot: no queueing and no
//! error, which collapses bursts of duplicate triggers (double clicks, repeated
//! submits) into one execution. The running call retries with a fixed delay
//! and publishes `busy` and `last_error` through a watch channel.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use steadyload_core::error::RemoteOperationError;
use steadyload_core::retry::{AlwaysRetry, DelayPolicy, RetryPolicy};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Reactive state of an invoker.
#[derive(Debug, Clone, Default)]
pub struct SingleFlightSession {
    /// A call loop is running
    pub busy: bool,
    /// Failure of the last call that gave up, cleared when a new call starts
    pub last_error: Option<RemoteOperationError>,
}

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorCallback = Box<dyn FnOnce(&RemoteOperationError) + Send>;

/// Retry limits and callbacks for one [`SingleFlightInvoker::execute`] call.
pub struct ExecuteOptions<T> {
    max_retries: u32,
    retry_delay: DelayPolicy,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for ExecuteOptions<T> {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DelayPolicy::Fixed(DEFAULT_RETRY_DELAY),
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> ExecuteOptions<T> {
    /// Default limits, no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fixed wait between attempts, in milliseconds.
    pub fn retry_delay_ms(mut self, millis: u64) -> Self {
        self.retry_delay = DelayPolicy::fixed_ms(millis);
        self
    }

    /// Any delay curve between attempts.
    pub fn retry_delay(mut self, delay: impl Into<DelayPolicy>) -> Self {
        self.retry_delay = delay.into();
        self
    }

    /// Called with the result before it is returned.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called with the final error when every attempt failed.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&RemoteOperationError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .delay(self.retry_delay.clone())
            .classifier(AlwaysRetry)
            .build()
    }
}

impl<T> fmt::Debug for ExecuteOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Clears `busy` however the call loop ends, including cancellation.
struct BusyGuard {
    session: Arc<watch::Sender<SingleFlightSession>>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.session.send_modify(|session| session.busy = false);
    }
}

/// Runs one remote call at a time with retries. Clones share the same session.
///
/// # Examples
///
/// ```rust
/// use steadyload::invoker::{ExecuteOptions, SingleFlightInvoker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let invoker = SingleFlightInvoker::new();
/// let saved = invoker
///     .execute(
///         || async { Ok::<_, std::io::Error>("saved") },
///         ExecuteOptions::new().max_retries(2).retry_delay_ms(100),
///     )
///     .await;
/// assert_eq!(saved, Some("saved"));
/// assert!(!invoker.busy());
/// # }
/// ```
#[derive(Clone)]
pub struct SingleFlightInvoker {
    session: Arc<watch::Sender<SingleFlightSession>>,
}

impl Default for SingleFlightInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlightInvoker {
    /// An idle invoker.
    pub fn new() -> Self {
        let (session, _) = watch::channel(SingleFlightSession::default());
        Self {
            session: Arc::new(session),
        }
    }

    /// Whether a call loop is running.
    pub fn busy(&self) -> bool {
        self.session.borrow().busy
    }

    /// Failure of the last call that gave up.
    pub fn last_error(&self) -> Option<RemoteOperationError> {
        self.session.borrow().last_error.clone()
    }

    /// Snapshot of the session.
    pub fn session(&self) -> SingleFlightSession {
        self.session.borrow().clone()
    }

    /// Watch `busy` and `last_error`.
    pub fn subscribe(&self) -> watch::Receiver<SingleFlightSession> {
        self.session.subscribe()
    }

    /// Run `operation` with retries unless a call is already in flight.
    ///
    /// Returns `None` when the call was dropped because the invoker was busy,
    /// or when every attempt failed; the latter also records
    /// [`last_error`](Self::last_error) and runs the error callback.
    #[tracing::instrument(skip_all, fields(max_retries = options.max_retries))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F, options: ExecuteOptions<T>) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        let acquired = self.session.send_if_modified(|session| {
            if session.busy {
                false
            } else {
                session.busy = true;
                session.last_error = None;
                true
            }
        });
        if !acquired {
            debug!("call dropped, another one is in flight");
            return None;
        }
        let _busy = BusyGuard {
            session: Arc::clone(&self.session),
        };

        let policy = options.policy();
        match policy.execute(operation).await {
            Ok(value) => {
                if let Some(callback) = options.on_success {
                    callback(&value);
                }
                Some(value)
            }
            Err(gave_up) => {
                let err = RemoteOperationError::new(gave_up.attempts, gave_up.error);
                warn!(attempts = err.attempts, error = %err, "remote operation failed");
                self.session
                    .send_modify(|session| session.last_error = Some(err.clone()));
                if let Some(callback) = options.on_error {
                    callback(&err);
                }
                None
            }
        }
    }
}

impl fmt::Debug for SingleFlightInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightInvoker")
            .field("session", &*self.session.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_success_invokes_callback() {
        let invoker = SingleFlightInvoker::new();
        let seen = Arc::new(Mutex::new(None));
        let store = Arc::clone(&seen);

        let result = invoker
            .execute(
                || async { Ok::<_, io::Error>(5) },
                ExecuteOptions::new().on_success(move |v: &i32| *store.lock().unwrap() = Some(*v)),
            )
            .await;

        assert_eq!(result, Some(5));
        assert_eq!(*seen.lock().unwrap(), Some(5));
        assert!(invoker.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let invoker = SingleFlightInvoker::new();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&starts);

        let result = invoker
            .execute(
                move || {
                    let log = Arc::clone(&log);
                    async move {
                        let mut log = log.lock().unwrap();
                        log.push(Instant::now());
                        if log.len() < 3 {
                            Err(io::Error::other("503"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                ExecuteOptions::new().max_retries(2).retry_delay_ms(100),
            )
            .await;

        assert_eq!(result, Some("done"));
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_records_error_and_calls_back() {
        let invoker = SingleFlightInvoker::new();
        let calls = AtomicU32::new(0);
        let reported = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&reported);

        let result = invoker
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(io::Error::other("permission denied")) }
                },
                ExecuteOptions::new()
                    .max_retries(1)
                    .retry_delay_ms(10)
                    .on_error(move |err| {
                        counter.store(err.attempts, Ordering::SeqCst);
                    }),
            )
            .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(reported.load(Ordering::SeqCst), 2);
        let err = invoker.last_error().unwrap();
        assert!(err.to_string().contains("permission denied"));
        assert!(!invoker.busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_call_clears_last_error() {
        let invoker = SingleFlightInvoker::new();
        invoker
            .execute(
                || async { Err::<(), _>(io::Error::other("x")) },
                ExecuteOptions::new().max_retries(0),
            )
            .await;
        assert!(invoker.last_error().is_some());

        invoker
            .execute(|| async { Ok::<_, io::Error>(()) }, ExecuteOptions::new())
            .await;
        assert!(invoker.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_releases_busy() {
        let invoker = SingleFlightInvoker::new();
        let call = invoker.execute(
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, io::Error>(())
            },
            ExecuteOptions::new(),
        );
        let timed_out = tokio::time::timeout(Duration::from_secs(1), call).await;
        assert!(timed_out.is_err());
        assert!(!invoker.busy());
    }
}

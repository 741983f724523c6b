//! Failure isolation around loaded content.
//!
//! A [`FailureBoundary`] wraps the code that instantiates and renders a
//! loaded unit. The first error or panic out of that code moves the boundary
//! to [`BoundaryState::Caught`]; from then on it renders a
//! [`RecoveryPanel`] instead of the content until the user picks
//! [`RecoveryAction::Retry`]. Re-rendering with the same inputs never heals
//! a caught boundary on its own.

use crate::error::RenderError;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use steadyload_core::error::{CleanupCallbackError, ErrorRecovery, SharedError};
use tracing::{info, warn};

/// Navigation the host application performs on behalf of a boundary.
pub trait Navigator: Send + Sync {
    /// Return to the previous view.
    fn go_back(&self);

    /// Reload the whole application, discarding all in-memory state.
    fn reload_application(&self);
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn go_back(&self) {
        (**self).go_back()
    }

    fn reload_application(&self) {
        (**self).reload_application()
    }
}

/// Whether a boundary is showing content or a recovery panel.
#[derive(Debug, Clone)]
pub enum BoundaryState {
    /// Content renders normally.
    Healthy,
    /// An error was caught; the recovery panel is shown.
    Caught(RenderError),
}

impl BoundaryState {
    /// Whether an error has been caught
    pub fn is_caught(&self) -> bool {
        matches!(self, BoundaryState::Caught(_))
    }
}

/// Identity handed to the wrapped content.
///
/// Changes on every retry, so content keyed on it is rebuilt from scratch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ChildKey(u64);

impl ChildKey {
    /// Raw key value
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Actions offered by the recovery panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Rebuild the content under a fresh identity.
    Retry,
    /// Run the cleanup callback, then navigate back.
    GoBack,
    /// Reload the whole application.
    HardReload,
}

impl RecoveryAction {
    /// Every action, in display order.
    pub const ALL: [RecoveryAction; 3] = [
        RecoveryAction::Retry,
        RecoveryAction::GoBack,
        RecoveryAction::HardReload,
    ];
}

/// What a caught boundary renders.
#[derive(Debug, Clone)]
pub struct RecoveryPanel {
    /// The caught error
    pub error: RenderError,
    /// Hint for the user
    pub suggested_action: String,
    /// Whether retry is likely to help
    pub retry_recommended: bool,
    /// Offered actions
    pub actions: [RecoveryAction; 3],
}

impl RecoveryPanel {
    fn for_error(error: &RenderError) -> Self {
        Self {
            error: error.clone(),
            suggested_action: error.suggested_action().to_string(),
            retry_recommended: error.is_retriable(),
            actions: RecoveryAction::ALL,
        }
    }
}

/// Output of [`FailureBoundary::render`].
#[derive(Debug)]
pub enum Rendered<R> {
    /// The content rendered.
    Content(R),
    /// The boundary is caught.
    Recovery(RecoveryPanel),
}

impl<R> Rendered<R> {
    /// The rendered content, if the boundary is healthy.
    pub fn content(self) -> Option<R> {
        match self {
            Rendered::Content(content) => Some(content),
            Rendered::Recovery(_) => None,
        }
    }

    /// Whether the recovery panel is shown.
    pub fn is_recovery(&self) -> bool {
        matches!(self, Rendered::Recovery(_))
    }
}

type RetryCallback = Box<dyn FnMut() + Send + Sync>;
type CleanupCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), SharedError>> + Send + Sync>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Isolates rendering failures and offers retry, go back and hard reload.
///
/// # Examples
///
/// ```rust
/// use steadyload::boundary::{FailureBoundary, Rendered};
/// use steadyload::error::RenderError;
/// use steadyload::testing::RecordingNavigator;
///
/// let mut boundary = FailureBoundary::new(RecordingNavigator::new());
///
/// let out = boundary.render(|_key| Err::<(), _>(RenderError::Panicked("bad row".into())));
/// assert!(out.is_recovery());
///
/// boundary.retry();
/// let out = boundary.render(|_key| Ok::<_, RenderError>("table"));
/// assert_eq!(out.content(), Some("table"));
/// ```
pub struct FailureBoundary {
    state: BoundaryState,
    key: ChildKey,
    navigator: Arc<dyn Navigator>,
    on_retry: Option<RetryCallback>,
    on_go_back: Option<CleanupCallback>,
}

impl FailureBoundary {
    /// A healthy boundary navigating through `navigator`.
    pub fn new<N>(navigator: N) -> Self
    where
        N: Navigator + 'static,
    {
        Self {
            state: BoundaryState::Healthy,
            key: ChildKey::default(),
            navigator: Arc::new(navigator),
            on_retry: None,
            on_go_back: None,
        }
    }

    /// Run `callback` when the user picks retry, before the content is rebuilt.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: FnMut() + Send + Sync + 'static,
    {
        self.on_retry = Some(Box::new(callback));
        self
    }

    /// Await `cleanup` before navigating back. Its failures are logged only.
    pub fn on_go_back<F, Fut, E>(mut self, cleanup: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.on_go_back = Some(Arc::new(move || {
            cleanup()
                .map(|result| result.map_err(|err| Arc::new(err) as SharedError))
                .boxed()
        }));
        self
    }

    /// Current state.
    pub fn state(&self) -> &BoundaryState {
        &self.state
    }

    /// Whether an error has been caught.
    pub fn is_caught(&self) -> bool {
        self.state.is_caught()
    }

    /// Identity of the current content.
    pub fn child_key(&self) -> ChildKey {
        self.key
    }

    /// Render content, catching errors and panics.
    ///
    /// A caught boundary does not call `child` at all.
    pub fn render<R, E, F>(&mut self, child: F) -> Rendered<R>
    where
        F: FnOnce(ChildKey) -> Result<R, E>,
        E: Into<RenderError>,
    {
        if let BoundaryState::Caught(error) = &self.state {
            return Rendered::Recovery(RecoveryPanel::for_error(error));
        }

        let key = self.key;
        let error = match catch_unwind(AssertUnwindSafe(|| child(key))) {
            Ok(Ok(content)) => return Rendered::Content(content),
            Ok(Err(error)) => error.into(),
            Err(payload) => RenderError::Panicked(panic_message(payload.as_ref())),
        };
        let panel = RecoveryPanel::for_error(&error);
        self.catch(error);
        Rendered::Recovery(panel)
    }

    /// Move to `Caught` with an error raised outside [`render`](Self::render).
    ///
    /// An already caught boundary keeps its first error.
    pub fn catch(&mut self, error: RenderError) {
        if self.state.is_caught() {
            return;
        }
        warn!(key = self.key.value(), error = %error, "failure boundary caught an error");
        self.state = BoundaryState::Caught(error);
    }

    /// Run the retry callback, return to `Healthy` and re-key the content.
    pub fn retry(&mut self) {
        if let Some(callback) = self.on_retry.as_mut() {
            callback();
        }
        self.key = ChildKey(self.key.0.wrapping_add(1));
        self.state = BoundaryState::Healthy;
        info!(key = self.key.value(), "failure boundary reset");
    }

    /// Run the cleanup callback, then navigate back.
    ///
    /// Cleanup failures are logged and never block navigation.
    #[tracing::instrument(skip(self), fields(key = self.key.value()))]
    pub async fn go_back(&self) {
        if let Some(cleanup) = &self.on_go_back
            && let Err(source) = cleanup().await
        {
            let err = CleanupCallbackError::new(source);
            warn!(error = %err, "cleanup before going back failed");
        }
        self.navigator.go_back();
    }

    /// Reload the whole application.
    pub fn hard_reload(&self) {
        info!(key = self.key.value(), "reloading application");
        self.navigator.reload_application();
    }

    /// Perform one of the recovery panel's actions.
    pub async fn perform(&mut self, action: RecoveryAction) {
        match action {
            RecoveryAction::Retry => self.retry(),
            RecoveryAction::GoBack => self.go_back().await,
            RecoveryAction::HardReload => self.hard_reload(),
        }
    }
}

impl fmt::Debug for FailureBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureBoundary")
            .field("state", &self.state)
            .field("key", &self.key)
            .field("has_retry_callback", &self.on_retry.is_some())
            .field("has_cleanup", &self.on_go_back.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Navigation, RecordingNavigator};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_healthy_render_passes_through() {
        let mut boundary = FailureBoundary::new(RecordingNavigator::new());
        let out = boundary.render(|key| Ok::<_, RenderError>(key.value()));
        assert_eq!(out.content(), Some(0));
        assert!(!boundary.is_caught());
    }

    #[test]
    fn test_error_moves_to_caught() {
        let mut boundary = FailureBoundary::new(RecordingNavigator::new());
        let out =
            boundary.render(|_| Err::<(), _>(RenderError::failed(io::Error::other("bad props"))));

        match out {
            Rendered::Recovery(panel) => {
                assert_eq!(panel.actions, RecoveryAction::ALL);
                assert!(panel.retry_recommended);
                assert!(panel.error.to_string().contains("bad props"));
            }
            Rendered::Content(_) => panic!("expected recovery panel"),
        }
        assert!(boundary.is_caught());
    }

    #[test]
    fn test_panic_is_caught() {
        let mut boundary = FailureBoundary::new(RecordingNavigator::new());
        let out = boundary.render(|_| -> Result<(), RenderError> { panic!("index out of range") });
        assert!(out.is_recovery());
        match boundary.state() {
            BoundaryState::Caught(RenderError::Panicked(message)) => {
                assert_eq!(message, "index out of range");
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_caught_boundary_does_not_self_heal() {
        let mut boundary = FailureBoundary::new(RecordingNavigator::new());
        let _ = boundary.render(|_| Err::<(), _>(RenderError::Panicked("first".into())));

        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let out = boundary.render(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RenderError>(())
            });
            assert!(out.is_recovery());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retry_rekeys_and_invokes_callback() {
        let retries = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&retries);
        let mut boundary = FailureBoundary::new(RecordingNavigator::new()).on_retry(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let _ = boundary.render(|_| Err::<(), _>(RenderError::Panicked("boom".into())));
        let before = boundary.child_key();
        boundary.retry();

        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert!(boundary.child_key() > before);
        let out = boundary.render(|key| Ok::<_, RenderError>(key));
        assert_eq!(out.content(), Some(boundary.child_key()));
    }

    #[test]
    fn test_catch_keeps_first_error() {
        let mut boundary = FailureBoundary::new(RecordingNavigator::new());
        boundary.catch(RenderError::Panicked("first".into()));
        boundary.catch(RenderError::Panicked("second".into()));
        match boundary.state() {
            BoundaryState::Caught(RenderError::Panicked(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_go_back_awaits_cleanup_then_navigates() {
        let nav = RecordingNavigator::new();
        let cleaned = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&cleaned);
        let boundary = FailureBoundary::new(nav.clone()).on_go_back(move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(())
            }
        });

        boundary.go_back().await;
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(nav.history(), vec![Navigation::Back]);
    }

    #[tokio::test]
    async fn test_go_back_survives_cleanup_failure() {
        let nav = RecordingNavigator::new();
        let boundary = FailureBoundary::new(nav.clone())
            .on_go_back(|| async { Err::<(), _>(io::Error::other("refresh failed")) });

        boundary.go_back().await;
        assert_eq!(nav.back_count(), 1);
    }

    #[tokio::test]
    async fn test_perform_hard_reload() {
        let nav = RecordingNavigator::new();
        let mut boundary = FailureBoundary::new(nav.clone());
        boundary.perform(RecoveryAction::HardReload).await;
        assert_eq!(nav.reload_count(), 1);
        assert_eq!(nav.back_count(), 0);
    }
}

//! Placeholder-aware stand-ins for units that are not loaded yet.
//!
//! [`make_loader`] is the entry point routing code uses: it starts a
//! [`RetryController`] for the unit and returns a [`ResilientStandIn`] whose
//! [`view`](ResilientStandIn::view) says what to draw right now. Wrap the
//! stand-in in a [`GuardedStandIn`] to also get a failure boundary whose retry
//! action starts a fresh generation.

use crate::boundary::{ChildKey, FailureBoundary, Navigator, RecoveryAction, RecoveryPanel, Rendered};
use crate::controller::{Changes, Generation, RetryController};
use crate::error::{RenderError, Result};
use crate::lifecycle::EventSink;
use crate::loader::LoadState;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use steadyload_core::error::TerminalLoadError;
use steadyload_core::retry::RetryPolicy;
use steadyload_core::unit::UnitLoader;
use tracing::warn;

/// Default watchdog deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum time the busy indicator stays up.
pub const DEFAULT_MIN_DISPLAY: Duration = Duration::from_millis(400);

/// How a stand-in loads and presents its unit.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Retry policy for every generation
    pub policy: RetryPolicy,
    /// Watchdog deadline; `None` disables the slow affordance
    pub timeout: Option<Duration>,
    /// Minimum time the busy indicator stays up
    pub min_display: Duration,
    /// Whether placeholders cover the whole screen
    pub full_screen: bool,
    /// Receiver of lifecycle events
    pub events: EventSink,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            min_display: DEFAULT_MIN_DISPLAY,
            full_screen: false,
            events: EventSink::none(),
        }
    }
}

impl LoaderOptions {
    /// Set the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set or clear the watchdog deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the minimum display time of the busy indicator.
    pub fn with_min_display(mut self, min_display: Duration) -> Self {
        self.min_display = min_display;
        self
    }

    /// Present placeholders full screen.
    pub fn with_full_screen(mut self, full_screen: bool) -> Self {
        self.full_screen = full_screen;
        self
    }

    /// Send lifecycle events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }
}

/// What to draw in place of a unit.
pub enum Placeholder<T> {
    /// Plain busy indicator.
    Busy {
        /// Cover the whole screen
        full_screen: bool,
    },
    /// Busy indicator with a "taking too long, retry?" affordance.
    Slow {
        /// Cover the whole screen
        full_screen: bool,
    },
    /// The unit is loaded and the indicator may go.
    Ready(Arc<T>),
}

impl<T> Placeholder<T> {
    /// Whether the unit is ready to render
    pub fn is_ready(&self) -> bool {
        matches!(self, Placeholder::Ready(_))
    }

    /// Whether the slow affordance is shown
    pub fn is_slow(&self) -> bool {
        matches!(self, Placeholder::Slow { .. })
    }
}

impl<T> Clone for Placeholder<T> {
    fn clone(&self) -> Self {
        match self {
            Placeholder::Busy { full_screen } => Placeholder::Busy {
                full_screen: *full_screen,
            },
            Placeholder::Slow { full_screen } => Placeholder::Slow {
                full_screen: *full_screen,
            },
            Placeholder::Ready(unit) => Placeholder::Ready(Arc::clone(unit)),
        }
    }
}

impl<T> fmt::Debug for Placeholder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Busy { full_screen } => f
                .debug_struct("Busy")
                .field("full_screen", full_screen)
                .finish(),
            Placeholder::Slow { full_screen } => f
                .debug_struct("Slow")
                .field("full_screen", full_screen)
                .finish(),
            Placeholder::Ready(_) => write!(f, "Ready(..)"),
        }
    }
}

/// A retrying, placeholder-aware stand-in for one unit.
pub struct ResilientStandIn<L: UnitLoader> {
    controller: RetryController<L>,
    full_screen: bool,
}

/// Start loading `loader` and return its stand-in.
///
/// # Examples
///
/// ```rust
/// use steadyload::{LoaderOptions, Placeholder, make_loader};
/// use steadyload_core::unit::loader_fn;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stand_in = make_loader(
///     loader_fn(|| async { Ok::<_, std::io::Error>("reports page") }),
///     LoaderOptions::default().with_min_display(Duration::ZERO),
/// )?;
///
/// assert!(matches!(stand_in.view()?, Placeholder::Busy { .. }));
/// let unit = stand_in.ready().await?;
/// assert_eq!(*unit, "reports page");
/// # Ok(())
/// # }
/// ```
pub fn make_loader<L: UnitLoader>(loader: L, options: LoaderOptions) -> Result<ResilientStandIn<L>> {
    ResilientStandIn::new(loader, options)
}

impl<L: UnitLoader> ResilientStandIn<L> {
    /// Same as [`make_loader`].
    pub fn new(loader: L, options: LoaderOptions) -> Result<Self> {
        let full_screen = options.full_screen;
        let controller = RetryController::new(loader, options)?;
        Ok(Self {
            controller,
            full_screen,
        })
    }

    /// What to draw right now.
    ///
    /// A terminal load failure is returned as the error, for the enclosing
    /// failure boundary to catch.
    pub fn view(&self) -> std::result::Result<Placeholder<L::Unit>, TerminalLoadError> {
        let snapshot = self.controller.snapshot();
        let full_screen = self.full_screen;
        match snapshot.state {
            LoadState::Failed { error, .. } => Err(error),
            LoadState::Succeeded(unit) if snapshot.floor_elapsed => Ok(Placeholder::Ready(unit)),
            LoadState::Succeeded(_) => Ok(Placeholder::Busy { full_screen }),
            LoadState::Pending if snapshot.slow => Ok(Placeholder::Slow { full_screen }),
            LoadState::Pending => Ok(Placeholder::Busy { full_screen }),
        }
    }

    /// Wait until the unit can be shown, or the load fails.
    pub async fn ready(&self) -> std::result::Result<Arc<L::Unit>, TerminalLoadError> {
        loop {
            let changes = self.controller.changes();
            if let Placeholder::Ready(unit) = self.view()? {
                return Ok(unit);
            }
            changes.wait().await;
        }
    }

    /// Wait for the next visible change.
    pub async fn changed(&self) {
        self.controller.changes().wait().await;
    }

    /// Start a fresh generation, e.g. from the slow affordance.
    pub fn retry(&self) -> Result<Generation> {
        Ok(self.controller.retry()?)
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.controller.generation()
    }

    /// Load state of the current generation.
    pub fn load_state(&self) -> LoadState<L::Unit> {
        self.controller.load_state()
    }

    /// Whether placeholders cover the whole screen.
    pub fn full_screen(&self) -> bool {
        self.full_screen
    }

    /// The underlying controller.
    pub fn controller(&self) -> &RetryController<L> {
        &self.controller
    }

    /// Receivers for the next visible change.
    pub fn changes(&self) -> Changes<L::Unit> {
        self.controller.changes()
    }
}

impl<L: UnitLoader> fmt::Debug for ResilientStandIn<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientStandIn")
            .field("controller", &self.controller)
            .field("full_screen", &self.full_screen)
            .finish()
    }
}

/// One frame of a [`GuardedStandIn`].
#[derive(Debug)]
pub enum Frame<R> {
    /// Plain busy indicator.
    Busy {
        /// Cover the whole screen
        full_screen: bool,
    },
    /// Busy indicator with a retry affordance.
    Slow {
        /// Cover the whole screen
        full_screen: bool,
    },
    /// Rendered content.
    Content(R),
    /// Recovery panel.
    Recovery(RecoveryPanel),
}

/// A stand-in wrapped in a failure boundary.
///
/// The boundary's retry action starts a fresh generation of the stand-in and
/// re-keys the content.
pub struct GuardedStandIn<L: UnitLoader> {
    stand_in: ResilientStandIn<L>,
    boundary: FailureBoundary,
}

impl<L: UnitLoader> GuardedStandIn<L> {
    /// Guard `stand_in`, navigating through `navigator`.
    pub fn new<N>(stand_in: ResilientStandIn<L>, navigator: N) -> Self
    where
        N: Navigator + 'static,
    {
        let controller = stand_in.controller().clone();
        let boundary = FailureBoundary::new(navigator).on_retry(move || {
            if let Err(err) = controller.retry() {
                warn!(error = %err, "could not start a fresh generation");
            }
        });
        Self { stand_in, boundary }
    }

    /// Await `cleanup` before going back.
    pub fn on_go_back<F, Fut, E>(mut self, cleanup: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.boundary = self.boundary.on_go_back(cleanup);
        self
    }

    /// Render one frame. `render` runs only when the unit is ready.
    pub fn render<R, E, F>(&mut self, render: F) -> Frame<R>
    where
        F: FnOnce(Arc<L::Unit>, ChildKey) -> std::result::Result<R, E>,
        E: Into<RenderError>,
    {
        let stand_in = &self.stand_in;
        let rendered = self.boundary.render(
            |key| -> std::result::Result<Frame<R>, RenderError> {
                match stand_in.view()? {
                    Placeholder::Busy { full_screen } => Ok(Frame::Busy { full_screen }),
                    Placeholder::Slow { full_screen } => Ok(Frame::Slow { full_screen }),
                    Placeholder::Ready(unit) => {
                        render(unit, key).map(Frame::Content).map_err(Into::into)
                    }
                }
            },
        );
        match rendered {
            Rendered::Content(frame) => frame,
            Rendered::Recovery(panel) => Frame::Recovery(panel),
        }
    }

    /// Perform a recovery action.
    pub async fn perform(&mut self, action: RecoveryAction) {
        self.boundary.perform(action).await;
    }

    /// The boundary.
    pub fn boundary(&self) -> &FailureBoundary {
        &self.boundary
    }

    /// The stand-in.
    pub fn stand_in(&self) -> &ResilientStandIn<L> {
        &self.stand_in
    }
}

impl<L: UnitLoader> fmt::Debug for GuardedStandIn<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedStandIn")
            .field("stand_in", &self.stand_in)
            .field("boundary", &self.boundary)
            .finish()
    }
}

//! Integration tests for the failure boundary and the guarded stand-in

mod common;

use common::bare_options;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use steadyload::testing::{Navigation, RecordingNavigator, ScriptedError, ScriptedLoader};
use steadyload::{
    BoundaryState, FailureBoundary, Frame, GuardedStandIn, RecoveryAction, RenderError,
    make_loader,
};

/// Content whose first instantiation throws.
struct FlakyWidget {
    instantiations: AtomicUsize,
}

impl FlakyWidget {
    fn render(&self) -> Result<String, RenderError> {
        let n = self.instantiations.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Err(RenderError::failed(ScriptedError("widget state corrupt".into())))
        } else {
            Ok(format!("widget #{n}"))
        }
    }
}

#[tokio::test]
async fn test_throw_on_first_render_then_retry_recovers() {
    let navigator = RecordingNavigator::new();
    let retries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&retries);
    let mut boundary = FailureBoundary::new(navigator.clone()).on_retry(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let widget = FlakyWidget {
        instantiations: AtomicUsize::new(0),
    };

    let first = boundary.render(|_| widget.render());
    assert!(first.is_recovery());
    let first_key = boundary.child_key();

    boundary.perform(RecoveryAction::Retry).await;
    assert_eq!(retries.load(Ordering::SeqCst), 1);
    assert_ne!(boundary.child_key(), first_key);

    let second = boundary.render(|_| widget.render());
    assert_eq!(second.content().as_deref(), Some("widget #1"));
    assert!(navigator.history().is_empty());
}

#[tokio::test]
async fn test_caught_boundary_ignores_rerenders() {
    let mut boundary = FailureBoundary::new(RecordingNavigator::new());
    let rendered = boundary.render(|_| -> Result<(), RenderError> {
        Err(RenderError::failed(ScriptedError("first".into())))
    });
    assert!(rendered.is_recovery());

    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        let again = boundary.render(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RenderError>(())
        });
        assert!(again.is_recovery());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    boundary.catch(RenderError::failed(ScriptedError("second".into())));
    match boundary.state() {
        BoundaryState::Caught(error) => assert_eq!(error.to_string(), "render failed: first"),
        BoundaryState::Healthy => panic!("boundary should stay caught"),
    }
}

#[tokio::test]
async fn test_panicking_content_is_caught() {
    let mut boundary = FailureBoundary::new(RecordingNavigator::new());
    let rendered = boundary.render(|_| -> Result<(), RenderError> { panic!("index out of bounds") });

    assert!(rendered.is_recovery());
    assert!(matches!(
        boundary.state(),
        BoundaryState::Caught(RenderError::Panicked(msg)) if msg.contains("index out of bounds")
    ));
}

#[tokio::test]
async fn test_go_back_navigates_even_when_cleanup_fails() {
    let navigator = RecordingNavigator::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cleanups);
    let mut boundary = FailureBoundary::new(navigator.clone()).on_go_back(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ScriptedError("session store unavailable".into()))
        }
    });
    boundary.catch(RenderError::failed(ScriptedError("boom".into())));

    boundary.perform(RecoveryAction::GoBack).await;

    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(navigator.history(), vec![Navigation::Back]);
    assert!(boundary.is_caught());
}

#[tokio::test]
async fn test_hard_reload_asks_navigator() {
    let navigator = RecordingNavigator::new();
    let mut boundary = FailureBoundary::new(navigator.clone());

    boundary.perform(RecoveryAction::HardReload).await;

    assert_eq!(navigator.reload_count(), 1);
    assert_eq!(navigator.back_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_guarded_stand_in_recovers_from_terminal_load_failure() {
    let script = ScriptedLoader::new("orders").fail_times(1, "ReferenceError: chunk is not defined");
    let stand_in = make_loader(script.clone(), bare_options(2, 100)).unwrap();
    let navigator = RecordingNavigator::new();
    let mut guarded = GuardedStandIn::new(stand_in, navigator.clone());

    guarded.stand_in().controller().resolved().await;
    let frame = guarded.render(|unit, _| Ok::<_, RenderError>(unit.to_string()));
    let panel = match frame {
        Frame::Recovery(panel) => panel,
        other => panic!("expected recovery panel, got {other:?}"),
    };
    assert!(matches!(panel.error, RenderError::Load(_)));
    assert_eq!(script.calls(), 1);

    guarded.perform(RecoveryAction::Retry).await;
    assert_eq!(guarded.stand_in().generation().value(), 1);
    assert!(!guarded.boundary().is_caught());

    guarded.stand_in().ready().await.unwrap();
    let frame = guarded.render(|unit, key| Ok::<_, RenderError>(format!("{unit}@{}", key.value())));
    assert!(matches!(frame, Frame::Content(ref s) if s == "orders@1"));
    assert_eq!(script.calls(), 2);
    assert!(navigator.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_guarded_stand_in_shows_busy_then_content() {
    let script = ScriptedLoader::new(7u32).with_latency(Duration::from_millis(50));
    let stand_in = make_loader(script, bare_options(0, 0).with_full_screen(true)).unwrap();
    let mut guarded = GuardedStandIn::new(stand_in, RecordingNavigator::new());

    let frame = guarded.render(|unit, _| Ok::<_, RenderError>(*unit));
    assert!(matches!(frame, Frame::Busy { full_screen: true }));

    guarded.stand_in().ready().await.unwrap();
    let frame = guarded.render(|unit, _| Ok::<_, RenderError>(*unit * 6));
    assert!(matches!(frame, Frame::Content(42)));
}

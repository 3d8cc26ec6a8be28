use crate::{
    CaptureController, ControllerConfig, ControllerDeps, ControllerHandle, ControllerState,
    LifecycleEvent,
    capture::{Dimensions, SourceResolver, SourceTier},
    inference::InferenceEngine,
    recording::{CODEC_CANDIDATES, SessionStatus, TriggerOrigin},
    tests::fakes::{FakeEncoderFactory, FakeEngine, FakeProvider, MemoryStore},
};

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use tokio::{sync::broadcast, time::timeout};

const EVENT_WAIT: Duration = Duration::from_secs(30);

struct Harness {
    handle: ControllerHandle,
    events: broadcast::Receiver<LifecycleEvent>,
    provider: Arc<FakeProvider>,
    store: Arc<MemoryStore>,
}

fn spawn(provider: FakeProvider, engine: Option<Arc<FakeEngine>>) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(MemoryStore::default());
    let deps = ControllerDeps {
        provider: provider.clone(),
        encoders: Arc::new(FakeEncoderFactory::new(CODEC_CANDIDATES.to_vec())),
        persistence: store.clone(),
        engine: engine.map(|e| e as Arc<dyn InferenceEngine>),
    };
    let config = ControllerConfig {
        model_input: Dimensions::new(8, 8),
        ..ControllerConfig::default()
    };
    let (handle, _task) = CaptureController::spawn(deps, config);
    let events = handle.subscribe();

    Harness {
        handle,
        events,
        provider,
        store,
    }
}

#[allow(clippy::unwrap_used)]
async fn next_event(events: &mut broadcast::Receiver<LifecycleEvent>) -> LifecycleEvent {
    timeout(EVENT_WAIT, events.recv()).await.unwrap().unwrap()
}

/// WHAT: Manual start then stop records one session
/// WHY: The manual path must work without any detector
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_no_detector_when_manual_start_and_stop_then_session_completed() {
    // Given: A controller without detection
    let mut h = spawn(FakeProvider::new(true, true, true), None);
    assert!(!h.handle.snapshot().detection_enabled);

    // When: Starting, recording a while, stopping
    h.handle.manual_start().await.unwrap();
    let started = next_event(&mut h.events).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.handle.manual_stop().await.unwrap();
    let completed = next_event(&mut h.events).await;

    // Then: Started (manual) then Completed, back to Idle
    match started {
        LifecycleEvent::SessionStarted { session } => {
            assert_eq!(session.origin, TriggerOrigin::Manual);
        }
        other => panic!("expected SessionStarted, got {:?}", other),
    }
    match completed {
        LifecycleEvent::SessionCompleted { session, warning, .. } => {
            assert_eq!(session.status, SessionStatus::Completed);
            assert!(warning.is_none());
        }
        other => panic!("expected SessionCompleted, got {:?}", other),
    }
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, ControllerState::Idle);
    assert_eq!(snapshot.recent.len(), 1);
    assert_eq!(h.store.saved.lock().unwrap().len(), 1);
}

/// WHAT: A second manual start while recording is a no-op
/// WHY: Only one session may record at a time
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_recording_when_manual_start_again_then_single_session() {
    // Given: A manual session
    let mut h = spawn(FakeProvider::new(true, true, true), None);
    h.handle.manual_start().await.unwrap();
    let first = next_event(&mut h.events).await;

    // When: Starting again, then stopping
    h.handle.manual_start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.handle.manual_stop().await.unwrap();
    let second = next_event(&mut h.events).await;

    // Then: The next event is the completion of the first session
    let LifecycleEvent::SessionStarted { session: started } = first else {
        panic!("expected SessionStarted");
    };
    match second {
        LifecycleEvent::SessionCompleted { session, .. } => assert_eq!(session.id, started.id),
        other => panic!("expected SessionCompleted, got {:?}", other),
    }
    assert_eq!(h.store.saved.lock().unwrap().len(), 1);
}

/// WHAT: Stop while idle does nothing
/// WHY: A stray hotkey must not produce events or errors
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_idle_when_manual_stop_then_no_event() {
    let mut h = spawn(FakeProvider::new(true, true, true), None);

    h.handle.manual_stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(matches!(
        h.events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(h.handle.snapshot().state, ControllerState::Idle);
}

/// WHAT: No source available surfaces an Error event and stays Idle
/// WHY: The user needs to know why recording did not start
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_no_source_when_manual_start_then_error_event_and_idle() {
    let mut h = spawn(FakeProvider::new(false, false, false), None);

    h.handle.manual_start().await.unwrap();

    match next_event(&mut h.events).await {
        LifecycleEvent::Error { message } => assert!(message.contains("No capture source")),
        other => panic!("expected Error, got {:?}", other),
    }
    assert_eq!(h.handle.snapshot().state, ControllerState::Idle);
}

/// WHAT: Detector start and end drive an automatic session
/// WHY: Pulls are recorded hands-free
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_detector_signals_when_pull_starts_and_ends_then_automatic_session() {
    // Given: A detector reporting a pull start
    let engine = Arc::new(FakeEngine::new(vec![0.95, 0.1], Duration::ZERO));
    let mut h = spawn(FakeProvider::new(true, true, true), Some(engine.clone()));

    // When: The start is detected
    let started = next_event(&mut h.events).await;

    // Then: Automatic session
    let LifecycleEvent::SessionStarted { session } = started else {
        panic!("expected SessionStarted, got {:?}", started);
    };
    assert_eq!(session.origin, TriggerOrigin::Automatic);

    // When: The detector reports the end
    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.set_scores(vec![0.1, 1.8]);

    // Then: Session completes
    match next_event(&mut h.events).await {
        LifecycleEvent::SessionCompleted { session: done, .. } => assert_eq!(done.id, session.id),
        other => panic!("expected SessionCompleted, got {:?}", other),
    }
    assert!(h.handle.detection_stats().unwrap().signals > 0);
}

/// WHAT: Automatic end does not stop a manual session
/// WHY: Manual control always wins over detection
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_manual_session_when_detector_reports_end_then_still_recording() {
    // Given: A detector constantly reporting a pull end, and a manual session
    let engine = Arc::new(FakeEngine::new(vec![0.1, 1.8], Duration::ZERO));
    let mut h = spawn(FakeProvider::new(true, true, true), Some(engine.clone()));
    h.handle.manual_start().await.unwrap();
    let LifecycleEvent::SessionStarted { session } = next_event(&mut h.events).await else {
        panic!("expected SessionStarted");
    };

    // When: Several end signals arrive
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Then: Still recording the manual session
    assert!(engine.calls.load(Ordering::SeqCst) >= 3);
    assert_eq!(
        h.handle.snapshot().state,
        ControllerState::Recording {
            session_id: session.id,
            origin: TriggerOrigin::Manual,
        }
    );

    // And only a manual stop ends it
    h.handle.manual_stop().await.unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        LifecycleEvent::SessionCompleted { .. }
    ));
}

/// WHAT: Losing the source finalizes the active session
/// WHY: Closing the game mid-pull keeps what was captured
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_recording_when_source_lost_then_session_finalized() {
    // Given: A manual session over a screen source
    let mut h = spawn(FakeProvider::new(false, true, true), None);
    h.handle.manual_start().await.unwrap();
    next_event(&mut h.events).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // When: The source goes away
    h.provider.live.store(false, Ordering::SeqCst);

    // Then: Completed, Idle
    assert!(matches!(
        next_event(&mut h.events).await,
        LifecycleEvent::SessionCompleted { .. }
    ));
    assert_eq!(h.handle.snapshot().state, ControllerState::Idle);
}

/// WHAT: Shutdown finalizes an active session
/// WHY: Exiting the app must not throw away a pull in progress
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_recording_when_shutdown_then_session_finalized_and_controller_gone() {
    let mut h = spawn(FakeProvider::new(true, true, true), None);
    h.handle.manual_start().await.unwrap();
    next_event(&mut h.events).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.handle.shutdown().await.unwrap();

    assert!(matches!(
        next_event(&mut h.events).await,
        LifecycleEvent::SessionCompleted { .. }
    ));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.handle.manual_start().await.is_err());
}

/// WHAT: Screenshot grabs one frame from a fresh source
/// WHY: Screenshots must not disturb recording or detection
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_controller_when_requesting_screenshot_then_full_frame() {
    let h = spawn(FakeProvider::new(true, true, true), None);

    let frame = h.handle.request_screenshot().await.unwrap();

    assert_eq!(frame.dimensions(), Dimensions::new(64, 36));
    assert_eq!(frame.rgba.len(), 64 * 36 * 4);
    assert_eq!(h.provider.stops.load(Ordering::SeqCst), 1);
}

/// WHAT: Screen-only tier order is honoured by the controller
/// WHY: Tier order is user configuration
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_screen_only_config_when_manual_start_then_screen_source() {
    let provider = Arc::new(FakeProvider::new(true, true, true));
    let deps = ControllerDeps {
        provider: provider.clone(),
        encoders: Arc::new(FakeEncoderFactory::new(CODEC_CANDIDATES.to_vec())),
        persistence: Arc::new(MemoryStore::default()),
        engine: None,
    };
    let config = ControllerConfig {
        resolver: SourceResolver::new(vec![SourceTier::Screen], "unused"),
        ..ControllerConfig::default()
    };
    let (handle, _task) = CaptureController::spawn(deps, config);
    let mut events = handle.subscribe();

    handle.manual_start().await.unwrap();

    match next_event(&mut events).await {
        LifecycleEvent::SessionStarted { session } => {
            assert_eq!(session.source.kind, crate::capture::SourceKind::Screen);
        }
        other => panic!("expected SessionStarted, got {:?}", other),
    }
    assert!(provider.calls().iter().all(|c| !c.starts_with("window")));
}

/// WHAT: A detection from a frame captured before a manual command is skipped
/// WHY: Manual control wins when a slow inference lands after the user acted
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_start_detected_in_flight_when_manual_start_and_stop_then_no_automatic_session() {
    // Given: A slow detector that sees a pull start in the first sample
    let engine = Arc::new(FakeEngine::new(vec![0.95, 0.1], Duration::from_secs(2)));
    let mut h = spawn(FakeProvider::new(true, true, true), Some(engine.clone()));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    engine.set_scores(vec![0.1, 0.1]);

    // When: The user starts and stops manually while that inference runs
    h.handle.manual_start().await.unwrap();
    let LifecycleEvent::SessionStarted { session } = next_event(&mut h.events).await else {
        panic!("expected SessionStarted");
    };
    h.handle.manual_stop().await.unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        LifecycleEvent::SessionCompleted { .. }
    ));
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Then: The stale start signal arrived but started nothing
    assert_eq!(session.origin, TriggerOrigin::Manual);
    assert!(h.handle.detection_stats().unwrap().signals >= 1);
    assert!(matches!(
        h.events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(h.handle.snapshot().state, ControllerState::Idle);
    assert_eq!(h.store.saved.lock().unwrap().len(), 1);
}

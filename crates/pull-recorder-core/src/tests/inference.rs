use crate::{
    CaptureError,
    capture::Dimensions,
    inference::{
        DropReason, InferenceGate, InferenceOutcome, InferenceSignal, MODEL_INPUT, RawScores,
        Submission, Thresholds, preprocess,
    },
    sampler::FrameSample,
    tests::fakes::FakeEngine,
};

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use tokio::time::Instant;

fn sample(width: u32, height: u32, rgba: [u8; 4]) -> FrameSample {
    FrameSample {
        pixels: rgba.repeat(width as usize * height as usize),
        width,
        height,
        captured_at: Instant::now(),
    }
}

/// WHAT: Thresholds are strict greater-than
/// WHY: A score equal to the threshold must not trigger a transition
#[test]
fn given_scores_at_threshold_when_deriving_signal_then_not_detected() {
    // Given: Default thresholds
    let thresholds = Thresholds::default();

    // When: Scores exactly at and just above the thresholds
    let at = InferenceSignal::from_scores(0.7, 1.5, thresholds);
    let above = InferenceSignal::from_scores(0.71, 1.51, thresholds);

    // Then: Only the scores above trigger
    assert!(!at.start_detected && !at.end_detected);
    assert!(above.start_detected && above.end_detected);
}

/// WHAT: Score layout must be exactly two finite values
/// WHY: Guessing at an unexpected tensor layout would misfire transitions
#[test]
#[allow(clippy::unwrap_used)]
fn given_malformed_scores_when_splitting_then_malformed_output() {
    assert_eq!(RawScores(vec![0.1, 0.9]).split().unwrap(), (0.1, 0.9));

    for bad in [vec![0.5], vec![0.1, 0.2, 0.3], vec![f32::NAN, 0.2]] {
        assert!(matches!(
            RawScores(bad).split(),
            Err(CaptureError::MalformedOutput { expected: 2, .. })
        ));
    }
}

/// WHAT: Preprocessing resizes and normalizes to NCHW
/// WHY: The detector expects ImageNet-normalized planar input
#[test]
#[allow(clippy::unwrap_used)]
fn given_white_sample_when_preprocessing_then_normalized_planar_tensor() {
    // Given: A small white sample
    let white = sample(8, 6, [255, 255, 255, 255]);

    // When: Preprocessing to the model size
    let tensor = preprocess(white, MODEL_INPUT).unwrap();

    // Then: Shape [1, 3, 384, 384], each plane normalized per channel
    assert_eq!(tensor.shape, [1, 3, 384, 384]);
    let plane = 384 * 384;
    assert_eq!(tensor.data.len(), plane * 3);
    let expected = [(1.0 - 0.485) / 0.229, (1.0 - 0.456) / 0.224, (1.0 - 0.406) / 0.225];
    for (c, want) in expected.iter().enumerate() {
        assert!((tensor.data[c * plane] - want).abs() < 1e-4);
        assert!((tensor.data[c * plane + plane - 1] - want).abs() < 1e-4);
    }
}

/// WHAT: At most one inference is in flight
/// WHY: Queued samples would report stale game state and pile up latency
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_slow_engine_when_submitting_many_then_single_flight_and_rest_dropped() {
    // Given: An engine that takes 5 s per call
    let engine = Arc::new(FakeEngine::new(vec![0.9, 0.1], Duration::from_secs(5)));
    let gate = InferenceGate::with_input(engine.clone(), Thresholds::default(), Dimensions::new(8, 8));

    // When: Ten samples arrive while the first is running
    let mut tasks = Vec::new();
    for _ in 0..10 {
        if let Submission::Accepted(pending) = gate.try_submit(sample(8, 8, [0, 0, 0, 255])) {
            tasks.push(tokio::spawn(pending.run()));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Then: One call, nine drops, never more than one in flight
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 1);
    let stats = gate.stats();
    assert_eq!(stats.submitted, 10);
    assert_eq!(stats.dropped_busy, 9);
    assert_eq!(stats.signals, 1);
}

/// WHAT: Busy gate drops immediately via submit
/// WHY: The ticker must never wait on inference
#[tokio::test(start_paused = true)]
#[allow(clippy::panic)]
async fn given_inference_in_flight_when_submit_then_dropped_busy_without_waiting() {
    // Given: A pending inference holding the slot
    let engine = Arc::new(FakeEngine::new(vec![0.9, 0.1], Duration::from_secs(5)));
    let gate = InferenceGate::with_input(engine, Thresholds::default(), Dimensions::new(8, 8));
    let Submission::Accepted(pending) = gate.try_submit(sample(8, 8, [0, 0, 0, 255])) else {
        panic!("first submission must be accepted");
    };
    assert!(gate.is_busy());

    // When: Submitting another sample
    let started = Instant::now();
    let outcome = gate.submit(sample(8, 8, [0, 0, 0, 255])).await;

    // Then: Dropped(Busy) with no time passing
    assert_eq!(outcome, InferenceOutcome::Dropped(DropReason::Busy));
    assert_eq!(started.elapsed(), Duration::ZERO);

    // And the slot frees once the first completes
    assert!(matches!(pending.run().await, InferenceOutcome::Signal(_)));
    assert!(!gate.is_busy());
}

/// WHAT: Engine errors and malformed output become drops
/// WHY: Detection failures must never escalate to the controller
#[tokio::test]
async fn given_failing_or_malformed_engine_when_submitting_then_dropped_with_reason() {
    // Given: An engine returning three scores
    let engine = Arc::new(FakeEngine::new(vec![0.1, 0.2, 0.3], Duration::ZERO));
    let gate = InferenceGate::with_input(engine.clone(), Thresholds::default(), Dimensions::new(8, 8));

    // When/Then: Malformed output
    let outcome = gate.submit(sample(8, 8, [0, 0, 0, 255])).await;
    assert_eq!(outcome, InferenceOutcome::Dropped(DropReason::MalformedOutput));

    // When/Then: Engine failure
    engine.fail.store(true, Ordering::SeqCst);
    let outcome = gate.submit(sample(8, 8, [0, 0, 0, 255])).await;
    assert_eq!(outcome, InferenceOutcome::Dropped(DropReason::EngineFailed));

    let stats = gate.stats();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.failed, 1);
    assert!(!gate.is_busy());
}

/// WHAT: Signal carries the capture time of its sample
/// WHY: The controller discards signals older than its last transition
#[tokio::test]
#[allow(clippy::unwrap_used, clippy::panic)]
async fn given_valid_scores_when_submitting_then_signal_with_capture_time() {
    let engine = Arc::new(FakeEngine::new(vec![0.95, 0.2], Duration::ZERO));
    let gate = InferenceGate::new(engine.clone(), Thresholds::default());
    let input = sample(16, 9, [10, 20, 30, 255]);
    let captured_at = input.captured_at;

    match gate.submit(input).await {
        InferenceOutcome::Signal(sampled) => {
            assert_eq!(sampled.captured_at, captured_at);
            assert!(sampled.signal.start_detected);
            assert!(!sampled.signal.end_detected);
        }
        other => panic!("expected signal, got {:?}", other),
    }
    assert_eq!(*engine.last_shape.lock().unwrap(), Some([1, 3, 384, 384]));
}

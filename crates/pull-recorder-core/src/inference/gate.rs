use crate::{
    CaptureError,
    capture::Dimensions,
    inference::{InferenceEngine, InferenceSignal, MODEL_INPUT, Thresholds, preprocess},
    sampler::FrameSample,
};

use std::{
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use error_location::ErrorLocation;
use serde::Serialize;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::Instant,
};
use tracing::{debug, trace, warn};

/// Why a sample produced no signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Another inference was still in flight.
    Busy,
    /// Preprocessing or the engine failed.
    EngineFailed,
    /// The engine returned scores with an unexpected layout.
    MalformedOutput,
}

/// A signal together with the time its frame was grabbed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledSignal {
    /// Thresholded scores.
    pub signal: InferenceSignal,
    /// When the sampled frame was grabbed.
    pub captured_at: Instant,
}

/// Result of pushing one sample through the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InferenceOutcome {
    /// Inference completed.
    Signal(SampledSignal),
    /// The sample was discarded.
    Dropped(DropReason),
}

/// Counters since the gate was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// Samples offered to the gate.
    pub submitted: u64,
    /// Samples discarded because an inference was in flight.
    pub dropped_busy: u64,
    /// Inferences that failed in preprocessing or the engine.
    pub failed: u64,
    /// Inferences rejected for a malformed score layout.
    pub malformed: u64,
    /// Signals produced.
    pub signals: u64,
}

#[derive(Debug, Default)]
struct GateCounters {
    submitted: AtomicU64,
    dropped_busy: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
    signals: AtomicU64,
}

/// Single-flight wrapper around an [`InferenceEngine`].
///
/// At most one inference runs at a time. A sample offered while one is in
/// flight is dropped, never queued. Clones share the same slot.
#[derive(Clone)]
pub struct InferenceGate {
    engine: Arc<dyn InferenceEngine>,
    slot: Arc<Semaphore>,
    thresholds: Thresholds,
    input: Dimensions,
    counters: Arc<GateCounters>,
}

/// An accepted sample holding the in-flight slot until it completes.
pub struct PendingInference {
    gate: InferenceGate,
    sample: FrameSample,
    _permit: OwnedSemaphorePermit,
}

/// Result of [`InferenceGate::try_submit`].
pub enum Submission {
    /// The sample took the slot; run it to get the outcome.
    Accepted(PendingInference),
    /// The slot was taken; the sample was discarded.
    Dropped,
}

impl InferenceGate {
    /// Gate with the default model input size.
    pub fn new(engine: Arc<dyn InferenceEngine>, thresholds: Thresholds) -> Self {
        Self::with_input(engine, thresholds, MODEL_INPUT)
    }

    /// Gate with an explicit model input size.
    pub fn with_input(
        engine: Arc<dyn InferenceEngine>,
        thresholds: Thresholds,
        input: Dimensions,
    ) -> Self {
        Self {
            engine,
            slot: Arc::new(Semaphore::new(1)),
            thresholds,
            input,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Active thresholds.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// True while an inference holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> GateStats {
        GateStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped_busy: self.counters.dropped_busy.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            signals: self.counters.signals.load(Ordering::Relaxed),
        }
    }

    /// Take the slot without waiting, or drop the sample.
    pub fn try_submit(&self, sample: FrameSample) -> Submission {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        match Arc::clone(&self.slot).try_acquire_owned() {
            Ok(permit) => Submission::Accepted(PendingInference {
                gate: self.clone(),
                sample,
                _permit: permit,
            }),
            Err(_) => {
                self.counters.dropped_busy.fetch_add(1, Ordering::Relaxed);
                trace!("Inference in flight, sample dropped");
                Submission::Dropped
            }
        }
    }

    /// Offer a sample and wait for its outcome.
    pub async fn submit(&self, sample: FrameSample) -> InferenceOutcome {
        match self.try_submit(sample) {
            Submission::Accepted(pending) => pending.run().await,
            Submission::Dropped => InferenceOutcome::Dropped(DropReason::Busy),
        }
    }
}

impl PendingInference {
    /// Run preprocessing and inference, then release the slot.
    pub async fn run(self) -> InferenceOutcome {
        let PendingInference {
            gate,
            sample,
            _permit: permit,
        } = self;
        let captured_at = sample.captured_at;

        let input = gate.input;
        let tensor = tokio::task::spawn_blocking(move || preprocess(sample, input))
            .await
            .map_err(|e| CaptureError::WorkerFailed {
                reason: format!("preprocessing task failed: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
            .and_then(|tensor| tensor);

        let scores = match tensor {
            Ok(tensor) => gate.engine.infer(&tensor).await,
            Err(e) => Err(e),
        };

        let outcome = match scores.and_then(|raw| raw.split()) {
            Ok((start, end)) => {
                let signal = InferenceSignal::from_scores(start, end, gate.thresholds);
                gate.counters.signals.fetch_add(1, Ordering::Relaxed);
                debug!(
                    start_score = start,
                    end_score = end,
                    start_detected = signal.start_detected,
                    end_detected = signal.end_detected,
                    "Inference complete"
                );
                InferenceOutcome::Signal(SampledSignal {
                    signal,
                    captured_at,
                })
            }
            Err(e @ CaptureError::MalformedOutput { .. }) => {
                gate.counters.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Discarding malformed inference output");
                InferenceOutcome::Dropped(DropReason::MalformedOutput)
            }
            Err(e) => {
                gate.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Inference failed, sample dropped");
                InferenceOutcome::Dropped(DropReason::EngineFailed)
            }
        };

        drop(permit);
        outcome
    }
}

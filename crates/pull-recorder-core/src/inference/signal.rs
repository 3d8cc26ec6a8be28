use serde::{Deserialize, Serialize};

/// Default start-score threshold.
pub const DEFAULT_START_THRESHOLD: f32 = 0.7;

/// Default end-score threshold. Tunable; revisions of the detector have
/// shipped different values.
pub const DEFAULT_END_THRESHOLD: f32 = 1.5;

/// Score thresholds that turn raw scores into start/end decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// A start score strictly above this is a detected start.
    pub start: f32,
    /// An end score strictly above this is a detected end.
    pub end: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_THRESHOLD,
            end: DEFAULT_END_THRESHOLD,
        }
    }
}

/// Start/end decision for one sampled frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceSignal {
    /// Raw start score.
    pub start_score: f32,
    /// Raw end score.
    pub end_score: f32,
    /// `start_score > thresholds.start`.
    pub start_detected: bool,
    /// `end_score > thresholds.end`.
    pub end_detected: bool,
}

impl InferenceSignal {
    /// Apply thresholds to a pair of raw scores.
    pub fn from_scores(start_score: f32, end_score: f32, thresholds: Thresholds) -> Self {
        Self {
            start_score,
            end_score,
            start_detected: start_score > thresholds.start,
            end_detected: end_score > thresholds.end,
        }
    }
}

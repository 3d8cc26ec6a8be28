use crate::config::{DEFAULT_RETRY_DELAY_MS, DEFAULT_SAMPLE_INTERVAL_MS};

use pull_recorder_core::{
    inference::{DEFAULT_END_THRESHOLD, DEFAULT_START_THRESHOLD, MODEL_INPUT},
    sampler::DEFAULT_MAX_SAMPLE_EDGE,
};
use serde::{Deserialize, Serialize};

/// Automatic pull detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Run the detector. Without a `detector_command` this has no effect.
    pub enabled: bool,
    /// Time between detection samples.
    pub sample_interval_ms: u64,
    /// Longest edge of a detection sample.
    pub max_sample_edge: u32,
    /// Start score threshold.
    pub start_threshold: f32,
    /// End score threshold.
    pub end_threshold: f32,
    /// Detector input width.
    pub model_width: u32,
    /// Detector input height.
    pub model_height: u32,
    /// Detector program followed by its arguments.
    pub detector_command: Option<Vec<String>>,
    /// Pause before retrying when no source is available.
    pub retry_delay_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            max_sample_edge: DEFAULT_MAX_SAMPLE_EDGE,
            start_threshold: DEFAULT_START_THRESHOLD,
            end_threshold: DEFAULT_END_THRESHOLD,
            model_width: MODEL_INPUT.width,
            model_height: MODEL_INPUT.height,
            detector_command: None,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

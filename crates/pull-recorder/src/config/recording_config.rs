use crate::config::{DEFAULT_CHUNK_INTERVAL_MS, DEFAULT_FLUSH_TIMEOUT_MS};

use std::path::PathBuf;

use pull_recorder_core::recording::{ContentHint, DEFAULT_BITS_PER_PIXEL};
use serde::{Deserialize, Serialize};

/// Recording output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Recordings directory. `None` uses `recordings/` in the data directory.
    pub output_dir: Option<PathBuf>,
    /// How often encoded data is collected.
    pub chunk_interval_ms: u64,
    /// Upper bound on encoder finalization.
    pub flush_timeout_ms: u64,
    /// Bits per pixel per frame for the bitrate policy.
    pub bits_per_pixel: f64,
    /// `motion` for gameplay, `detail` for mostly static content.
    pub content_hint: ContentHint,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
            bits_per_pixel: DEFAULT_BITS_PER_PIXEL,
            content_hint: ContentHint::default(),
        }
    }
}

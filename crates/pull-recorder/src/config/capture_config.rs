use crate::config::DEFAULT_CAPTURE_FPS;

use std::path::PathBuf;

use pull_recorder_core::capture::{DEFAULT_WINDOW_PATTERN, SourceTier};
use serde::{Deserialize, Serialize};

/// Capture source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Window title to look for in the window tier.
    pub window_pattern: String,
    /// Source tiers, tried in order.
    pub tiers: Vec<SourceTier>,
    /// ffmpeg binary. `None` looks it up on `PATH`.
    pub ffmpeg_path: Option<PathBuf>,
    /// Frame rate requested from the screen grabber.
    pub capture_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_pattern: DEFAULT_WINDOW_PATTERN.to_string(),
            tiers: SourceTier::DEFAULT_ORDER.to_vec(),
            ffmpeg_path: None,
            capture_fps: DEFAULT_CAPTURE_FPS,
        }
    }
}

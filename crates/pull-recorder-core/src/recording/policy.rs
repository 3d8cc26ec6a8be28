use crate::capture::Dimensions;

use serde::{Deserialize, Serialize};

/// Lower bitrate bound, bits per second.
pub const MIN_BITRATE: u64 = 20_000_000;

/// Upper bitrate bound, bits per second.
pub const MAX_BITRATE: u64 = 60_000_000;

/// Default bits per pixel per frame.
pub const DEFAULT_BITS_PER_PIXEL: f64 = 0.15;

/// Lowest recording frame rate.
pub const MIN_FRAME_RATE: u32 = 30;

/// Highest recording frame rate, also used when the source reports none.
pub const MAX_FRAME_RATE: u32 = 60;

/// Container/codec candidates, most preferred first.
pub const CODEC_CANDIDATES: [&str; 4] = [
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=h264,opus",
    "video/webm",
];

/// Hint to the encoder about the kind of content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentHint {
    /// Fast-moving content, favour smoothness.
    #[default]
    Motion,
    /// Mostly static content, favour sharpness.
    Detail,
}

/// Parameters for opening an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Requested MIME type. `None` lets the encoder pick its own default.
    pub mime_type: Option<String>,
    /// Target bitrate. `None` lets the encoder pick.
    pub bitrate: Option<u64>,
    /// Input frame rate.
    pub frame_rate: u32,
    /// Input frame size.
    pub dimensions: Dimensions,
    /// Content hint.
    pub content_hint: ContentHint,
}

impl EncoderSettings {
    /// Settings for a specific candidate.
    pub fn for_candidate(mime_type: &str, dimensions: Dimensions, frame_rate: u32, bitrate: u64) -> Self {
        Self {
            mime_type: Some(mime_type.to_string()),
            bitrate: Some(bitrate),
            frame_rate,
            dimensions,
            content_hint: ContentHint::Motion,
        }
    }

    /// Same settings with a different content hint.
    pub fn with_content_hint(mut self, content_hint: ContentHint) -> Self {
        self.content_hint = content_hint;
        self
    }

    /// Settings for the last-resort encoder with no options.
    pub fn fallback(dimensions: Dimensions, frame_rate: u32) -> Self {
        Self {
            mime_type: None,
            bitrate: None,
            frame_rate,
            dimensions,
            content_hint: ContentHint::Motion,
        }
    }
}

/// `width * height * fps * bits_per_pixel`, clamped to
/// [`MIN_BITRATE`]..=[`MAX_BITRATE`].
pub fn target_bitrate(dimensions: Dimensions, frame_rate: u32, bits_per_pixel: f64) -> u64 {
    let raw = f64::from(dimensions.width)
        * f64::from(dimensions.height)
        * f64::from(frame_rate)
        * bits_per_pixel;

    if !raw.is_finite() {
        return MIN_BITRATE;
    }

    (raw.round() as u64).clamp(MIN_BITRATE, MAX_BITRATE)
}

/// Source maximum clamped to [`MIN_FRAME_RATE`]..=[`MAX_FRAME_RATE`], or
/// [`MAX_FRAME_RATE`] when unknown.
pub fn select_frame_rate(source_max: Option<u32>) -> u32 {
    source_max
        .filter(|fps| *fps > 0)
        .map_or(MAX_FRAME_RATE, |fps| fps.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE))
}

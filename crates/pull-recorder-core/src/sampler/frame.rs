use crate::{
    CaptureError, CoreResult,
    capture::{Dimensions, RawFrame},
};

use std::panic::Location;

use error_location::ErrorLocation;
use image::{RgbaImage, imageops::FilterType};
use tokio::time::Instant;

/// Upper bound on the longer edge of a detection sample.
pub const DEFAULT_MAX_SAMPLE_EDGE: u32 = 512;

/// Smallest allowed side of a sample, avoids degenerate buffers.
pub const MIN_SAMPLE_SIDE: u32 = 2;

/// Assumed source size when a stream never reports dimensions.
pub const FALLBACK_DIMENSIONS: Dimensions = Dimensions::new(1280, 720);

/// A downscaled frame headed for the inference gate.
///
/// Not `Clone`. A sample belongs to the tick that produced it and is moved
/// into the gate or dropped.
#[derive(Debug)]
pub struct FrameSample {
    /// Tightly packed RGBA bytes, row-major.
    pub pixels: Vec<u8>,
    /// Sample width in pixels.
    pub width: u32,
    /// Sample height in pixels.
    pub height: u32,
    /// Monotonic time the underlying frame was grabbed.
    pub captured_at: Instant,
}

impl FrameSample {
    /// Sample dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Scale `source` so its longer edge fits in `max_edge`, keeping aspect ratio.
///
/// Never upscales. Each side is clamped to [`MIN_SAMPLE_SIDE`].
pub fn sample_dimensions(source: Dimensions, max_edge: u32) -> Dimensions {
    let longer = source.width.max(source.height).max(1);
    let scale = (f64::from(max_edge) / f64::from(longer)).min(1.0);

    let width = (f64::from(source.width) * scale).floor() as u32;
    let height = (f64::from(source.height) * scale).floor() as u32;

    Dimensions::new(width.max(MIN_SAMPLE_SIDE), height.max(MIN_SAMPLE_SIDE))
}

/// Resize an RGBA frame to `target`. Returns the buffer untouched when the
/// sizes already match.
#[track_caller]
pub(crate) fn resize_rgba(frame: RawFrame, target: Dimensions) -> CoreResult<Vec<u8>> {
    let (width, height, len) = (frame.width, frame.height, frame.rgba.len());

    if len != frame.dimensions().rgba_len() {
        return Err(CaptureError::InvalidFrame {
            reason: format!("{}x{} frame has {} bytes", width, height, len),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if frame.dimensions() == target {
        return Ok(frame.rgba);
    }

    let image = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
        CaptureError::InvalidFrame {
            reason: format!("{}x{} frame could not be decoded", width, height),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    Ok(image::imageops::resize(&image, target.width, target.height, FilterType::Triangle).into_raw())
}

use crate::{
    CaptureError, CoreResult,
    capture::{Dimensions, RawFrame},
    recording::{CODEC_CANDIDATES, ContentHint, EncoderSettings, target_bitrate},
};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;
use tracing::{debug, info, instrument, warn};

/// Opens encoders for a given configuration.
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    /// Whether `mime_type` can be produced at all.
    fn is_supported(&self, mime_type: &str) -> bool;

    /// Open an encoder. May fail even for a supported MIME type.
    async fn open(&self, settings: &EncoderSettings) -> CoreResult<Box<dyn Encoder>>;
}

/// A running encoder. Owned by one task at a time.
#[async_trait]
pub trait Encoder: Send {
    /// Feed one frame.
    async fn push_frame(&mut self, frame: &RawFrame) -> CoreResult<()>;

    /// Encoded bytes produced since the last call. Empty when none.
    async fn take_chunk(&mut self) -> CoreResult<Vec<u8>>;

    /// Flush and close. Returns whatever was still buffered.
    async fn finish(&mut self) -> CoreResult<Vec<u8>>;

    /// MIME type actually produced.
    fn mime_type(&self) -> &str;

    /// File extension for the produced container, without the dot.
    fn extension(&self) -> &str;
}

/// Walk [`CODEC_CANDIDATES`] and open the first encoder that initializes,
/// falling back to an encoder with no options.
#[instrument(skip(factory))]
pub async fn negotiate_encoder(
    factory: &dyn EncoderFactory,
    dimensions: Dimensions,
    frame_rate: u32,
    bits_per_pixel: f64,
    content_hint: ContentHint,
) -> CoreResult<Box<dyn Encoder>> {
    let location = ErrorLocation::from(Location::caller());
    let bitrate = target_bitrate(dimensions, frame_rate, bits_per_pixel);

    for candidate in CODEC_CANDIDATES {
        if !factory.is_supported(candidate) {
            debug!(mime = candidate, "Codec not supported, skipping");
            continue;
        }

        let settings = EncoderSettings::for_candidate(candidate, dimensions, frame_rate, bitrate)
            .with_content_hint(content_hint);
        match factory.open(&settings).await {
            Ok(encoder) => {
                info!(mime = encoder.mime_type(), bitrate, frame_rate, "Encoder opened");
                return Ok(encoder);
            }
            Err(e) => warn!(mime = candidate, error = %e, "Encoder init failed, trying next"),
        }
    }

    let fallback = EncoderSettings::fallback(dimensions, frame_rate).with_content_hint(content_hint);
    match factory.open(&fallback).await {
        Ok(encoder) => {
            warn!(mime = encoder.mime_type(), "Using encoder without options");
            Ok(encoder)
        }
        Err(e) => Err(CaptureError::EncoderInitFailed {
            reason: format!("no codec candidate could be opened, fallback failed: {}", e),
            location,
        }),
    }
}

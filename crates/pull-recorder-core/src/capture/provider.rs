use crate::{
    CoreResult,
    capture::{CaptureSourceDescriptor, Dimensions, RawFrame},
};

use async_trait::async_trait;

/// Track selection for the interactive source picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickerOptions {
    /// Request a video track.
    pub video: bool,
    /// Request an audio track alongside the video.
    pub audio: bool,
}

/// Platform bridge that enumerates and opens capturable sources.
#[async_trait]
pub trait CaptureSourceProvider: Send + Sync {
    /// Find a window whose title matches `name_pattern`.
    async fn select_window(&self, name_pattern: &str) -> CoreResult<CaptureSourceDescriptor>;

    /// Select a generic desktop/screen source.
    async fn select_screen(&self) -> CoreResult<CaptureSourceDescriptor>;

    /// Ask the user to pick a source. Fails on cancel or permission denial.
    async fn open_picker(&self, options: PickerOptions) -> CoreResult<Box<dyn LiveStream>>;

    /// Open a live stream for a previously selected descriptor.
    async fn open(&self, descriptor: &CaptureSourceDescriptor) -> CoreResult<Box<dyn LiveStream>>;
}

/// A running capture stream.
///
/// Owned by exactly one task at a time; `stop` must be idempotent.
#[async_trait]
pub trait LiveStream: Send {
    /// The descriptor this stream was opened from.
    fn descriptor(&self) -> &CaptureSourceDescriptor;

    /// Resolves once the stream reports valid dimensions. May never resolve
    /// for sources that do not signal readiness; callers bound it.
    async fn ready(&mut self) -> CoreResult<Dimensions>;

    /// Dimensions if already known.
    fn dimensions(&self) -> Option<Dimensions>;

    /// Highest frame rate the source can sustain, if it reports one.
    fn max_frame_rate(&self) -> Option<u32>;

    /// Most recent frame. Fails with `SourceLost` once the stream has ended.
    async fn grab_frame(&mut self) -> CoreResult<RawFrame>;

    /// Stop all tracks and release platform resources.
    async fn stop(&mut self);

    /// False once the stream has ended or been stopped.
    fn is_live(&self) -> bool;
}

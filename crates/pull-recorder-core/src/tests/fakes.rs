//! Test doubles for the collaborator traits.

use crate::{
    CaptureError, CoreResult,
    capture::{
        CaptureSourceDescriptor, CaptureSourceProvider, Dimensions, LiveStream, PickerOptions,
        RawFrame, SourceKind,
    },
    inference::{InferenceEngine, InputTensor, RawScores},
    persistence::{CatalogEntry, PersistenceService, SavedRecording},
    recording::{Encoder, EncoderFactory, EncoderSettings},
};

use std::{
    panic::Location,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;

#[track_caller]
pub(crate) fn unavailable(reason: &str) -> CaptureError {
    CaptureError::SourceUnavailable {
        reason: reason.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Solid-colour RGBA frame.
pub(crate) fn solid_frame(dims: Dimensions, rgba: [u8; 4]) -> RawFrame {
    RawFrame {
        rgba: rgba.repeat(dims.width as usize * dims.height as usize),
        width: dims.width,
        height: dims.height,
    }
}

pub(crate) struct FakeStream {
    pub descriptor: CaptureSourceDescriptor,
    pub dims: Option<Dimensions>,
    pub max_fps: Option<u32>,
    pub live: Arc<AtomicBool>,
    pub stops: Arc<AtomicUsize>,
    pub grabs: Arc<AtomicUsize>,
}

impl FakeStream {
    pub(crate) fn new(kind: SourceKind, dims: Option<Dimensions>) -> Self {
        Self {
            descriptor: CaptureSourceDescriptor::new("fake", kind, format!("fake {}", kind)),
            dims,
            max_fps: None,
            live: Arc::new(AtomicBool::new(true)),
            stops: Arc::new(AtomicUsize::new(0)),
            grabs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LiveStream for FakeStream {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    async fn ready(&mut self) -> CoreResult<Dimensions> {
        match self.dims {
            Some(dims) => Ok(dims),
            None => std::future::pending().await,
        }
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.dims
    }

    fn max_frame_rate(&self) -> Option<u32> {
        self.max_fps
    }

    async fn grab_frame(&mut self) -> CoreResult<RawFrame> {
        if !self.is_live() {
            return Err(CaptureError::SourceLost {
                reason: "fake stream ended".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let dims = self.dims.unwrap_or(Dimensions::new(64, 36));
        Ok(solid_frame(dims, [200, 40, 40, 255]))
    }

    async fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Provider whose tiers succeed or fail on demand.
///
/// Every stream it opens shares `live`, so a test can end them all at once.
pub(crate) struct FakeProvider {
    pub window_ok: bool,
    pub screen_ok: bool,
    pub picker_ok: bool,
    pub dims: Option<Dimensions>,
    pub calls: Mutex<Vec<String>>,
    pub live: Arc<AtomicBool>,
    pub stops: Arc<AtomicUsize>,
    pub opened: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new(window_ok: bool, screen_ok: bool, picker_ok: bool) -> Self {
        Self {
            window_ok,
            screen_ok,
            picker_ok,
            dims: Some(Dimensions::new(64, 36)),
            calls: Mutex::new(Vec::new()),
            live: Arc::new(AtomicBool::new(true)),
            stops: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn stream(&self, descriptor: CaptureSourceDescriptor) -> Box<dyn LiveStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeStream {
            descriptor,
            dims: self.dims,
            max_fps: Some(60),
            live: Arc::clone(&self.live),
            stops: Arc::clone(&self.stops),
            grabs: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl CaptureSourceProvider for FakeProvider {
    async fn select_window(&self, name_pattern: &str) -> CoreResult<CaptureSourceDescriptor> {
        self.record(format!("window:{}", name_pattern));
        if self.window_ok {
            Ok(CaptureSourceDescriptor::new("w1", SourceKind::Window, name_pattern))
        } else {
            Err(unavailable("no matching window"))
        }
    }

    async fn select_screen(&self) -> CoreResult<CaptureSourceDescriptor> {
        self.record("screen".to_string());
        if self.screen_ok {
            Ok(CaptureSourceDescriptor::new("s1", SourceKind::Screen, "Screen 1"))
        } else {
            Err(unavailable("no screen"))
        }
    }

    async fn open_picker(&self, options: PickerOptions) -> CoreResult<Box<dyn LiveStream>> {
        self.record(format!("picker:audio={}", options.audio));
        if self.picker_ok {
            Ok(self.stream(CaptureSourceDescriptor::new(
                "p1",
                SourceKind::UserPicked,
                "Picked",
            )))
        } else {
            Err(unavailable("picker cancelled"))
        }
    }

    async fn open(&self, descriptor: &CaptureSourceDescriptor) -> CoreResult<Box<dyn LiveStream>> {
        self.record(format!("open:{}", descriptor.id));
        Ok(self.stream(descriptor.clone()))
    }
}

/// Engine returning whatever scores are currently set.
pub(crate) struct FakeEngine {
    pub scores: Mutex<Vec<f32>>,
    pub delay: Duration,
    pub fail: AtomicBool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub last_shape: Mutex<Option<[usize; 4]>>,
}

impl FakeEngine {
    pub(crate) fn new(scores: Vec<f32>, delay: Duration) -> Self {
        Self {
            scores: Mutex::new(scores),
            delay,
            fail: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            last_shape: Mutex::new(None),
        }
    }

    pub(crate) fn set_scores(&self, scores: Vec<f32>) {
        if let Ok(mut s) = self.scores.lock() {
            *s = scores;
        }
    }
}

#[async_trait]
impl InferenceEngine for FakeEngine {
    async fn infer(&self, input: &InputTensor) -> CoreResult<RawScores> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut shape) = self.last_shape.lock() {
            *shape = Some(input.shape);
        }

        // Scores are fixed when the call starts, like a real frame's content.
        let scores = self.scores.lock().map(|s| s.clone()).unwrap_or_default();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::InferenceFailed {
                reason: "fake engine failure".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(RawScores(scores))
    }
}

/// Encoder factory with configurable support and init failures.
pub(crate) struct FakeEncoderFactory {
    pub supported: Vec<&'static str>,
    pub failing: Vec<&'static str>,
    pub fallback_ok: bool,
    pub bytes_per_frame: usize,
    /// Bytes `finish` flushes before returning.
    pub finish_tail: usize,
    /// `finish` flushes its tail and then never returns.
    pub finish_hangs: bool,
    pub opened: Mutex<Vec<EncoderSettings>>,
}

impl FakeEncoderFactory {
    pub(crate) fn new(supported: Vec<&'static str>) -> Self {
        Self {
            supported,
            failing: Vec::new(),
            fallback_ok: true,
            bytes_per_frame: 16,
            finish_tail: 0,
            finish_hangs: false,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn opened(&self) -> Vec<EncoderSettings> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EncoderFactory for FakeEncoderFactory {
    fn is_supported(&self, mime_type: &str) -> bool {
        self.supported.contains(&mime_type)
    }

    async fn open(&self, settings: &EncoderSettings) -> CoreResult<Box<dyn Encoder>> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(settings.clone());
        }

        let mime = settings.mime_type.clone();
        let fails = match &mime {
            Some(m) => self.failing.iter().any(|f| f == m),
            None => !self.fallback_ok,
        };
        if fails {
            return Err(CaptureError::EncoderFailed {
                reason: "fake init failure".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Box::new(FakeEncoder {
            mime: mime.unwrap_or_else(|| "video/webm".to_string()),
            bytes_per_frame: self.bytes_per_frame,
            finish_tail: self.finish_tail,
            finish_hangs: self.finish_hangs,
            pending: Vec::new(),
            finished: false,
        }))
    }
}

pub(crate) struct FakeEncoder {
    mime: String,
    bytes_per_frame: usize,
    finish_tail: usize,
    finish_hangs: bool,
    pending: Vec<u8>,
    finished: bool,
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn push_frame(&mut self, _frame: &RawFrame) -> CoreResult<()> {
        self.pending.extend(std::iter::repeat_n(0xAB, self.bytes_per_frame));
        Ok(())
    }

    async fn take_chunk(&mut self) -> CoreResult<Vec<u8>> {
        Ok(std::mem::take(&mut self.pending))
    }

    async fn finish(&mut self) -> CoreResult<Vec<u8>> {
        self.finished = true;
        self.pending.extend(std::iter::repeat_n(0xCD, self.finish_tail));
        if self.finish_hangs {
            std::future::pending::<()>().await;
        }
        Ok(std::mem::take(&mut self.pending))
    }

    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn extension(&self) -> &str {
        "webm"
    }
}

/// In-memory persistence; optionally fails every save.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub fail: bool,
    pub saved: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl PersistenceService for MemoryStore {
    async fn save(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        extension: &str,
    ) -> CoreResult<SavedRecording> {
        if self.fail {
            return Err(CaptureError::PersistenceFailed {
                reason: "disk full".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        let filename = format!("{}.{}", suggested_name, extension);
        if let Ok(mut saved) = self.saved.lock() {
            saved.push((suggested_name.to_string(), extension.to_string(), bytes.len()));
        }
        Ok(SavedRecording {
            path: PathBuf::from("/recordings").join(&filename),
            filename,
        })
    }

    async fn list(&self) -> CoreResult<Vec<CatalogEntry>> {
        Ok(Vec::new())
    }

    async fn read_as_portable_uri(&self, path: &Path) -> CoreResult<String> {
        Ok(format!("data:video/webm;base64,{}", path.display()))
    }
}

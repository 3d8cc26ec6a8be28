//! Screen and window capture through an ffmpeg grabber subprocess.
//!
//! ffmpeg writes PAM images to stdout; a reader task keeps the newest one in
//! a watch channel so grabs never queue behind the capture rate.

use crate::desktop::{Ffmpeg, read_pam_frame};

use pull_recorder_core::{
    CaptureError, CoreResult,
    capture::{
        CaptureSourceDescriptor, CaptureSourceProvider, Dimensions, LiveStream, PickerOptions,
        RawFrame, SourceKind,
    },
};

use std::{
    panic::Location,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use tokio::{
    io::{AsyncRead, BufReader},
    process::Child,
    sync::watch,
};
use tracing::{debug, info, instrument, warn};

/// Upper bound on the one-frame probe run before a window is reported found.
const WINDOW_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// ffmpeg input device used for the current platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    /// Windows GDI grabber. Supports window titles.
    GdiGrab,
    /// macOS AVFoundation screens.
    AvFoundation,
    /// X11 displays.
    X11Grab,
}

impl CaptureBackend {
    /// Backend for the platform this binary was built for.
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            CaptureBackend::GdiGrab
        } else if cfg!(target_os = "macos") {
            CaptureBackend::AvFoundation
        } else {
            CaptureBackend::X11Grab
        }
    }

    /// ffmpeg input format name.
    pub fn format(&self) -> &'static str {
        match self {
            CaptureBackend::GdiGrab => "gdigrab",
            CaptureBackend::AvFoundation => "avfoundation",
            CaptureBackend::X11Grab => "x11grab",
        }
    }

    /// Input identifier for a window title, when the backend can target windows.
    pub fn window_input(&self, title: &str) -> Option<String> {
        match self {
            CaptureBackend::GdiGrab => Some(format!("title={}", title)),
            CaptureBackend::AvFoundation | CaptureBackend::X11Grab => None,
        }
    }

    /// Input identifier for the main screen. X11 needs `display` (`$DISPLAY`).
    pub fn screen_input(&self, display: Option<&str>) -> Option<String> {
        match self {
            CaptureBackend::GdiGrab => Some("desktop".to_string()),
            CaptureBackend::AvFoundation => Some("Capture screen 0:none".to_string()),
            CaptureBackend::X11Grab => display
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string),
        }
    }

    /// Input arguments for one descriptor.
    pub fn input_args(&self, descriptor: &CaptureSourceDescriptor, frame_rate: u32) -> Vec<String> {
        let cursor_flag = match self {
            CaptureBackend::AvFoundation => "-capture_cursor",
            CaptureBackend::GdiGrab | CaptureBackend::X11Grab => "-draw_mouse",
        };

        vec![
            "-f".to_string(),
            self.format().to_string(),
            "-framerate".to_string(),
            frame_rate.to_string(),
            cursor_flag.to_string(),
            "1".to_string(),
            "-i".to_string(),
            descriptor.id.clone(),
        ]
    }
}

/// Output arguments that turn any input into an RGBA PAM stream on stdout.
pub const PAM_OUTPUT_ARGS: [&str; 7] = [
    "-f",
    "image2pipe",
    "-c:v",
    "pam",
    "-pix_fmt",
    "rgba",
    "pipe:1",
];

/// Capture provider backed by ffmpeg's platform grabbers.
#[derive(Debug, Clone)]
pub struct FfmpegCaptureProvider {
    ffmpeg: Ffmpeg,
    backend: CaptureBackend,
    frame_rate: u32,
}

impl FfmpegCaptureProvider {
    /// Provider for the native backend, grabbing at `frame_rate`.
    pub fn new(ffmpeg: Ffmpeg, frame_rate: u32) -> Self {
        Self {
            ffmpeg,
            backend: CaptureBackend::native(),
            frame_rate,
        }
    }

    /// Run the grabber for a single frame to see whether the input exists.
    async fn probe(&self, descriptor: &CaptureSourceDescriptor) -> bool {
        let mut cmd = self.ffmpeg.command();
        cmd.args(self.backend.input_args(descriptor, self.frame_rate))
            .args(["-frames:v", "1", "-f", "null", "-"]);

        match tokio::time::timeout(WINDOW_PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(error = %e, "Failed to run capture probe");
                false
            }
            Err(_) => {
                debug!("Capture probe timed out");
                false
            }
        }
    }
}

#[async_trait]
impl CaptureSourceProvider for FfmpegCaptureProvider {
    #[instrument(skip(self))]
    async fn select_window(&self, name_pattern: &str) -> CoreResult<CaptureSourceDescriptor> {
        let location = ErrorLocation::from(Location::caller());

        let Some(input) = self.backend.window_input(name_pattern) else {
            return Err(CaptureError::SourceUnavailable {
                reason: format!("{} cannot capture individual windows", self.backend.format()),
                location,
            });
        };

        let descriptor = CaptureSourceDescriptor::new(input, SourceKind::Window, name_pattern);
        if !self.probe(&descriptor).await {
            return Err(CaptureError::SourceUnavailable {
                reason: format!("no window titled {:?}", name_pattern),
                location,
            });
        }

        Ok(descriptor)
    }

    #[instrument(skip(self))]
    async fn select_screen(&self) -> CoreResult<CaptureSourceDescriptor> {
        let display = std::env::var("DISPLAY").ok();

        self.backend
            .screen_input(display.as_deref())
            .map(|input| CaptureSourceDescriptor::new(input, SourceKind::Screen, "Screen"))
            .ok_or_else(|| CaptureError::SourceUnavailable {
                reason: format!("no screen available for {}", self.backend.format()),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    async fn open_picker(&self, options: PickerOptions) -> CoreResult<Box<dyn LiveStream>> {
        debug!(audio = options.audio, "Interactive picker requested");
        Err(CaptureError::SourceUnavailable {
            reason: "no interactive source picker on the desktop".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    #[instrument(skip(self), fields(source = %descriptor.display_name))]
    async fn open(&self, descriptor: &CaptureSourceDescriptor) -> CoreResult<Box<dyn LiveStream>> {
        let mut cmd = self.ffmpeg.command();
        cmd.args(self.backend.input_args(descriptor, self.frame_rate))
            .args(PAM_OUTPUT_ARGS)
            .stdout(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| CaptureError::SourceUnavailable {
            reason: format!("failed to start {}: {}", self.ffmpeg.program().display(), e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| CaptureError::SourceUnavailable {
            reason: "grabber stdout not captured".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let (frames_tx, frames_rx) = watch::channel(None);
        let live = Arc::new(AtomicBool::new(true));
        tokio::spawn(read_frames(stdout, frames_tx, Arc::clone(&live)));

        info!(backend = self.backend.format(), input = %descriptor.id, "Capture stream opened");

        Ok(Box::new(FfmpegStream {
            descriptor: descriptor.clone(),
            child,
            frames: frames_rx,
            live,
            frame_rate: self.frame_rate,
            stopped: false,
        }))
    }
}

/// Publish every decoded frame, newest wins. Marks the stream dead at EOF.
async fn read_frames<R>(
    reader: R,
    frames: watch::Sender<Option<Arc<RawFrame>>>,
    live: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut count: u64 = 0;

    loop {
        match read_pam_frame(&mut reader).await {
            Ok(Some(frame)) => {
                count += 1;
                frames.send_replace(Some(Arc::new(frame)));
            }
            Ok(None) => {
                debug!(frames = count, "Capture stream ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, frames = count, "Capture stream corrupted");
                break;
            }
        }
    }

    live.store(false, Ordering::SeqCst);
}

/// A running ffmpeg grabber.
pub struct FfmpegStream {
    descriptor: CaptureSourceDescriptor,
    child: Child,
    frames: watch::Receiver<Option<Arc<RawFrame>>>,
    live: Arc<AtomicBool>,
    frame_rate: u32,
    stopped: bool,
}

impl FfmpegStream {
    fn lost(&self, reason: &str) -> CaptureError {
        CaptureError::SourceLost {
            reason: format!("{}: {}", self.descriptor.display_name, reason),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

#[async_trait]
impl LiveStream for FfmpegStream {
    fn descriptor(&self) -> &CaptureSourceDescriptor {
        &self.descriptor
    }

    async fn ready(&mut self) -> CoreResult<Dimensions> {
        loop {
            if let Some(dims) = self.dimensions() {
                return Ok(dims);
            }
            if self.frames.changed().await.is_err() {
                return Err(self.lost("ended before the first frame"));
            }
        }
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.frames.borrow().as_ref().map(|frame| frame.dimensions())
    }

    fn max_frame_rate(&self) -> Option<u32> {
        Some(self.frame_rate)
    }

    async fn grab_frame(&mut self) -> CoreResult<RawFrame> {
        if !self.is_live() {
            return Err(self.lost("stream ended"));
        }

        self.ready().await?;

        let latest = self.frames.borrow_and_update().clone();
        latest
            .map(|frame| frame.as_ref().clone())
            .ok_or_else(|| self.lost("no frame available"))
    }

    async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.live.store(false, Ordering::SeqCst);

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Grabber already exited");
        }
        match self.child.wait().await {
            Ok(status) => debug!(status = %status, "Grabber stopped"),
            Err(e) => warn!(error = %e, "Failed to reap grabber"),
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped && self.live.load(Ordering::SeqCst)
    }
}

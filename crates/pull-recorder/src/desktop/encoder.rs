//! Video encoding through an ffmpeg subprocess: raw RGBA frames in on
//! stdin, container bytes out on stdout.

use crate::desktop::Ffmpeg;

use pull_recorder_core::{
    CaptureError, CoreResult,
    capture::{Dimensions, RawFrame},
    recording::{ContentHint, Encoder, EncoderFactory, EncoderSettings},
};

use std::{collections::HashSet, panic::Location, process::Stdio, time::Duration};

use async_trait::async_trait;
use error_location::ErrorLocation;
use image::{RgbaImage, imageops::FilterType};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, ChildStdout},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

/// How long a fresh encoder must stay alive to count as initialized.
const STARTUP_PROBE: Duration = Duration::from_millis(200);

/// Read size for encoder output.
const READ_CHUNK: usize = 64 * 1024;

/// Video codecs the ffmpeg encoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// VP9 in WebM.
    Vp9,
    /// VP8 in WebM.
    Vp8,
    /// H.264 in Matroska. WebM cannot carry it.
    H264,
}

impl VideoCodec {
    /// Preference order when the caller does not name a codec.
    pub const PREFERENCE: [VideoCodec; 3] = [VideoCodec::Vp9, VideoCodec::Vp8, VideoCodec::H264];

    /// Codec named by a MIME type's `codecs` parameter.
    pub fn from_codecs_param(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vp9" | "vp09" => Some(VideoCodec::Vp9),
            "vp8" => Some(VideoCodec::Vp8),
            "h264" | "avc1" => Some(VideoCodec::H264),
            _ => None,
        }
    }

    /// ffmpeg encoder name.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Vp8 => "libvpx",
            VideoCodec::H264 => "libx264",
        }
    }

    /// ffmpeg muxer name.
    pub fn muxer(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 | VideoCodec::Vp8 => "webm",
            VideoCodec::H264 => "matroska",
        }
    }

    /// File extension of the produced container.
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 | VideoCodec::Vp8 => "webm",
            VideoCodec::H264 => "mkv",
        }
    }

    /// MIME type of the produced stream.
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "video/webm;codecs=vp9",
            VideoCodec::Vp8 => "video/webm;codecs=vp8",
            VideoCodec::H264 => "video/x-matroska;codecs=h264",
        }
    }

    fn tuning(&self, hint: ContentHint) -> &'static [&'static str] {
        match (self, hint) {
            (VideoCodec::Vp9, ContentHint::Motion) => {
                &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"]
            }
            (VideoCodec::Vp8, ContentHint::Motion) => &["-deadline", "realtime", "-cpu-used", "8"],
            (VideoCodec::Vp9 | VideoCodec::Vp8, ContentHint::Detail) => {
                &["-deadline", "good", "-cpu-used", "4"]
            }
            (VideoCodec::H264, ContentHint::Motion) => &["-preset", "veryfast", "-tune", "zerolatency"],
            (VideoCodec::H264, ContentHint::Detail) => &["-preset", "medium", "-tune", "stillimage"],
        }
    }
}

/// Full argument list for an encoder process.
pub fn encoder_args(codec: VideoCodec, settings: &EncoderSettings) -> Vec<String> {
    let dims = settings.dimensions;
    let mut args: Vec<String> = [
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &dims.to_string(),
        "-framerate",
        &settings.frame_rate.to_string(),
        "-i",
        "pipe:0",
        "-c:v",
        codec.encoder_name(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(bitrate) = settings.bitrate {
        args.extend(["-b:v".to_string(), bitrate.to_string()]);
    }
    args.extend(codec.tuning(settings.content_hint).iter().map(|s| s.to_string()));
    args.extend(
        [
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            "-pix_fmt",
            "yuv420p",
            "-an",
            "-f",
            codec.muxer(),
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args
}

/// Opens ffmpeg encoders for the codecs the local ffmpeg build provides.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: Ffmpeg,
    available: HashSet<String>,
}

impl FfmpegEncoderFactory {
    /// Factory for an explicit set of ffmpeg encoder names.
    pub fn new(ffmpeg: Ffmpeg, available: HashSet<String>) -> Self {
        Self { ffmpeg, available }
    }

    /// Ask ffmpeg which encoders it has. A failed probe leaves only the
    /// no-options fallback.
    pub async fn probe(ffmpeg: Ffmpeg) -> Self {
        let available = match ffmpeg.video_encoders().await {
            Ok(encoders) => encoders,
            Err(e) => {
                warn!(error = %e, "Could not list ffmpeg encoders");
                HashSet::new()
            }
        };
        Self::new(ffmpeg, available)
    }

    fn has(&self, codec: VideoCodec) -> bool {
        self.available.contains(codec.encoder_name())
    }

    /// Codec for a requested MIME type, or for no request at all.
    pub fn resolve(&self, mime_type: Option<&str>) -> Option<VideoCodec> {
        let Some(mime_type) = mime_type else {
            return VideoCodec::PREFERENCE
                .into_iter()
                .find(|codec| self.has(*codec))
                .or(Some(VideoCodec::Vp8));
        };

        let mut parts = mime_type.split(';');
        if parts.next().map(str::trim) != Some("video/webm") {
            return None;
        }

        let named = parts
            .filter_map(|param| param.trim().strip_prefix("codecs="))
            .flat_map(|codecs| codecs.trim_matches('"').split(','))
            .find_map(VideoCodec::from_codecs_param);

        match named {
            Some(codec) => self.has(codec).then_some(codec),
            None => [VideoCodec::Vp9, VideoCodec::Vp8]
                .into_iter()
                .find(|codec| self.has(*codec)),
        }
    }
}

#[async_trait]
impl EncoderFactory for FfmpegEncoderFactory {
    fn is_supported(&self, mime_type: &str) -> bool {
        self.resolve(Some(mime_type)).is_some()
    }

    #[instrument(skip(self), fields(mime = ?settings.mime_type))]
    async fn open(&self, settings: &EncoderSettings) -> CoreResult<Box<dyn Encoder>> {
        let codec = self.resolve(settings.mime_type.as_deref()).ok_or_else(|| {
            CaptureError::EncoderInitFailed {
                reason: format!("unsupported MIME type {:?}", settings.mime_type),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        let mut cmd = self.ffmpeg.command();
        cmd.args(encoder_args(codec, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| CaptureError::EncoderInitFailed {
            reason: format!("failed to start {}: {}", self.ffmpeg.program().display(), e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if let Ok(status) = tokio::time::timeout(STARTUP_PROBE, child.wait()).await {
            return Err(CaptureError::EncoderInitFailed {
                reason: format!("{} exited during startup: {:?}", codec.encoder_name(), status),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(CaptureError::EncoderInitFailed {
                    reason: "encoder pipes not captured".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_output(stdout, chunks_tx));

        info!(
            encoder = codec.encoder_name(),
            dims = %settings.dimensions,
            bitrate = ?settings.bitrate,
            "ffmpeg encoder started"
        );

        Ok(Box::new(FfmpegEncoder {
            codec,
            dimensions: settings.dimensions,
            child,
            stdin: Some(stdin),
            chunks: chunks_rx,
            reader: Some(reader),
        }))
    }
}

async fn read_output(mut stdout: ChildStdout, chunks: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if chunks.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read encoder output");
                break;
            }
        }
    }
}

/// A running ffmpeg encoder.
pub struct FfmpegEncoder {
    codec: VideoCodec,
    dimensions: Dimensions,
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegEncoder {
    fn drain_ready(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// Scale a frame to the encoder's fixed input size.
#[track_caller]
fn fit_frame(frame: RawFrame, target: Dimensions) -> CoreResult<Vec<u8>> {
    let (len, dims) = (frame.rgba.len(), frame.dimensions());
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba).ok_or_else(|| {
        CaptureError::InvalidFrame {
            reason: format!("{} bytes for {}", len, dims),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    Ok(image::imageops::resize(&image, target.width, target.height, FilterType::Triangle).into_raw())
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn push_frame(&mut self, frame: &RawFrame) -> CoreResult<()> {
        let resized;
        let pixels = if frame.dimensions() == self.dimensions {
            &frame.rgba
        } else {
            let (owned, target) = (frame.clone(), self.dimensions);
            resized = tokio::task::spawn_blocking(move || fit_frame(owned, target))
                .await
                .map_err(|e| CaptureError::WorkerFailed {
                    reason: format!("frame resize task failed: {}", e),
                    location: ErrorLocation::from(Location::caller()),
                })??;
            &resized
        };

        let stdin = self.stdin.as_mut().ok_or_else(|| CaptureError::EncoderFailed {
            reason: "encoder already finished".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        stdin
            .write_all(pixels)
            .await
            .map_err(|e| CaptureError::EncoderFailed {
                reason: format!("{} stopped accepting frames: {}", self.codec.encoder_name(), e),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    async fn take_chunk(&mut self) -> CoreResult<Vec<u8>> {
        Ok(self.drain_ready())
    }

    async fn finish(&mut self) -> CoreResult<Vec<u8>> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "Encoder stdin already closed");
            }
        }

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!(error = %e, "Encoder output reader failed");
            }
        }

        let status = self.child.wait().await?;
        if !status.success() {
            warn!(status = %status, encoder = self.codec.encoder_name(), "Encoder exited abnormally");
        }

        Ok(self.drain_ready())
    }

    fn mime_type(&self) -> &str {
        self.codec.mime_type()
    }

    fn extension(&self) -> &str {
        self.codec.extension()
    }
}

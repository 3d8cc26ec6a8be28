use crate::{
    CoreResult,
    capture::{CaptureSourceProvider, Dimensions, LiveStream, ResolvedSource},
    persistence::{PersistenceService, data_uri},
    recording::{
        ContentHint, DEFAULT_BITS_PER_PIXEL, Encoder, EncoderFactory, RecordingSession, SessionId,
        SessionStatus, TriggerOrigin, negotiate_encoder, select_frame_rate,
    },
    sampler::{READY_TIMEOUT, wait_for_dimensions},
};

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, warn};

/// Default cadence for draining encoded data.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on encoder finalization.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Finalizer tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalizerConfig {
    /// How often encoded data is moved into the chunk buffer.
    pub chunk_interval: Duration,
    /// Upper bound on `Encoder::finish`.
    pub flush_timeout: Duration,
    /// Upper bound on waiting for source dimensions.
    pub ready_timeout: Duration,
    /// Bits per pixel per frame for the bitrate policy.
    pub bits_per_pixel: f64,
    /// Kind of content being recorded, passed to the encoder.
    pub content_hint: ContentHint,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            ready_timeout: READY_TIMEOUT,
            bits_per_pixel: DEFAULT_BITS_PER_PIXEL,
            content_hint: ContentHint::default(),
        }
    }
}

/// Sent when a recording's stream ends on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLost {
    /// Session whose stream ended.
    pub session_id: SessionId,
    /// How it ended.
    pub reason: String,
}

/// How a finished recording can be played back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackSource {
    /// Stored by the persistence service.
    Persisted {
        /// File path.
        path: std::path::PathBuf,
        /// File name in the recordings directory.
        filename: String,
    },
    /// Kept in memory only, as a `data:` URI.
    Ephemeral {
        /// The URI.
        uri: String,
    },
}

/// Outcome of [`SessionFinalizer::stop`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedRecording {
    /// Session in its final status.
    pub session: RecordingSession,
    /// Playback source, absent for failed sessions.
    pub playback: Option<PlaybackSource>,
    /// Set when the recording survived in degraded form.
    pub warning: Option<String>,
}

/// A running recording.
pub struct SessionHandle {
    session: RecordingSession,
    bytes: Arc<AtomicU64>,
    cancel: oneshot::Sender<()>,
    pump: JoinHandle<PumpParts>,
    frame_rate: u32,
    dimensions: Dimensions,
}

impl SessionHandle {
    /// Session id.
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    /// What started the session.
    pub fn origin(&self) -> TriggerOrigin {
        self.session.origin
    }

    /// Recording frame rate.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Recording frame size.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Current view of the session, including bytes collected so far.
    pub fn session(&self) -> RecordingSession {
        let mut session = self.session.clone();
        session.accumulated_bytes = self.bytes.load(Ordering::Relaxed);
        session
    }
}

struct PumpParts {
    stream: Box<dyn LiveStream>,
    encoder: Box<dyn Encoder>,
    chunks: Vec<Vec<u8>>,
    bytes: Arc<AtomicU64>,
}

impl PumpParts {
    async fn drain(&mut self) {
        match self.encoder.take_chunk().await {
            Ok(chunk) if !chunk.is_empty() => self.push_chunk(chunk),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to drain encoder"),
        }
    }

    fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        self.chunks.push(chunk);
    }
}

/// Wires a live stream to an encoder for the length of a session and turns
/// the result into a stored recording.
pub struct SessionFinalizer {
    provider: Arc<dyn CaptureSourceProvider>,
    encoders: Arc<dyn EncoderFactory>,
    persistence: Arc<dyn PersistenceService>,
    source_lost: mpsc::UnboundedSender<SourceLost>,
    config: FinalizerConfig,
}

impl SessionFinalizer {
    /// Build a finalizer. Stream ends are reported on `source_lost`.
    pub fn new(
        provider: Arc<dyn CaptureSourceProvider>,
        encoders: Arc<dyn EncoderFactory>,
        persistence: Arc<dyn PersistenceService>,
        source_lost: mpsc::UnboundedSender<SourceLost>,
        config: FinalizerConfig,
    ) -> Self {
        Self {
            provider,
            encoders,
            persistence,
            source_lost,
            config,
        }
    }

    /// Active tuning.
    pub fn config(&self) -> &FinalizerConfig {
        &self.config
    }

    /// Open the source, negotiate an encoder and start pumping frames.
    #[instrument(skip(self, source), fields(source = %source.descriptor().display_name))]
    pub async fn start(
        &self,
        source: ResolvedSource,
        origin: TriggerOrigin,
    ) -> CoreResult<SessionHandle> {
        let descriptor = source.descriptor().clone();
        let mut stream = source.acquire(self.provider.as_ref()).await?;

        let dimensions = wait_for_dimensions(stream.as_mut(), self.config.ready_timeout).await;
        let frame_rate = select_frame_rate(stream.max_frame_rate());

        let encoder = match negotiate_encoder(
            self.encoders.as_ref(),
            dimensions,
            frame_rate,
            self.config.bits_per_pixel,
            self.config.content_hint,
        )
        .await
        {
            Ok(encoder) => encoder,
            Err(e) => {
                stream.stop().await;
                return Err(e);
            }
        };

        let session = RecordingSession::begin(descriptor, origin);
        let bytes = Arc::new(AtomicU64::new(0));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let parts = PumpParts {
            stream,
            encoder,
            chunks: Vec::new(),
            bytes: Arc::clone(&bytes),
        };
        let pump = tokio::spawn(run_pump(
            parts,
            session.id,
            frame_rate,
            self.config.chunk_interval,
            cancel_rx,
            self.source_lost.clone(),
        ));

        info!(
            session_id = %session.id,
            origin = %origin,
            dims = %dimensions,
            frame_rate,
            "Recording started"
        );

        Ok(SessionHandle {
            session,
            bytes,
            cancel: cancel_tx,
            pump,
            frame_rate,
            dimensions,
        })
    }

    /// Stop pumping, flush the encoder, release the stream and store the
    /// recording.
    #[instrument(skip(self, handle), fields(session_id = %handle.session.id))]
    pub async fn stop(&self, handle: SessionHandle) -> FinalizedRecording {
        let SessionHandle {
            mut session,
            cancel,
            pump,
            ..
        } = handle;

        // Receiver is gone if the pump already ended on its own.
        let _ = cancel.send(());

        let mut parts = match pump.await {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "Frame pump task failed");
                session.status = SessionStatus::Failed;
                session.ended_at = Some(Local::now());
                return FinalizedRecording {
                    session,
                    playback: None,
                    warning: Some(format!("recording task failed: {}", e)),
                };
            }
        };

        parts.drain().await;
        match tokio::time::timeout(self.config.flush_timeout, parts.encoder.finish()).await {
            Ok(Ok(tail)) if !tail.is_empty() => parts.push_chunk(tail),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Encoder finalize failed");
                parts.drain().await;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.flush_timeout.as_millis(),
                    "Encoder finalize timed out, keeping what was flushed"
                );
                parts.drain().await;
            }
        }
        parts.stream.stop().await;

        let mime_type = parts.encoder.mime_type().to_string();
        let extension = parts.encoder.extension().to_string();
        let data = parts.chunks.concat();

        session.ended_at = Some(Local::now());
        session.accumulated_bytes = data.len() as u64;

        if data.is_empty() {
            warn!("No data captured, session failed");
            session.status = SessionStatus::Failed;
            return FinalizedRecording {
                session,
                playback: None,
                warning: Some("no video data was captured".to_string()),
            };
        }

        session.status = SessionStatus::Completed;

        match self.persistence.save(&data, &session.name, &extension).await {
            Ok(saved) => {
                info!(path = %saved.path.display(), bytes = data.len(), "Recording finalized");
                session.file_name = Some(saved.filename.clone());
                FinalizedRecording {
                    session,
                    playback: Some(PlaybackSource::Persisted {
                        path: saved.path,
                        filename: saved.filename,
                    }),
                    warning: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Persistence failed, keeping recording in memory");
                FinalizedRecording {
                    session,
                    playback: Some(PlaybackSource::Ephemeral {
                        uri: data_uri(&mime_type, &data),
                    }),
                    warning: Some(format!("recording could not be saved: {}", e)),
                }
            }
        }
    }
}

async fn run_pump(
    mut parts: PumpParts,
    session_id: SessionId,
    frame_rate: u32,
    chunk_interval: Duration,
    mut cancel: oneshot::Receiver<()>,
    source_lost: mpsc::UnboundedSender<SourceLost>,
) -> PumpParts {
    let frame_period = Duration::from_secs(1) / frame_rate.max(1);
    let mut redraw = tokio::time::interval(frame_period);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut drain = tokio::time::interval_at(Instant::now() + chunk_interval, chunk_interval);
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut encoder_failed = false;

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel => break,

            _ = drain.tick() => parts.drain().await,

            _ = redraw.tick() => {
                match parts.stream.grab_frame().await {
                    Ok(frame) => {
                        if encoder_failed {
                            continue;
                        }
                        if let Err(e) = parts.encoder.push_frame(&frame).await {
                            warn!(error = %e, "Encoder rejected frame, dropping further frames");
                            encoder_failed = true;
                        }
                    }
                    Err(e) if !parts.stream.is_live() => {
                        warn!(error = %e, "Recording source ended");
                        if source_lost
                            .send(SourceLost {
                                session_id,
                                reason: e.to_string(),
                            })
                            .is_err()
                        {
                            debug!("Controller gone, source loss not reported");
                        }
                        break;
                    }
                    Err(e) => debug!(error = %e, "Frame not available"),
                }
            }
        }
    }

    parts
}


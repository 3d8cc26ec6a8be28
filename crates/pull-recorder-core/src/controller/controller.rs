use crate::{
    CaptureError, CoreResult,
    capture::{CaptureSourceProvider, Dimensions, RawFrame, SourceResolver},
    controller::{
        ControllerSnapshot, ControllerState, DetectionConfig, LifecycleEvent,
        command::ControllerCommand, detection::DetectionLoop,
    },
    inference::{
        GateStats, InferenceEngine, InferenceGate, MODEL_INPUT, SampledSignal, Thresholds,
    },
    persistence::PersistenceService,
    recording::{
        EncoderFactory, FinalizerConfig, PlaybackSource, RecordingSession, SessionFinalizer,
        SessionHandle, SourceLost, TriggerOrigin,
    },
    sampler::wait_for_dimensions,
};

use std::{collections::VecDeque, panic::Location, sync::Arc, time::Duration};

use error_location::ErrorLocation;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, warn};

const COMMAND_CAPACITY: usize = 32;
const SIGNAL_CAPACITY: usize = 4;
const EVENT_CAPACITY: usize = 64;
const RECENT_LIMIT: usize = 20;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const DETECTION_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborators the controller drives.
#[derive(Clone)]
pub struct ControllerDeps {
    /// Capture source bridge.
    pub provider: Arc<dyn CaptureSourceProvider>,
    /// Encoder bridge.
    pub encoders: Arc<dyn EncoderFactory>,
    /// Recording storage.
    pub persistence: Arc<dyn PersistenceService>,
    /// Pull detector. `None` leaves only manual recording.
    pub engine: Option<Arc<dyn InferenceEngine>>,
}

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Source tiers and window pattern.
    pub resolver: SourceResolver,
    /// Sampling and retry behaviour of automatic detection.
    pub detection: DetectionConfig,
    /// Detector thresholds.
    pub thresholds: Thresholds,
    /// Detector input size.
    pub model_input: Dimensions,
    /// Recording and finalization tuning.
    pub finalizer: FinalizerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resolver: SourceResolver::default(),
            detection: DetectionConfig::default(),
            thresholds: Thresholds::default(),
            model_input: MODEL_INPUT,
            finalizer: FinalizerConfig::default(),
        }
    }
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControllerCommand>,
    events: broadcast::Sender<LifecycleEvent>,
    snapshot: watch::Receiver<ControllerSnapshot>,
    gate: Option<InferenceGate>,
}

impl ControllerHandle {
    /// Start a manual recording. A no-op while already recording.
    pub async fn manual_start(&self) -> CoreResult<()> {
        self.send(ControllerCommand::ManualStart).await
    }

    /// Stop the current recording, whatever started it. A no-op while idle.
    pub async fn manual_stop(&self) -> CoreResult<()> {
        self.send(ControllerCommand::ManualStop).await
    }

    /// Grab one full-resolution frame from a freshly resolved source.
    pub async fn request_screenshot(&self) -> CoreResult<RawFrame> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerCommand::Screenshot { reply }).await?;
        rx.await
            .map_err(|_| unavailable("screenshot reply dropped"))?
    }

    /// Stop detection, finalize any active session and end the actor.
    pub async fn shutdown(&self) -> CoreResult<()> {
        self.send(ControllerCommand::Shutdown).await
    }

    /// Lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }

    /// Inference counters, when detection is configured.
    pub fn detection_stats(&self) -> Option<GateStats> {
        self.gate.as_ref().map(InferenceGate::stats)
    }

    async fn send(&self, command: ControllerCommand) -> CoreResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| unavailable("controller task has stopped"))
    }
}

#[track_caller]
fn unavailable(reason: &str) -> CaptureError {
    CaptureError::ControllerUnavailable {
        reason: reason.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// The capture state machine.
///
/// Single writer of session status. Handles one trigger at a time, UI
/// commands before source-loss notices before detection signals.
pub struct CaptureController {
    provider: Arc<dyn CaptureSourceProvider>,
    resolver: SourceResolver,
    finalizer: SessionFinalizer,
    active: Option<SessionHandle>,
    recent: VecDeque<RecordingSession>,
    barrier: Instant,
    detection_enabled: bool,
    commands: mpsc::Receiver<ControllerCommand>,
    lost: mpsc::UnboundedReceiver<SourceLost>,
    signals: mpsc::Receiver<SampledSignal>,
    events: broadcast::Sender<LifecycleEvent>,
    snapshot: watch::Sender<ControllerSnapshot>,
    detection_shutdown: watch::Sender<bool>,
    detection: Option<JoinHandle<()>>,
}

impl CaptureController {
    /// Spawn the controller (and detection, when an engine is given) on
    /// the current runtime.
    pub fn spawn(deps: ControllerDeps, config: ControllerConfig) -> (ControllerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (detection_shutdown, shutdown_rx) = watch::channel(false);

        let gate = deps.engine.map(|engine| {
            InferenceGate::with_input(engine, config.thresholds, config.model_input)
        });
        let detection_enabled = gate.is_some();

        let (snapshot_tx, snapshot_rx) = watch::channel(ControllerSnapshot::idle(detection_enabled));

        let detection = gate.clone().map(|gate| {
            tokio::spawn(
                DetectionLoop {
                    provider: Arc::clone(&deps.provider),
                    resolver: config.resolver.clone(),
                    gate,
                    config: config.detection,
                    signals: signal_tx,
                    shutdown: shutdown_rx,
                }
                .run(),
            )
        });

        let finalizer = SessionFinalizer::new(
            Arc::clone(&deps.provider),
            deps.encoders,
            deps.persistence,
            lost_tx,
            config.finalizer,
        );

        let controller = CaptureController {
            provider: deps.provider,
            resolver: config.resolver,
            finalizer,
            active: None,
            recent: VecDeque::new(),
            barrier: Instant::now(),
            detection_enabled,
            commands: command_rx,
            lost: lost_rx,
            signals: signal_rx,
            events: events.clone(),
            snapshot: snapshot_tx,
            detection_shutdown,
            detection,
        };

        let handle = ControllerHandle {
            commands: command_tx,
            events,
            snapshot: snapshot_rx,
            gate,
        };

        (handle, tokio::spawn(controller.run()))
    }

    #[instrument(skip(self), name = "controller")]
    async fn run(mut self) {
        info!(detection = self.detection_enabled, "Capture controller started");

        let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
        progress.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(ControllerCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },

                Some(lost) = self.lost.recv() => self.handle_source_lost(lost).await,

                Some(signal) = self.signals.recv() => self.handle_signal(signal).await,

                _ = progress.tick(), if self.active.is_some() => self.publish(),
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::ManualStart => {
                self.barrier = Instant::now();
                if let Some(active) = &self.active {
                    debug!(session_id = %active.id(), "Already recording, start ignored");
                    return;
                }
                self.start(TriggerOrigin::Manual).await;
            }
            ControllerCommand::ManualStop => {
                self.barrier = Instant::now();
                if self.active.is_none() {
                    debug!("Not recording, stop ignored");
                    return;
                }
                self.stop().await;
            }
            ControllerCommand::Screenshot { reply } => self.screenshot(reply),
            ControllerCommand::Shutdown => {}
        }
    }

    async fn handle_source_lost(&mut self, lost: SourceLost) {
        match &self.active {
            Some(active) if active.id() == lost.session_id => {
                warn!(session_id = %lost.session_id, reason = %lost.reason, "Recording source lost, finalizing");
                self.stop().await;
            }
            _ => debug!(session_id = %lost.session_id, "Source loss for inactive session ignored"),
        }
    }

    async fn handle_signal(&mut self, sampled: SampledSignal) {
        if sampled.captured_at < self.barrier {
            debug!("Signal predates the last transition, skipped");
            return;
        }

        let signal = sampled.signal;
        match self.active.as_ref().map(SessionHandle::origin) {
            None if signal.start_detected => {
                info!(score = signal.start_score, "Pull start detected");
                self.start(TriggerOrigin::Automatic).await;
            }
            Some(TriggerOrigin::Automatic) if signal.end_detected => {
                info!(score = signal.end_score, "Pull end detected");
                self.stop().await;
            }
            Some(TriggerOrigin::Manual) if signal.start_detected || signal.end_detected => {
                debug!("Manual session active, automatic signal suppressed");
            }
            _ => {}
        }
    }

    async fn start(&mut self, origin: TriggerOrigin) {
        let started = async {
            let source = self.resolver.resolve(self.provider.as_ref()).await?;
            self.finalizer.start(source, origin).await
        }
        .await;

        match started {
            Ok(handle) => {
                let session = handle.session();
                self.active = Some(handle);
                self.barrier = Instant::now();
                self.publish();
                self.emit(LifecycleEvent::SessionStarted { session });
            }
            Err(e) => {
                error!(origin = %origin, error = %e, "Failed to start recording");
                self.emit(LifecycleEvent::Error {
                    message: format!("Could not start recording: {}", e),
                });
            }
        }
    }

    async fn stop(&mut self) {
        let Some(handle) = self.active.take() else {
            return;
        };

        let session_id = handle.id();
        self.snapshot.send_replace(ControllerSnapshot {
            state: ControllerState::Finalizing { session_id },
            active: Some(handle.session()),
            recent: self.recent.iter().cloned().collect(),
            detection_enabled: self.detection_enabled,
        });

        let finalized = self.finalizer.stop(handle).await;
        let session = finalized.session;

        self.recent.push_front(session.clone());
        self.recent.truncate(RECENT_LIMIT);
        self.barrier = Instant::now();
        self.publish();

        let event = match (finalized.playback, finalized.warning) {
            (Some(playback), warning) => {
                if let Some(w) = &warning {
                    warn!(session_id = %session_id, warning = %w, "Recording completed in degraded form");
                }
                LifecycleEvent::SessionCompleted {
                    session,
                    playback,
                    warning,
                }
            }
            (None, reason) => LifecycleEvent::SessionFailed {
                session,
                reason: reason.unwrap_or_else(|| "recording failed".to_string()),
            },
        };
        self.emit(event);
    }

    fn screenshot(&self, reply: oneshot::Sender<CoreResult<RawFrame>>) {
        let provider = Arc::clone(&self.provider);
        let resolver = self.resolver.clone();
        let ready_timeout = self.finalizer.config().ready_timeout;

        tokio::spawn(async move {
            let result = grab_still(provider.as_ref(), &resolver, ready_timeout).await;
            if reply.send(result).is_err() {
                debug!("Screenshot requester went away");
            }
        });
    }

    async fn shutdown(&mut self) {
        info!("Capture controller shutting down");

        let _ = self.detection_shutdown.send(true);
        if let Some(task) = self.detection.take() {
            match tokio::time::timeout(DETECTION_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Detection stopped cleanly"),
                Ok(Err(e)) => error!(error = %e, "Detection task failed"),
                Err(_) => warn!("Detection did not stop in time"),
            }
        }

        if self.active.is_some() {
            self.stop().await;
        }

        info!("Capture controller stopped");
    }

    fn publish(&self) {
        let (state, active) = match &self.active {
            Some(handle) => (
                ControllerState::Recording {
                    session_id: handle.id(),
                    origin: handle.origin(),
                },
                Some(handle.session()),
            ),
            None => (ControllerState::Idle, None),
        };

        self.snapshot.send_replace(ControllerSnapshot {
            state,
            active,
            recent: self.recent.iter().cloned().collect(),
            detection_enabled: self.detection_enabled,
        });
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn grab_still(
    provider: &dyn CaptureSourceProvider,
    resolver: &SourceResolver,
    ready_timeout: Duration,
) -> CoreResult<RawFrame> {
    let source = resolver.resolve(provider).await?;
    let mut stream = source.acquire(provider).await?;

    wait_for_dimensions(stream.as_mut(), ready_timeout).await;
    let frame = stream.grab_frame().await;
    stream.stop().await;

    frame
}

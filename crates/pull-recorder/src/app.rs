use crate::{
    AppCommand, AppError, AppResult, TrayCommand, TrayIconState, TrayMenuIds, clipboard,
    notifier::{self, NotificationText},
};

use pull_recorder_core::{ControllerHandle, LifecycleEvent};

use std::{panic::Location, path::PathBuf, time::Duration};

use error_location::ErrorLocation;
use tao::event_loop::EventLoopProxy;
use tokio::{
    sync::{
        broadcast::error::RecvError,
        mpsc, watch,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};
use tray_icon::menu::MenuEvent;

/// Upper bound on the controller finishing an active session at exit.
const CONTROLLER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main application state.
///
/// Runs on the async runtime thread. Tray updates go back to the main
/// thread through `tray_proxy` because `TrayIcon` is `!Send` and must
/// remain on the UI thread.
pub struct App {
    pub(crate) controller: ControllerHandle,
    pub(crate) controller_task: JoinHandle<()>,
    pub(crate) tray_proxy: EventLoopProxy<TrayCommand>,
    pub(crate) command_tx: mpsc::Sender<AppCommand>,
    pub(crate) command_rx: mpsc::Receiver<AppCommand>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) menu_ids: TrayMenuIds,
    pub(crate) recordings_dir: PathBuf,
    pub(crate) server_url: String,
}

impl App {
    /// Run the main application event loop.
    #[instrument(skip(self))]
    pub(crate) async fn run(mut self) -> AppResult<()> {
        info!("Pull Recorder starting");

        // MenuEvent::receiver() is a blocking crossbeam receiver. The
        // forwarder stops on the first send after tray_event_rx is dropped.
        let (tray_event_tx, mut tray_event_rx) = mpsc::channel(32);
        let tray_handle = tokio::task::spawn_blocking(move || {
            let receiver = MenuEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if tray_event_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        let mut events = self.controller.subscribe();
        let mut snapshots = self.controller.watch();
        let mut tray_state = TrayIconState::from(&*snapshots.borrow_and_update());
        self.set_tray_state(tray_state);

        loop {
            tokio::select! {
                Some(event) = tray_event_rx.recv() => {
                    self.handle_tray_event(event).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    if cmd == AppCommand::Shutdown {
                        info!("Shutdown requested");
                        break;
                    }
                    self.handle_command(cmd).await;
                }

                event = events.recv() => match event {
                    Ok(event) => self.handle_lifecycle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Lifecycle events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Capture controller stopped");
                        break;
                    }
                },

                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("Capture controller stopped");
                        break;
                    }
                    let (state, progress) = {
                        let snapshot = snapshots.borrow_and_update();
                        let progress = snapshot
                            .active
                            .as_ref()
                            .filter(|_| snapshot.is_recording())
                            .map(|session| (session.name.clone(), session.accumulated_bytes));
                        (TrayIconState::from(&*snapshot), progress)
                    };
                    if state != tray_state {
                        tray_state = state;
                        self.set_tray_state(state);
                    }
                    if let Some((name, bytes)) = progress {
                        self.send_tray(TrayCommand::SetProgress { name, bytes });
                    }
                }
            }
        }

        drop(tray_event_rx);

        match tokio::time::timeout(Duration::from_secs(1), tray_handle).await {
            Ok(Ok(())) => info!("Tray event forwarder stopped cleanly"),
            Ok(Err(e)) => error!(error = ?e, "Tray event forwarder task panicked"),
            Err(_) => info!(
                "Tray event forwarder did not stop within timeout, \
                     will be cleaned up on exit"
            ),
        }

        self.stop_controller().await;

        // Receivers are gone once the hotkey handler and server have exited.
        let _ = self.shutdown_tx.send(true);
        if self.tray_proxy.send_event(TrayCommand::Shutdown).is_err() {
            debug!("Event loop already closed");
        }
        info!("Pull Recorder shut down successfully");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn handle_command(&self, cmd: AppCommand) {
        match cmd {
            AppCommand::StartRecording => {
                if let Err(e) = self.controller.manual_start().await {
                    error!(error = ?e, "Failed to start recording");
                }
            }
            AppCommand::StopRecording => {
                if let Err(e) = self.controller.manual_stop().await {
                    error!(error = ?e, "Failed to stop recording");
                }
            }
            AppCommand::Screenshot => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = copy_screenshot(controller).await {
                        error!(error = ?e, "Screenshot failed");
                        notifier::notify(NotificationText {
                            summary: "Screenshot failed".to_string(),
                            body: e.to_string(),
                        })
                        .await;
                    }
                });
            }
            AppCommand::Shutdown => {}
        }
    }

    fn handle_lifecycle_event(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::SessionStarted { session } => {
                info!(session_id = %session.id, origin = %session.origin, "Session started");
            }
            LifecycleEvent::SessionCompleted {
                session,
                warning: Some(warning),
                ..
            } => warn!(session_id = %session.id, warning = %warning, "Session kept unsaved"),
            LifecycleEvent::SessionCompleted { session, .. } => {
                info!(session_id = %session.id, bytes = session.accumulated_bytes, "Session completed");
            }
            LifecycleEvent::SessionFailed { session, reason } => {
                warn!(session_id = %session.id, reason = %reason, "Session failed");
            }
            LifecycleEvent::Error { message } => warn!(message = %message, "Controller error"),
        }

        if let Some(text) = notifier::notification_for(&event) {
            tokio::spawn(notifier::notify(text));
        }
    }

    /// Handle tray menu events.
    #[instrument(skip(self))]
    async fn handle_tray_event(&self, event: MenuEvent) {
        let id = &event.id;
        let ids = &self.menu_ids;

        if *id == ids.start {
            self.handle_command(AppCommand::StartRecording).await;
        } else if *id == ids.stop {
            self.handle_command(AppCommand::StopRecording).await;
        } else if *id == ids.open_recordings {
            if let Err(e) = tokio::fs::create_dir_all(&self.recordings_dir).await {
                warn!(error = %e, "Failed to create recordings directory");
            }
            match open::that(&self.recordings_dir) {
                Ok(()) => info!(dir = %self.recordings_dir.display(), "Opened recordings folder"),
                Err(e) => error!(error = %e, "Failed to open recordings folder"),
            }
        } else if *id == ids.open_web {
            match open::that(&self.server_url) {
                Ok(()) => info!(url = %self.server_url, "Opened web UI"),
                Err(e) => error!(error = %e, "Failed to open web UI"),
            }
        } else if *id == ids.exit {
            info!("Exit requested from tray menu");
            if let Err(e) = self.command_tx.send(AppCommand::Shutdown).await {
                error!(error = ?e, "Failed to send shutdown command");
            }
        }
    }

    fn set_tray_state(&self, state: TrayIconState) {
        self.send_tray(TrayCommand::SetState(state));
    }

    fn send_tray(&self, command: TrayCommand) {
        if self.tray_proxy.send_event(command).is_err() {
            debug!("Event loop closed, tray not updated");
        }
    }

    async fn stop_controller(&mut self) {
        if let Err(e) = self.controller.shutdown().await {
            debug!(error = ?e, "Controller already stopped");
        }

        match tokio::time::timeout(CONTROLLER_SHUTDOWN_TIMEOUT, &mut self.controller_task).await {
            Ok(Ok(())) => info!("Capture controller stopped cleanly"),
            Ok(Err(e)) => error!(error = ?e, "Capture controller task panicked"),
            Err(_) => {
                warn!("Capture controller did not stop within timeout");
                self.controller_task.abort();
            }
        }
    }
}

async fn copy_screenshot(controller: ControllerHandle) -> AppResult<()> {
    let frame = controller.request_screenshot().await?;
    tokio::task::spawn_blocking(move || clipboard::copy_frame(&frame))
        .await
        .map_err(|e| AppError::ClipboardError {
            reason: format!("Clipboard task failed: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })??;

    notifier::notify(NotificationText {
        summary: "Screenshot copied".to_string(),
        body: "The capture source is on the clipboard".to_string(),
    })
    .await;

    Ok(())
}

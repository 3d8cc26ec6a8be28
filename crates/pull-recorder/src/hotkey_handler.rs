//! Global hotkeys for manual control.
//!
//! CTRL+SHIFT+S starts a recording, CTRL+SHIFT+E stops it and CTRL+SHIFT+P
//! copies a screenshot of the capture source. Presses are forwarded to the
//! application as [`AppCommand`]s; the capture controller decides what they
//! mean in its current state.

use crate::{AppCommand, AppError, AppResult};

use std::{panic::Location, time::Duration};

use error_location::ErrorLocation;
use global_hotkey::{
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
    hotkey::{Code, HotKey, Modifiers},
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

/// Hotkey ids returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    /// Start recording.
    pub start: u32,
    /// Stop recording.
    pub stop: u32,
    /// Screenshot to clipboard.
    pub screenshot: u32,
}

impl HotkeyBindings {
    /// Command bound to a hotkey id.
    pub fn command_for(&self, id: u32) -> Option<AppCommand> {
        if id == self.start {
            Some(AppCommand::StartRecording)
        } else if id == self.stop {
            Some(AppCommand::StopRecording)
        } else if id == self.screenshot {
            Some(AppCommand::Screenshot)
        } else {
            None
        }
    }
}

/// The default key combinations, paired with a label for logs.
pub fn default_hotkeys() -> [(HotKey, &'static str); 3] {
    let mods = Some(Modifiers::CONTROL | Modifiers::SHIFT);
    [
        (HotKey::new(mods, Code::KeyS), "CTRL+SHIFT+S"),
        (HotKey::new(mods, Code::KeyE), "CTRL+SHIFT+E"),
        (HotKey::new(mods, Code::KeyP), "CTRL+SHIFT+P"),
    ]
}

/// Forwards global hotkey presses to the application.
pub struct HotkeyHandler {
    bindings: HotkeyBindings,
    command_tx: mpsc::Sender<AppCommand>,
}

impl HotkeyHandler {
    /// Register the start, stop and screenshot hotkeys.
    ///
    /// Must be called on a thread with a message pump (e.g. the main thread
    /// running a `tao`/`winit` event loop) so that `WM_HOTKEY` messages are
    /// dispatched on Windows. The returned [`GlobalHotKeyManager`] must be
    /// kept alive on that thread for the hotkeys to remain registered.
    #[track_caller]
    #[instrument]
    pub fn register_hotkeys() -> AppResult<(GlobalHotKeyManager, HotkeyBindings)> {
        let manager =
            GlobalHotKeyManager::new().map_err(|e| AppError::HotkeyRegistrationFailed {
                reason: format!("Failed to create manager: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let [(start, start_label), (stop, stop_label), (screenshot, shot_label)] =
            default_hotkeys();

        for (hotkey, label) in [(start, start_label), (stop, stop_label), (screenshot, shot_label)] {
            manager
                .register(hotkey)
                .map_err(|e| AppError::HotkeyRegistrationFailed {
                    reason: format!("Failed to register {}: {}", label, e),
                    location: ErrorLocation::from(Location::caller()),
                })?;
            info!(hotkey = label, "Global hotkey registered");
        }

        Ok((
            manager,
            HotkeyBindings {
                start: start.id(),
                stop: stop.id(),
                screenshot: screenshot.id(),
            },
        ))
    }

    /// Create a handler for previously registered hotkeys.
    ///
    /// This struct is `Send` and can live on any thread; it only listens on
    /// the global [`GlobalHotKeyEvent`] channel.
    pub fn new(bindings: HotkeyBindings, command_tx: mpsc::Sender<AppCommand>) -> Self {
        Self {
            bindings,
            command_tx,
        }
    }

    /// Run the hotkey handler event loop until shutdown is signalled.
    #[instrument(skip(self))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> AppResult<()> {
        let receiver = GlobalHotKeyEvent::receiver().clone();
        let (event_tx, mut event_rx) = mpsc::channel(32);

        // GlobalHotKeyEvent::receiver() is a blocking crossbeam receiver.
        // The forwarder stops on the first send after event_rx is dropped.
        let handle = tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                if event_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Hotkey handler shutting down");
                    break;
                }
                Some(event) = event_rx.recv() => {
                    if event.state() != HotKeyState::Pressed {
                        continue;
                    }
                    if let Some(command) = self.bindings.command_for(event.id()) {
                        self.forward(command).await?;
                    }
                }
            }
        }

        drop(event_rx);

        // The forwarder may be stuck in recv() until the next key event.
        match tokio::time::timeout(Duration::from_secs(1), handle).await {
            Ok(Ok(())) => debug!("Hotkey event forwarder stopped cleanly"),
            Ok(Err(e)) => warn!(error = ?e, "Hotkey event forwarder task panicked"),
            Err(_) => debug!(
                "Hotkey event forwarder did not stop within timeout, \
                   will be cleaned up on exit"
            ),
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn forward(&self, command: AppCommand) -> AppResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| AppError::ChannelSendFailed {
                message: format!("Failed to send {:?}: {}", command, e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!(command = ?command, "Hotkey forwarded");

        Ok(())
    }
}

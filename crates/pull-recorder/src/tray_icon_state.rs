use pull_recorder_core::{ControllerSnapshot, ControllerState};

/// Tray icon states mirroring the capture controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayIconState {
    /// Waiting for a pull.
    Idle,
    /// A pull is being recorded.
    Recording,
    /// The last recording is being flushed and saved.
    Finalizing,
}

impl From<&ControllerSnapshot> for TrayIconState {
    fn from(snapshot: &ControllerSnapshot) -> Self {
        match snapshot.state {
            ControllerState::Idle => TrayIconState::Idle,
            ControllerState::Recording { .. } => TrayIconState::Recording,
            ControllerState::Finalizing { .. } => TrayIconState::Finalizing,
        }
    }
}

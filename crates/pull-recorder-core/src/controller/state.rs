use crate::recording::{RecordingSession, SessionId, TriggerOrigin};

use serde::Serialize;

/// Controller state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    /// No recording.
    Idle,
    /// A session is recording.
    Recording {
        /// Active session.
        session_id: SessionId,
        /// What started it.
        origin: TriggerOrigin,
    },
    /// A session is being flushed and stored. Leads to `Idle`.
    Finalizing {
        /// Session being finalized.
        session_id: SessionId,
    },
}

/// Published on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Current state.
    pub state: ControllerState,
    /// The recording or finalizing session.
    pub active: Option<RecordingSession>,
    /// Sessions finished by this process, most recent first.
    pub recent: Vec<RecordingSession>,
    /// Whether automatic detection is running.
    pub detection_enabled: bool,
}

impl ControllerSnapshot {
    pub(crate) fn idle(detection_enabled: bool) -> Self {
        Self {
            state: ControllerState::Idle,
            active: None,
            recent: Vec::new(),
            detection_enabled,
        }
    }

    /// True while a session is recording.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, ControllerState::Recording { .. })
    }
}

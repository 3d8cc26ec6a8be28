use crate::recording::{PlaybackSource, RecordingSession};

use serde::Serialize;

/// Session lifecycle notifications, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A session began recording.
    SessionStarted {
        /// The new session.
        session: RecordingSession,
    },
    /// A session was finalized with data.
    SessionCompleted {
        /// Final session state.
        session: RecordingSession,
        /// Where to play it back.
        playback: PlaybackSource,
        /// Set when the recording was kept in degraded form.
        warning: Option<String>,
    },
    /// A session ended without usable data.
    SessionFailed {
        /// Final session state.
        session: RecordingSession,
        /// Human-readable reason.
        reason: String,
    },
    /// A start or stop request could not be carried out.
    Error {
        /// Human-readable message.
        message: String,
    },
}

use crate::capture::CaptureSourceDescriptor;

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recording session identifier.
pub type SessionId = Uuid;

/// Lifecycle of a recording session. Only moves forward from `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Frames are being encoded.
    Recording,
    /// Finalized with data (possibly only in memory).
    Completed,
    /// Finalized without usable data.
    Failed,
}

/// What started a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// A user command.
    Manual,
    /// A detector signal.
    Automatic,
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOrigin::Manual => f.write_str("manual"),
            TriggerOrigin::Automatic => f.write_str("automatic"),
        }
    }
}

/// One recording attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    /// Unique per session.
    pub id: SessionId,
    /// Display name, also the suggested file name.
    pub name: String,
    /// Wall-clock start.
    pub started_at: DateTime<Local>,
    /// Wall-clock end, set on finalization.
    pub ended_at: Option<DateTime<Local>>,
    /// Current status.
    pub status: SessionStatus,
    /// Source being recorded.
    pub source: CaptureSourceDescriptor,
    /// Encoded bytes collected so far.
    pub accumulated_bytes: u64,
    /// What started the session.
    pub origin: TriggerOrigin,
    /// File name in the recordings directory once persisted.
    pub file_name: Option<String>,
}

impl RecordingSession {
    /// A new session in `Recording` status, started now.
    pub fn begin(source: CaptureSourceDescriptor, origin: TriggerOrigin) -> Self {
        let started_at = Local::now();
        Self {
            id: Uuid::new_v4(),
            name: default_session_name(started_at),
            started_at,
            ended_at: None,
            status: SessionStatus::Recording,
            source,
            accumulated_bytes: 0,
            origin,
            file_name: None,
        }
    }

    /// True while frames are still being encoded.
    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }
}

/// `Pull HH-MM-SS` from the session start time.
pub fn default_session_name(started_at: DateTime<Local>) -> String {
    format!("Pull {}", started_at.format("%H-%M-%S"))
}

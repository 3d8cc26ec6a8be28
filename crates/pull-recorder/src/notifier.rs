//! Desktop notifications for recording lifecycle events.

use pull_recorder_core::{LifecycleEvent, recording::PlaybackSource};

use notify_rust::Notification;
use tracing::{debug, warn};

const APP_NAME: &str = "Pull Recorder";

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    /// Title line.
    pub summary: String,
    /// Body text.
    pub body: String,
}

impl NotificationText {
    fn new(summary: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            body: body.into(),
        }
    }
}

/// Notification for a lifecycle event. Session starts are silent.
pub fn notification_for(event: &LifecycleEvent) -> Option<NotificationText> {
    match event {
        LifecycleEvent::SessionStarted { .. } => None,
        LifecycleEvent::SessionCompleted {
            session,
            playback,
            warning,
        } => {
            let body = match (playback, warning) {
                (PlaybackSource::Persisted { filename, .. }, _) => format!("Saved {}", filename),
                (PlaybackSource::Ephemeral { .. }, Some(warning)) => {
                    format!("Not saved: {}", warning)
                }
                (PlaybackSource::Ephemeral { .. }, None) => "Kept in memory only".to_string(),
            };
            Some(NotificationText::new(
                format!("{} recorded", session.name),
                body,
            ))
        }
        LifecycleEvent::SessionFailed { session, reason } => Some(NotificationText::new(
            format!("{} failed", session.name),
            reason.clone(),
        )),
        LifecycleEvent::Error { message } => {
            Some(NotificationText::new("Recording error", message.clone()))
        }
    }
}

/// Show a notification without blocking the runtime.
pub async fn notify(text: NotificationText) {
    let result = tokio::task::spawn_blocking(move || {
        Notification::new()
            .appname(APP_NAME)
            .summary(&text.summary)
            .body(&text.body)
            .show()
            .map(|_| ())
    })
    .await;

    match result {
        Ok(Ok(())) => debug!("Notification shown"),
        Ok(Err(e)) => warn!(error = %e, "Failed to show notification"),
        Err(e) => warn!(error = %e, "Notification task failed"),
    }
}

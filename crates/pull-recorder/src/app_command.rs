/// Commands sent from the hotkey handler to the main application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Start a manual recording.
    StartRecording,
    /// Stop the active recording.
    StopRecording,
    /// Copy a still of the capture source to the clipboard.
    Screenshot,
    /// Request application shutdown.
    Shutdown,
}

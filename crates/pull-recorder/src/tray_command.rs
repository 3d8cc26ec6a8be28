use crate::TrayIconState;

/// Requests from the runtime thread to the `tao` event loop, which owns the
/// `!Send` tray icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayCommand {
    /// Switch icon, tooltip and menu enabling to a new state.
    SetState(TrayIconState),
    /// Show the active session's name and size in the tooltip.
    SetProgress {
        /// Session display name.
        name: String,
        /// Encoded bytes collected so far.
        bytes: u64,
    },
    /// Leave the event loop.
    Shutdown,
}

//! System tray icon with state-based updates.
//!
//! Shows whether a pull is being recorded and offers a small context menu:
//! start/stop, open the recordings folder, open the web UI and exit.

use crate::{AppError, AppResult, TrayIconState};

use std::panic::Location;

use error_location::ErrorLocation;
use tracing::{info, instrument};
use tray_icon::menu::{Menu, MenuId, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Menu item identifiers, cloned into the async runtime.
#[derive(Debug, Clone)]
pub struct TrayMenuIds {
    /// Start a manual recording.
    pub start: MenuId,
    /// Stop the active recording.
    pub stop: MenuId,
    /// Open the recordings folder.
    pub open_recordings: MenuId,
    /// Open the web UI.
    pub open_web: MenuId,
    /// Exit the application.
    pub exit: MenuId,
}

/// System tray icon manager.
pub struct TrayManager {
    tray_icon: TrayIcon,
    start_item: MenuItem,
    stop_item: MenuItem,
    menu_ids: TrayMenuIds,
}

impl TrayManager {
    /// Create a new tray manager in the idle state.
    #[track_caller]
    #[instrument]
    pub fn new() -> AppResult<Self> {
        let menu = Menu::new();

        let start_item = MenuItem::new("Start Recording", true, None);
        let stop_item = MenuItem::new("Stop Recording", false, None);
        let recordings_item = MenuItem::new("Open Recordings", true, None);
        let web_item = MenuItem::new("Open Web UI", true, None);
        let exit_item = MenuItem::new("Exit", true, None);

        let menu_ids = TrayMenuIds {
            start: start_item.id().clone(),
            stop: stop_item.id().clone(),
            open_recordings: recordings_item.id().clone(),
            open_web: web_item.id().clone(),
            exit: exit_item.id().clone(),
        };

        menu.append_items(&[
            &start_item,
            &stop_item,
            &PredefinedMenuItem::separator(),
            &recordings_item,
            &web_item,
            &PredefinedMenuItem::separator(),
            &exit_item,
        ])
        .map_err(|e| AppError::TrayError {
            reason: format!("Failed to build tray menu: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let icon = Self::load_icon(TrayIconState::Idle)?;

        let tray_icon = TrayIconBuilder::new()
            .with_tooltip(tooltip(TrayIconState::Idle))
            .with_menu(Box::new(menu))
            .with_icon(icon)
            .build()
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to create tray icon: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("System tray icon initialized");

        Ok(Self {
            tray_icon,
            start_item,
            stop_item,
            menu_ids,
        })
    }

    /// Update icon, tooltip and which of start/stop is enabled.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn update_state(&mut self, state: TrayIconState) -> AppResult<()> {
        self.tray_icon
            .set_icon(Some(Self::load_icon(state)?))
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to update icon: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        self.tray_icon
            .set_tooltip(Some(tooltip(state)))
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to update tooltip: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        self.start_item.set_enabled(state == TrayIconState::Idle);
        self.stop_item.set_enabled(state == TrayIconState::Recording);

        Ok(())
    }

    /// Replace the tooltip with live session progress.
    #[track_caller]
    pub fn update_progress(&mut self, name: &str, bytes: u64) -> AppResult<()> {
        self.tray_icon
            .set_tooltip(Some(progress_tooltip(name, bytes)))
            .map_err(|e| AppError::TrayError {
                reason: format!("Failed to update tooltip: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    #[track_caller]
    fn load_icon(state: TrayIconState) -> AppResult<Icon> {
        let (rgba, width, height) = icon_rgba(state)?;

        Icon::from_rgba(rgba, width, height).map_err(|e| AppError::TrayError {
            reason: format!("Failed to create icon from RGBA: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Menu item identifiers.
    pub fn menu_ids(&self) -> &TrayMenuIds {
        &self.menu_ids
    }
}

/// Tooltip text for a state.
pub fn tooltip(state: TrayIconState) -> &'static str {
    match state {
        TrayIconState::Idle => "Pull Recorder - Watching",
        TrayIconState::Recording => "Pull Recorder - Recording...",
        TrayIconState::Finalizing => "Pull Recorder - Saving...",
    }
}

/// Recording tooltip with the session name and size, e.g.
/// `Pull Recorder - Recording Pull 21-04-10 (12.5 MB)`.
pub fn progress_tooltip(name: &str, bytes: u64) -> String {
    let megabytes = bytes as f64 / (1024.0 * 1024.0);
    format!("Pull Recorder - Recording {} ({:.1} MB)", name, megabytes)
}

/// Decode the embedded PNG for a state into RGBA.
///
/// Icons are embedded via include_bytes! so they work regardless of
/// install location.
#[track_caller]
pub fn icon_rgba(state: TrayIconState) -> AppResult<(Vec<u8>, u32, u32)> {
    let png_bytes: &[u8] = match state {
        TrayIconState::Idle => include_bytes!("../resources/icons/idle.png"),
        TrayIconState::Recording => include_bytes!("../resources/icons/recording.png"),
        TrayIconState::Finalizing => include_bytes!("../resources/icons/finalizing.png"),
    };

    let img = image::load_from_memory(png_bytes).map_err(|e| AppError::TrayError {
        reason: format!("Failed to decode embedded icon: {}", e),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let rgba = img.into_rgba8();
    let (width, height) = (rgba.width(), rgba.height());

    Ok((rgba.into_raw(), width, height))
}

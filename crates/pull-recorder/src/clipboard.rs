use crate::{AppError, AppResult};

use pull_recorder_core::capture::RawFrame;

use std::{borrow::Cow, panic::Location};

use arboard::{Clipboard, ImageData};
use error_location::ErrorLocation;
use tracing::{info, instrument};

/// Put a frame on the system clipboard as an image.
#[track_caller]
#[instrument(skip(frame), fields(dims = %frame.dimensions()))]
pub fn copy_frame(frame: &RawFrame) -> AppResult<()> {
    let mut clipboard = Clipboard::new().map_err(|e| AppError::ClipboardError {
        reason: format!("Failed to open clipboard: {}", e),
        location: ErrorLocation::from(Location::caller()),
    })?;

    clipboard
        .set_image(ImageData {
            width: frame.width as usize,
            height: frame.height as usize,
            bytes: Cow::Borrowed(&frame.rgba),
        })
        .map_err(|e| AppError::ClipboardError {
            reason: format!("Failed to set clipboard image: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!("Screenshot copied to clipboard");

    Ok(())
}

use crate::server::{ApiError, ServerState};

use pull_recorder_core::{
    CaptureError, ControllerSnapshot,
    capture::RawFrame,
    inference::GateStats,
    persistence::{CatalogItem, PersistenceService, merge_catalog},
};

use std::{io::Cursor, panic::Location};

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use error_location::ErrorLocation;
use image::{ImageFormat, RgbaImage};
use serde::Serialize;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    snapshot: ControllerSnapshot,
    detection: Option<GateStats>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UriResponse {
    id: String,
    uri: String,
}

pub(crate) async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        snapshot: state.controller.snapshot(),
        detection: state.controller.detection_stats(),
    })
}

#[instrument(skip(state))]
pub(crate) async fn list_recordings(
    State(state): State<ServerState>,
) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    let entries = state.store.list().await?;
    let snapshot = state.controller.snapshot();

    let mut sessions = snapshot.recent;
    sessions.extend(snapshot.active);

    Ok(Json(merge_catalog(&sessions, &entries)))
}

#[instrument(skip(state))]
pub(crate) async fn recording_uri(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<UriResponse>, ApiError> {
    let path = state
        .store
        .path_for_id(&id)
        .ok_or_else(|| ApiError::not_found(format!("invalid recording id {:?}", id)))?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::not_found(format!("no recording {:?}", id)));
    }

    let uri = state.store.read_as_portable_uri(&path).await?;
    debug!(id = %id, len = uri.len(), "Recording read as data URI");

    Ok(Json(UriResponse { id, uri }))
}

pub(crate) async fn start_recording(
    State(state): State<ServerState>,
) -> Result<StatusCode, ApiError> {
    state.controller.manual_start().await?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn stop_recording(
    State(state): State<ServerState>,
) -> Result<StatusCode, ApiError> {
    state.controller.manual_stop().await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state))]
pub(crate) async fn screenshot(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, ApiError> {
    let frame = state.controller.request_screenshot().await?;
    let png = encode_png(frame)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// PNG bytes for a raw frame.
pub(crate) fn encode_png(frame: RawFrame) -> Result<Vec<u8>, CaptureError> {
    let dims = frame.dimensions();
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba).ok_or_else(|| {
        CaptureError::InvalidFrame {
            reason: format!("buffer does not match {}", dims),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| CaptureError::InvalidFrame {
            reason: format!("PNG encoding failed: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(png.into_inner())
}

//! Embedded HTTP server: recording catalog, manual control, screenshots and
//! a WebSocket feed of lifecycle events for the web UI.

mod routes;
mod ws;

use crate::{AppError, AppResult};

use pull_recorder_core::{CaptureError, ControllerHandle, persistence::FsRecordingStore};

use std::{net::SocketAddr, panic::Location, sync::Arc};

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use error_location::ErrorLocation;
use serde::Serialize;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, instrument, warn};

/// Shared state for handlers.
#[derive(Clone)]
pub struct ServerState {
    /// Capture controller.
    pub controller: ControllerHandle,
    /// Recording storage.
    pub store: Arc<FsRecordingStore>,
}

/// Build the router.
pub fn router(state: ServerState) -> Router {
    let files = ServeDir::new(state.store.dir());

    Router::new()
        .route("/api/status", get(routes::status))
        .route("/api/recordings", get(routes::list_recordings))
        .route("/api/recordings/{id}/uri", get(routes::recording_uri))
        .route("/api/record/start", post(routes::start_recording))
        .route("/api/record/stop", post(routes::stop_recording))
        .route("/api/screenshot", get(routes::screenshot))
        .route("/api/events", get(ws::events))
        .nest_service("/files", files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on localhost until `shutdown` turns true.
#[instrument(skip(state, shutdown))]
pub async fn serve(port: u16, state: ServerState, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Failed to bind {}: {}", addr, e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!(addr = %addr, "Web server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                warn!("Shutdown channel closed, stopping web server");
            }
        })
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Server failed: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!("Web server stopped");

    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Handler error mapped to a status code and a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 404 with a message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(error: CaptureError) -> Self {
        let status = match &error {
            CaptureError::ControllerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CaptureError::NoSourceAvailable { .. } | CaptureError::SourceUnavailable { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

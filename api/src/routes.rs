//! HTTP route handlers for Reelport.
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use reelport_shared::files;
use reelport_shared::models::{DownloadedFile, Metadata, StatusReport};

use crate::AppState;

// ====== REQUEST / RESPONSE TYPES ======

#[derive(Deserialize)]
pub struct DownloadBody {
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct DownloadResponse {
    pub video_id: String,
    pub info: Metadata,
}

#[derive(Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<DownloadedFile>,
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { detail: detail.into() }))
}

/// API routes plus the static mount for finished downloads.
pub fn router(state: Arc<AppState>) -> Router {
    let downloads = ServeDir::new(&state.download_dir);
    Router::new()
        .route("/", get(list_files))
        .route("/download", post(start_download))
        .route("/status/:video_id", get(get_status))
        .nest_service("/downloads", downloads)
        .with_state(state)
}

// ====== ROUTES ======

/// POST /download - Resolve metadata and start a background download
pub async fn start_download(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(body) = body.map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let url = body
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "url is required"))?;

    info!("Received download request for URL: {}", url);

    match state.orchestrator.submit(&url).await {
        Ok((video_id, info)) => Ok(Json(DownloadResponse { video_id, info })),
        Err(e) => {
            warn!("Error processing download request for {}: {}", url, e);
            Err(error(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

/// GET /status/:video_id - Poll a job
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Json<StatusReport> {
    Json(state.orchestrator.status(&video_id).await)
}

/// GET / - Files currently in the download directory
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FilesResponse>, ApiError> {
    let dir = state.download_dir.clone();
    let files = tokio::task::spawn_blocking(move || files::list_downloads(&dir))
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!("Cannot list {}: {}", state.download_dir.display(), e);
            error(StatusCode::INTERNAL_SERVER_ERROR, format!("Cannot list downloads: {}", e))
        })?;
    Ok(Json(FilesResponse { files }))
}

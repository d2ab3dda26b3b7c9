//! HTTP server - routes requests to the CDN service
//!
//! Upload, serve, admin and status endpoints. Handlers stay thin: they
//! decode the request, call [`CdnService`] and encode the response.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::error::AppError;
use super::mime::content_type_for;
use super::protocol::{DeleteResponse, FileListing, FileSummary, StatusResponse, UploadResponse};
use crate::service::{CdnService, UploadRequest};

/// Served files may be cached by browsers and proxies for an hour
const CACHE_CONTROL_VALUE: &str = "public, max-age=3600";

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CdnService>,
    /// Repository identity reported by the status endpoint
    pub owner: String,
    pub repo: String,
}

/// Build the router. Static routes take precedence over the catch-all
/// serve route.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/admin/files", get(list_files))
        .route("/admin/files/{*path}", delete(delete_file))
        .route("/api/status", get(status))
        .route("/{*path}", get(serve))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, bytes::Bytes)> = None;
    let mut custom_name = None;
    let mut path = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                file = Some((file_name, data));
            }
            "customName" => {
                custom_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?,
                );
            }
            "path" => {
                path = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?,
                );
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| AppError::Validation("no file provided".to_string()))?;

    let uploaded = state
        .service
        .upload(UploadRequest {
            file_name,
            data,
            custom_name,
            path,
        })
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        cdn_url: uploaded.cdn_url,
        filename: uploaded.filename,
        path: uploaded.path,
    }))
}

async fn serve(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, AppError> {
    let served = state.service.serve(&path).await?;
    let etag = format!("\"{}\"", served.revision);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&served.path))
        .header(header::CACHE_CONTROL, CACHE_CONTROL_VALUE)
        .header(header::ETAG, etag)
        .body(Body::from_stream(served.body))
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn list_files(State(state): State<AppState>) -> Json<FileListing> {
    let files = state
        .service
        .list()
        .await
        .into_iter()
        .map(|listed| {
            let entry = listed.entry;
            FileSummary {
                name: entry.name().to_string(),
                kind: content_type_for(&entry.path).to_string(),
                size: entry.size,
                url: entry.public_url,
                download_url: entry.download_url,
                uploaded_at: listed.uploaded_at.map(|t| t.to_rfc3339()),
                sha: entry.revision,
                path: entry.path,
            }
        })
        .collect();

    Json(FileListing { files })
}

async fn delete_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.service.delete(&path).await?;
    Ok(Json(DeleteResponse { success: true }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let cache = state.service.cache_status();
    Json(StatusResponse {
        status: "ok".to_string(),
        repo: state.repo.clone(),
        owner: state.owner.clone(),
        files_in_memory: cache.files_in_memory,
        cdn_domain: state.service.cdn_base().as_str().to_string(),
        cache_hits: cache.hits,
        cache_misses: cache.misses,
        last_resync: cache.last_resync.map(|t| t.to_rfc3339()),
    })
}

//! Media handlers: metadata lookups and cached thumbnails.

use super::InfoRequest;
use crate::api::AppState;
use crate::error::Error;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /info - Resolve metadata without downloading
#[utoipa::path(
    post,
    path = "/info",
    tag = "media",
    request_body = InfoRequest,
    responses(
        (status = 200, description = "Media metadata", body = crate::types::MediaInfo),
        (status = 400, description = "Malformed URL", body = crate::error::ApiError),
        (status = 410, description = "Item is private, deleted or blocked", body = crate::error::ApiError),
        (status = 429, description = "Rate limited or bot challenge on every strategy", body = crate::error::ApiError)
    )
)]
pub async fn get_info(State(state): State<AppState>, Json(request): Json<InfoRequest>) -> Response {
    match state.downloader.get_info(request.url.trim()).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /thumbnails/:id - Serve a cached preview
#[utoipa::path(
    get,
    path = "/thumbnails/{id}",
    tag = "media",
    params(
        ("id" = String, Path, description = "Media ID returned by POST /info")
    ),
    responses(
        (status = 200, description = "JPEG preview", content_type = "image/jpeg"),
        (status = 404, description = "No cached preview for this id", body = crate::error::ApiError)
    )
)]
pub async fn get_thumbnail(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(path) = state.downloader.thumbnail_path(&id).await else {
        return Error::NotFound(format!("thumbnail {id}")).into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "public, max-age=86400"),
            ],
            bytes,
        )
            .into_response(),
        // Swept between the lookup and the read
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("thumbnail {id}")).into_response()
        }
        Err(e) => Error::Io(e).into_response(),
    }
}

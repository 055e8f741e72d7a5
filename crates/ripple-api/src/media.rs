use std::path::Path as FsPath;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use ripple_types::api::{Claims, MediaUploadResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// 5 MB upload limit for post images
const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// POST /api/media — accepts raw image bytes (application/octet-stream),
/// saves to {media_dir}/{id}, inserts a DB row, returns the public URL.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("image data is required".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::Validation("image exceeds the 5 MB limit".into()));
    }

    let media_id = Uuid::new_v4();
    let size = bytes.len() as i64;

    save_media(&state.media_dir, &media_id.to_string(), &bytes)
        .await
        .map_err(ApiError::Backend)?;

    let db = state.clone();
    let mid = media_id.to_string();
    let owner = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.insert_media(&mid, &owner, size)).await??;

    Ok((
        StatusCode::CREATED,
        Json(MediaUploadResponse {
            media_id,
            url: format!("/media/{media_id}"),
        }),
    ))
}

/// GET /media/{media_id} — public, streams back the stored image bytes.
pub async fn download(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate the id is a UUID to prevent path traversal
    let media_id: Uuid = media_id.parse().map_err(|_| ApiError::NotFound)?;

    let db = state.clone();
    let mid = media_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_media(&mid)).await??;
    if row.is_none() {
        return Err(ApiError::NotFound);
    }

    let file_path = state.media_dir.join(media_id.to_string());
    let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
        error!("Failed to read media {}: {}", file_path.display(), e);
        ApiError::NotFound
    })?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

/// Write an uploaded blob to {dir}/{id}, creating the directory on demand.
async fn save_media(dir: &FsPath, id: &str, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(id);
    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_media_creates_dir_and_writes_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("media");
        let id = Uuid::new_v4().to_string();

        save_media(&dir, &id, b"fake-png-bytes").await.unwrap();

        let written = tokio::fs::read(dir.join(&id)).await.unwrap();
        assert_eq!(written, b"fake-png-bytes");
    }
}

//! HTTP handlers for uploading and fetching images.
//! Fetches stream from the local cache; the cache pulls from the bucket on a miss.

use crate::{
    errors::AppError,
    models::object::serving_content_type,
    services::upload_service::UploadOutcome,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use tokio_util::io::ReaderStream;

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "form_file";

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// `POST /upload` — store a JPEG from the `form_file` field and redirect home.
///
/// Dropped uploads (missing file, wrong extension) still redirect.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let mut upload: Option<(Option<String>, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.unwrap_or_default();
    match state.uploads.ingest(filename.as_deref(), data).await? {
        UploadOutcome::Stored { name, metadata } => {
            tracing::info!(name = %name, metadata = ?metadata, "upload stored");
        }
        UploadOutcome::Dropped(reason) => {
            tracing::info!(reason = ?reason, "upload dropped");
        }
    }
    Ok(Redirect::to("/"))
}

/// `GET /files/{name}` and `GET /file/{name}` — serve one image.
pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let resolved = state.cache.resolve(&name).await?;
    let length = resolved
        .file
        .metadata()
        .await
        .map_err(|err| AppError::internal(format!("reading cached `{}`: {}", name, err)))?
        .len();

    let body = Body::from_stream(ReaderStream::new(resolved.file));
    let mut response = body.into_response();
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(serving_content_type(&name)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );
    headers.insert(
        X_CACHE,
        HeaderValue::from_static(if resolved.hit { "HIT" } else { "MISS" }),
    );

    Ok(response)
}

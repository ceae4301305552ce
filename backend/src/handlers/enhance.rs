use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::models::enhance::{EnhanceAccepted, EnhanceForm, ImageUpload};
use crate::models::error::AppError;
use crate::models::status::StatusReport;
use crate::services::result_cache::ResultCache;
use crate::services::topaz::SubmitOutcome;
use crate::AppState;

/// Types the drop zone accepts; everything else is refused before any bytes
/// go to the vendor.
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/tiff", "image/webp"];

/// POST /api/v1/enhance — forwards the uploaded image to Topaz and answers
/// with a process id the client can poll, whether the vendor queued a job or
/// handed the result straight back.
pub async fn enhance(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<Json<EnhanceAccepted>, AppError> {
    state.enhance_limiter.check(addr.ip())?;

    let mut form = EnhanceForm::default();
    let mut image: Option<ImageUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
                return Err(AppError::InvalidMimeType(content_type));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to read upload: {e}")))?;
            if bytes.len() as u64 > state.config.max_upload_bytes {
                return Err(AppError::FileTooLarge(bytes.len() as u64));
            }
            image = Some(ImageUpload {
                filename,
                content_type,
                bytes,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::ValidationError(format!("Unreadable field '{name}': {e}")))?;
            form.set_field(&name, value);
        }
    }

    let image = image.ok_or(AppError::MissingImage)?;
    let params = form.validate()?;
    info!(
        preset = params.preset.as_str(),
        scale = params.scale,
        size = image.bytes.len(),
        "Enhancement submitted"
    );

    match state.topaz.submit(&params, &image).await? {
        SubmitOutcome::Queued { process_id, eta } => Ok(Json(EnhanceAccepted {
            process_id,
            eta,
            status: None,
            is_async: true,
        })),
        SubmitOutcome::Direct {
            bytes,
            content_type,
        } => {
            // Direct processing: cache the bytes under a fabricated id so
            // the client can run the same poll/download flow either way.
            let process_id = state.cache.store(bytes, &content_type);
            Ok(Json(EnhanceAccepted {
                process_id,
                eta: 0.0,
                status: Some("completed".to_string()),
                is_async: false,
            }))
        }
    }
}

/// GET /api/v1/status/{process_id} — cache hit for direct ids, vendor relay
/// (normalized) for everything else.
pub async fn status(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(process_id): Path<String>,
) -> Result<Json<StatusReport>, AppError> {
    state.relay_limiter.check(addr.ip())?;

    if ResultCache::is_direct(&process_id) {
        state.cache.get(&process_id)?;
        return Ok(Json(StatusReport::direct_done()));
    }

    Ok(Json(state.topaz.status(&process_id).await?))
}

/// GET /api/v1/download/{process_id} — serves cached bytes for direct ids;
/// otherwise resolves the vendor's presigned URL and streams the body
/// through without buffering it.
pub async fn download(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(process_id): Path<String>,
) -> Result<Response, AppError> {
    state.relay_limiter.check(addr.ip())?;

    if ResultCache::is_direct(&process_id) {
        let cached = state.cache.get(&process_id)?;
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, cached.content_type.clone()),
                (header::CONTENT_LENGTH, cached.bytes.len().to_string()),
                (header::ETAG, format!("\"{}\"", cached.checksum)),
            ],
            cached.bytes,
        )
            .into_response());
    }

    let ticket = state.topaz.resolve_download(&process_id).await?;
    let upstream = state.topaz.fetch_result(&ticket).await?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let content_length = upstream.content_length();

    info!(process_id = %process_id, content_type = %content_type, "Relaying enhanced result");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {e}")))
}

//! HTTP handlers for the movie catalog API.
//!
//! Mutating handlers take [`Owner`] as their first argument so the owner
//! check runs before the body is read and before any storage call.

use crate::{
    auth::Owner,
    errors::AppError,
    models::movie::{
        DeleteResponse, MovieEntry, PresignRequest, PresignResponse, RegisterRequest,
        RegisterResponse, UploadResponse,
    },
    services::gateway::GatewayError,
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "movie";

/// `GET /api/movies`: the public catalog.
pub async fn list_movies(State(state): State<AppState>) -> Result<Json<Vec<MovieEntry>>, AppError> {
    Ok(Json(state.gateway.list().await?))
}

/// `POST /api/presign`: presigned direct-to-bucket upload target.
pub async fn presign_upload(
    _owner: Owner,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PresignResponse>, AppError> {
    let req: PresignRequest = parse_json(&body)?;
    Ok(Json(state.gateway.presign(req).await?))
}

/// `POST /api/register`: record an uploaded object in the catalog.
pub async fn register_movie(
    _owner: Owner,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, AppError> {
    let req: RegisterRequest = parse_json(&body)?;
    let entry = state.gateway.register(req).await?;
    Ok(Json(RegisterResponse {
        success: true,
        entry,
    }))
}

/// `DELETE /api/movies/{name}`: remove the object and its catalog entry.
pub async fn delete_movie(
    _owner: Owner,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.gateway.delete(&name).await?;
    Ok(Json(DeleteResponse { success: true }))
}

/// `POST /api/upload`: multipart upload straight into the upload directory.
///
/// The `movie` field is streamed to disk; it is never buffered whole.
pub async fn upload_movie(
    _owner: Owner,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let body_limit_hit = AtomicBool::new(false);
        let stream = field.map_err(|err| {
            if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                body_limit_hit.store(true, Ordering::Relaxed);
            }
            io::Error::other(err.body_text())
        });
        let result = state
            .gateway
            .upload(filename.as_deref(), stream, state.max_upload_bytes)
            .await;
        return match result {
            Ok(uploaded) => Ok(Json(uploaded)),
            // the route body limit tripped before the field's own byte count did
            Err(_) if body_limit_hit.load(Ordering::Relaxed) => Err(GatewayError::PayloadTooLarge {
                limit: state.max_upload_bytes,
            }
            .into()),
            Err(err) => Err(err.into()),
        };
    }
    Err(AppError::bad_request("No file uploaded"))
}

/// Lenient JSON body parsing: an empty body reads as the default request.
fn parse_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON body: {}", err)))
}

//! Defines the HTTP surface of the movie host.
//!
//! ## Structure
//! - **Public**
//!   - `GET    /api/movies`         list the catalog
//!   - `GET    /uploads/{*file}`    stream a disk-mode upload (disk mode only)
//!   - `GET    /healthz`, `/readyz`
//!
//! - **Owner only** (`x-owner-hash` header)
//!   - `POST   /api/presign`        presigned PUT target in the bucket
//!   - `POST   /api/register`       record an uploaded object
//!   - `DELETE /api/movies/{name}`  delete by name or key
//!   - `POST   /api/upload`         multipart upload to disk

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        movie_handlers::{delete_movie, list_movies, presign_upload, register_movie, upload_movie},
    },
    services::storage::Backend,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Room for multipart framing on top of the file itself, so the streamed
/// byte count trips before the raw body limit does.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Build the full application router.
pub fn routes(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/movies", get(list_movies))
        .route("/api/movies/{name}", delete(delete_movie))
        .route("/api/presign", post(presign_upload))
        .route("/api/register", post(register_movie))
        .route(
            "/api/upload",
            post(upload_movie).layer(DefaultBodyLimit::max(upload_limit)),
        );

    if let Backend::Disk(disk) = state.gateway.backend() {
        router = router.nest_service("/uploads", ServeDir::new(disk.root()));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

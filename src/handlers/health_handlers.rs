//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that exercises the active storage backend

use crate::services::keys;
use crate::services::storage::{BackendKind, StorageAdapter};
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness check. Always 200 OK with a small JSON body, no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Disk mode performs a write/read/delete round trip in the upload
/// directory. Bucket mode lists the metadata prefix.
///
/// HTTP 200 when the check passes, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.gateway.backend();
    let store = backend.adapter();
    let check = match backend.kind() {
        BackendKind::Disk => disk_round_trip(store.as_ref()).await,
        BackendKind::Bucket => match store.list_by_prefix(keys::META_PREFIX).await {
            Ok(_) => CheckStatus::ok(),
            Err(e) => CheckStatus::failed(format!("could not list metadata: {}", e)),
        },
    };

    let overall_ok = check.ok;
    let mut checks = HashMap::new();
    checks.insert("storage", check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        backend: backend.kind().to_string(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn disk_round_trip(store: &dyn StorageAdapter) -> CheckStatus {
    let marker = format!(".readyz-{}", Uuid::new_v4());
    if let Err(e) = store
        .put(&marker, Bytes::from_static(b"readyz"), "text/plain")
        .await
    {
        return CheckStatus::failed(format!("could not write readiness marker: {}", e));
    }
    let read = store.get(&marker).await;
    // best-effort cleanup; a failure here is reported but not fatal
    let cleanup = store.delete(&marker).await.err();
    match read {
        Ok(bytes) if bytes.as_ref() == b"readyz" => CheckStatus {
            ok: true,
            error: cleanup.map(|e| format!("could not remove readiness marker: {}", e)),
        },
        Ok(_) => CheckStatus::failed("readiness marker content mismatch".into()),
        Err(e) => CheckStatus::failed(format!("could not read readiness marker: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    backend: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

//! Shared state handed to every handler.

use crate::auth::OwnerGuard;
use crate::services::gateway::MediaGateway;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<MediaGateway>,
    pub owner: OwnerGuard,
    /// Cap on a single direct upload body.
    pub max_upload_bytes: u64,
}

//! Owner guard.
//!
//! A single shared secret gates every mutating endpoint. Requests carry it
//! in the `x-owner-hash` header; handlers take an [`Owner`] argument first,
//! so a rejected request never reaches the body extractors or storage.

use crate::errors::AppError;
use crate::services::gateway::GatewayError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the owner credential.
pub const OWNER_HEADER: &str = "x-owner-hash";

#[derive(Clone)]
pub struct OwnerGuard {
    secret: Option<Arc<str>>,
}

impl OwnerGuard {
    /// With no secret configured every check fails.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Arc::from),
        }
    }

    pub fn verify(&self, provided: Option<&str>) -> Result<(), GatewayError> {
        match (self.secret.as_deref(), provided) {
            (Some(secret), Some(candidate))
                if bool::from(secret.as_bytes().ct_eq(candidate.as_bytes())) =>
            {
                Ok(())
            }
            _ => Err(GatewayError::Unauthorized),
        }
    }
}

/// Proof that the request carried the owner credential.
#[derive(Debug)]
pub struct Owner;

impl FromRequestParts<AppState> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok());
        state.owner.verify(provided).map_err(|err| {
            tracing::warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                credential_present = provided.is_some(),
                "rejected owner request"
            );
            AppError::from(err)
        })?;
        Ok(Owner)
    }
}

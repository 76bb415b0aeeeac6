//! Owner session for the publishing client.

use crate::auth::OWNER_HEADER;
use reqwest::RequestBuilder;
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of the owner passphrase; the server's
/// `OWNER_HASH` holds this value.
pub fn hash_passphrase(passphrase: &str) -> String {
    hex::encode(Sha256::digest(passphrase.as_bytes()))
}

/// Server address plus the optional owner credential.
///
/// Starts signed out. Only a signed-in session attaches the owner header.
#[derive(Clone)]
pub struct OwnerSession {
    server_url: String,
    secret: Option<String>,
}

impl OwnerSession {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            secret: None,
        }
    }

    /// Enter owner mode with the plain passphrase; only its hash is kept.
    pub fn sign_in(&mut self, passphrase: &str) {
        self.secret = Some(hash_passphrase(passphrase));
    }

    /// Enter owner mode with an already hashed credential.
    pub fn sign_in_with_hash(&mut self, hash: impl Into<String>) {
        self.secret = Some(hash.into());
    }

    pub fn sign_out(&mut self) {
        self.secret = None;
    }

    pub fn is_owner(&self) -> bool {
        self.secret.is_some()
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Attach the owner header when signed in.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret {
            Some(secret) => request.header(OWNER_HEADER, secret),
            None => request,
        }
    }
}

impl std::fmt::Debug for OwnerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerSession")
            .field("server_url", &self.server_url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

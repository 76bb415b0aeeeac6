//! Publishing staged videos to a running server.
//!
//! Publish first asks for a presigned bucket upload. When the server has no
//! bucket (any non-success other than 401/403) the bytes go through the
//! server's multipart upload endpoint instead.

use crate::client::session::OwnerSession;
use crate::client::staging::StagedVideo;
use crate::models::movie::{MovieEntry, PresignRequest, PresignResponse, RegisterRequest, UploadResponse};
use crate::services::keys;
use reqwest::{
    Response, StatusCode, Url,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("owner credential missing or rejected")]
    Unauthorized,
    #[error("{operation} failed with HTTP {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("invalid server URL `{0}`")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no staged video with id {0}")]
    NotStaged(String),
    #[error("transcode failed: {0}")]
    Transcode(String),
}

/// Where a published video ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub name: String,
    pub url: String,
}

pub struct Publisher {
    http: reqwest::Client,
    base: Url,
    session: OwnerSession,
}

impl Publisher {
    pub fn new(session: OwnerSession) -> Result<Self, ClientError> {
        let mut raw = session.server_url().trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base =
            Url::parse(&raw).map_err(|_| ClientError::InvalidUrl(session.server_url().to_string()))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("movie-host/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            session,
        })
    }

    pub fn session(&self) -> &OwnerSession {
        &self.session
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|_| ClientError::InvalidUrl(format!("{}{}", self.base, path)))
    }

    /// Publish a staged video and return its public location.
    pub async fn publish(&self, video: &StagedVideo) -> Result<Published, ClientError> {
        let presign = self
            .session
            .authorize(self.http.post(self.endpoint("api/presign")?))
            .json(&PresignRequest {
                filename: Some(video.name.clone()),
                content_type: Some(video.content_type.clone()),
            })
            .send()
            .await?;

        match presign.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized),
            status if status.is_success() => {
                let target: PresignResponse = presign.json().await?;
                self.upload_presigned(video, target).await
            }
            status => {
                tracing::info!(
                    status = status.as_u16(),
                    "presign unavailable; uploading through the server"
                );
                self.upload_direct(video).await
            }
        }
    }

    async fn upload_presigned(
        &self,
        video: &StagedVideo,
        target: PresignResponse,
    ) -> Result<Published, ClientError> {
        // the owner header is for the server only, never the bucket
        let put = self
            .http
            .put(&target.upload_url)
            .header(CONTENT_TYPE, &video.content_type)
            .body(video.bytes.clone())
            .send()
            .await?;
        if !put.status().is_success() {
            return Err(ClientError::Status {
                operation: "storage upload",
                status: put.status().as_u16(),
            });
        }
        tracing::debug!(key = %target.key, size_bytes = video.bytes.len(), "uploaded to bucket");

        let register = self
            .session
            .authorize(self.http.post(self.endpoint("api/register")?))
            .json(&RegisterRequest {
                key: Some(target.key),
                name: Some(video.name.clone()),
                url: Some(target.public_url.clone()),
            })
            .send()
            .await?;
        check(register, "register")?;

        Ok(Published {
            name: video.name.clone(),
            url: target.public_url,
        })
    }

    async fn upload_direct(&self, video: &StagedVideo) -> Result<Published, ClientError> {
        let part = Part::stream_with_length(video.bytes.clone(), video.bytes.len() as u64)
            .file_name(video.name.clone())
            .mime_str(&video.content_type)?;
        let form = Form::new().part("movie", part);

        let resp = self
            .session
            .authorize(self.http.post(self.endpoint("api/upload")?))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = check(resp, "upload")?.json().await?;
        Ok(Published {
            name: uploaded.name,
            url: uploaded.url,
        })
    }

    /// The server's public catalog.
    pub async fn list(&self) -> Result<Vec<MovieEntry>, ClientError> {
        let resp = self.http.get(self.endpoint("api/movies")?).send().await?;
        Ok(check(resp, "list")?.json().await?)
    }

    /// Delete a published video by name or key.
    pub async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let path = format!("api/movies/{}", keys::encode_component(name));
        let resp = self
            .session
            .authorize(self.http.delete(self.endpoint(&path)?))
            .send()
            .await?;
        check(resp, "delete")?;
        Ok(())
    }
}

fn check(resp: Response, operation: &'static str) -> Result<Response, ClientError> {
    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized),
        status if status.is_success() => Ok(resp),
        status => Err(ClientError::Status {
            operation,
            status: status.as_u16(),
        }),
    }
}

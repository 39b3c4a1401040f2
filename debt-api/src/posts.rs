//! Reqwest-backed client for the external post-listing service.
//!
//! Transport concerns only: request timeout, status mapping and JSON decoding.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::Client;

use crate::config::UpstreamConfig;
use crate::models::{AppError, Post};

#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Post>, AppError>;
    async fn fetch_by_id(&self, id: i64) -> Result<Post, AppError>;
}

pub struct HttpPostSource {
    client: Client,
    base_url: String,
}

impl HttpPostSource {
    /// Build a client with an explicit request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Result<Self, AppError> {
        Self::new(&cfg.base_url, Duration::from_secs(cfg.timeout_secs))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%url, status = status.as_u16(), "upstream returned an error");
            return Err(map_status_error(status.as_u16(), body));
        }
        let payload = response.json::<T>().await?;
        Ok(payload)
    }
}

/// Forward the upstream status when it is a valid error status, otherwise report a bad gateway.
pub fn map_status_error(status: u16, body: String) -> AppError {
    let status = StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    AppError::Upstream { status, detail: body }
}

#[async_trait]
impl PostSource for HttpPostSource {
    async fn fetch_all(&self) -> Result<Vec<Post>, AppError> {
        let posts: Vec<Post> = self.get_json("/posts").await?;
        if posts.is_empty() {
            return Err(AppError::NotFound("no posts found".into()));
        }
        Ok(posts)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Post, AppError> {
        self.get_json(&format!("/posts/{id}")).await
    }
}

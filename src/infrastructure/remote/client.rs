//! Hosted backend HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use tracing::{debug, warn};

use super::dto::{ErrorResponse, UploadResponse};
use crate::domain::entities::{ApiKey, ResourceId, SizeVariant, TargetRef};
use crate::domain::errors::RemoteError;
use crate::domain::ports::{BlobRef, FetchedImage, ImageSourcePort, RemoteRecordPort};
use crate::infrastructure::config::RemoteConfig;

const USER_AGENT: &str = concat!("fieldsync/", env!("CARGO_PKG_VERSION"));
const UPSERT_HEADER: &str = "x-upsert";
const API_KEY_HEADER: &str = "apikey";

/// Storage + REST client for the hosted backend.
pub struct HttpRemote {
    client: Client,
    base_url: String,
    bucket: String,
    api_key: Option<ApiKey>,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    /// Creates a client from configuration.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(config: &RemoteConfig, api_key: Option<ApiKey>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
            .build()
            .map_err(|e| RemoteError::transient(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            api_key,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header(API_KEY_HEADER, key.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {}", key.as_str())),
            None => request,
        }
    }

    fn object_url(&self, path: &ResourceId) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.as_str()
        )
    }

    fn authenticated_object_url(&self, path: &ResourceId) -> String {
        if is_absolute_url(path) {
            return path.as_str().to_string();
        }
        format!(
            "{}/storage/v1/object/authenticated/{}/{}",
            self.base_url,
            self.bucket,
            path.as_str()
        )
    }

    fn render_url(&self, path: &ResourceId) -> String {
        format!(
            "{}/storage/v1/render/image/authenticated/{}/{}",
            self.base_url,
            self.bucket,
            path.as_str()
        )
    }

    fn record_url(&self, target: &TargetRef) -> String {
        format!("{}/rest/v1/{}", self.base_url, target.entity)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            warn!(error = %e, "Backend request failed");
            map_transport_error(&e)
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(status, response).await)
        }
    }

    async fn fetch(&self, url: &str, request: RequestBuilder) -> Result<FetchedImage, RemoteError> {
        let response = self.send(request).await?;
        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| guess_mime(url).to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transient(format!("failed to read body: {e}")))?;

        debug!(url = %url, size = bytes.len(), mime = %mime_type, "Fetched image");
        Ok(FetchedImage { bytes, mime_type })
    }
}

#[async_trait]
impl RemoteRecordPort for HttpRemote {
    async fn upload_blob(
        &self,
        path: &ResourceId,
        payload: Bytes,
        mime_type: &str,
    ) -> Result<BlobRef, RemoteError> {
        let url = self.object_url(path);
        debug!(path = %path, size = payload.len(), "Uploading blob");

        let response = self
            .send(
                self.client
                    .post(&url)
                    .header(UPSERT_HEADER, "true")
                    .header(header::CONTENT_TYPE, mime_type)
                    .body(payload),
            )
            .await?;

        if let Ok(ack) = response.json::<UploadResponse>().await {
            debug!(key = ?ack.key, "Blob stored");
        }

        Ok(BlobRef::new(path.clone()))
    }

    async fn attach_upload_to_target(
        &self,
        target: &TargetRef,
        blob: &BlobRef,
    ) -> Result<(), RemoteError> {
        let mut body = serde_json::Map::new();
        body.insert(
            target.slot.clone(),
            serde_json::Value::String(blob.path.as_str().to_string()),
        );

        let response = self
            .send(
                self.client
                    .patch(self.record_url(target))
                    .query(&[("id", format!("eq.{}", target.record_id))])
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| RemoteError::transient(format!("failed to parse response: {e}")))?;

        if rows.is_empty() {
            return Err(RemoteError::permanent(
                StatusCode::NOT_FOUND.as_u16(),
                format!("target record {target} no longer exists"),
            ));
        }

        debug!(target = %target, blob = %blob, "Upload attached");
        Ok(())
    }
}

#[async_trait]
impl ImageSourcePort for HttpRemote {
    async fn fetch_thumbnail(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
    ) -> Result<FetchedImage, RemoteError> {
        let Some(edge) = variant.max_edge() else {
            return self.fetch_full(resource_id).await;
        };
        if is_absolute_url(resource_id) {
            return Err(RemoteError::permanent(
                StatusCode::NOT_FOUND.as_u16(),
                "no thumbnail endpoint for external images",
            ));
        }

        let url = self.render_url(resource_id);
        let request = self.client.get(&url).query(&[
            ("width", edge.to_string()),
            ("height", edge.to_string()),
            ("resize", "contain".to_string()),
        ]);
        self.fetch(&url, request).await
    }

    async fn fetch_full(&self, resource_id: &ResourceId) -> Result<FetchedImage, RemoteError> {
        let url = self.authenticated_object_url(resource_id);
        let request = self.client.get(&url);
        self.fetch(&url, request).await
    }
}

fn is_absolute_url(resource_id: &ResourceId) -> bool {
    let raw = resource_id.as_str();
    raw.starts_with("https://") || raw.starts_with("http://")
}

fn map_transport_error(error: &reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::transient("request timed out")
    } else if error.is_connect() {
        RemoteError::transient("failed to connect to backend")
    } else {
        RemoteError::transient(error.to_string())
    }
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> RemoteError {
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.describe().unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    };
    RemoteError::from_status(status.as_u16(), message)
}

/// MIME type implied by a path's extension.
fn guess_mime(path: &str) -> &'static str {
    let path = path.split('?').next().unwrap_or(path).to_ascii_lowercase();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

//! Object storage uploads with retry

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{IngestConfig, StorageConfig};

/// Exponential backoff between upload attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base · 2^(attempt-1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Timeouts, throttling and server errors are worth another attempt; other
/// client errors will fail the same way again
pub fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// A failed attempt, and whether repeating it could succeed
struct AttemptError {
    error: anyhow::Error,
    retryable: bool,
}

impl AttemptError {
    fn transient(error: anyhow::Error) -> Self {
        Self { error, retryable: true }
    }
}

/// Content type from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Client for a storage API speaking `POST /storage/v1/object/<bucket>/<key>`
pub struct ObjectStorageClient {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    service_key: String,
    retry: RetryPolicy,
}

impl ObjectStorageClient {
    pub fn new(endpoint: &str, bucket: &str, service_key: &str, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("chartqa-annotate-ingest")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
            retry,
        })
    }

    /// Client from config; `None` when no endpoint or key is configured
    pub fn from_config(storage: &StorageConfig, ingest: &IngestConfig) -> Result<Option<Self>> {
        match (&storage.endpoint, &storage.service_key) {
            (Some(endpoint), Some(key)) => Ok(Some(Self::new(
                endpoint,
                &storage.bucket,
                key,
                RetryPolicy::from_config(ingest),
            )?)),
            _ => Ok(None),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.endpoint,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    /// Upload `local` as `key`, overwriting any existing object.
    ///
    /// Network failures and retryable statuses are retried with backoff. A
    /// permanent rejection, or the last error once attempts run out, is returned.
    pub async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read {}", local.display()))?;
        let content_type = content_type_for(local);

        let mut attempt = 1;
        loop {
            match self.try_upload(key, body.clone(), content_type).await {
                Ok(()) => {
                    debug!("Uploaded {} ({} bytes)", key, body.len());
                    return Ok(());
                }
                Err(AttemptError { error, retryable: false }) => {
                    warn!("[upload rejected] {}: {}", key, error);
                    return Err(error.context(format!("Upload of {} rejected", key)));
                }
                Err(AttemptError { error, .. }) => {
                    warn!(
                        "[upload retry {}/{}] {}: {}",
                        attempt, self.retry.max_attempts, key, error
                    );
                    if attempt >= self.retry.max_attempts {
                        return Err(error.context(format!("Upload of {} failed", key)));
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), AttemptError> {
        let response = self
            .http
            .post(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .context("Storage request failed")
            .map_err(AttemptError::transient)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AttemptError {
                error: anyhow!("storage returned {}: {}", status, text),
                retryable: is_retryable(status),
            });
        }
        Ok(())
    }
}

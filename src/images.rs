//! Image URL resolution
//!
//! Records carry an opaque image ref. Absolute URLs pass through; anything
//! else is a storage key resolved against object storage (public or signed
//! link) or, without object storage, against the local `/images` route.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::StorageConfig;

/// Local route serving the image root
pub const LOCAL_IMAGE_ROUTE: &str = "/images";

/// Claims of a signed object link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlClaims {
    /// `<bucket>/<key>`
    pub url: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    endpoint: Option<String>,
    bucket: String,
    public: bool,
    ttl_secs: i64,
    signing_secret: Option<String>,
}

impl ImageResolver {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            endpoint: storage
                .endpoint
                .as_deref()
                .map(|e| e.trim_end_matches('/').to_string())
                .filter(|e| !e.is_empty()),
            bucket: storage.bucket.clone(),
            public: storage.public,
            ttl_secs: storage.signed_url_ttl_secs,
            signing_secret: storage.signing_secret.clone(),
        }
    }

    /// Resolver that only serves the local image root
    pub fn local() -> Self {
        Self::new(&StorageConfig::default())
    }

    pub fn is_remote(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Resolve an image ref to a URL the browser can load
    pub fn resolve(&self, image_ref: &str) -> Option<String> {
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            return None;
        }
        if is_absolute_url(image_ref) {
            return Some(image_ref.to_string());
        }

        let key = image_ref.trim_start_matches('/');
        if self.endpoint.is_none() {
            return Some(format!("{}/{}", LOCAL_IMAGE_ROUTE, key));
        }
        if self.public {
            return self.public_url(key);
        }
        match self.signed_url(key) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Falling back to public link for {}: {}", key, e);
                self.public_url(key)
            }
        }
    }

    /// Public object link for `key`; `None` without object storage
    pub fn public_url(&self, key: &str) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            format!(
                "{}/storage/v1/object/public/{}/{}",
                endpoint,
                self.bucket,
                key.trim_start_matches('/')
            )
        })
    }

    /// Time-limited link signed with the storage secret
    pub fn signed_url(&self, key: &str) -> anyhow::Result<String> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("object storage endpoint not configured"))?;
        let secret = self
            .signing_secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("signing secret not configured"))?;

        let key = key.trim_start_matches('/');
        let now = Utc::now().timestamp();
        let claims = SignedUrlClaims {
            url: format!("{}/{}", self.bucket, key),
            iat: now,
            exp: now + self.ttl_secs,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;

        Ok(format!(
            "{}/storage/v1/object/sign/{}/{}?token={}",
            endpoint, self.bucket, key, token
        ))
    }
}

fn is_absolute_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
}

//! Remote blob store access with bounded retry.
//!
//! Session bundles are distributed through an HTTP-addressable blob
//! store. [`HttpBlobStore`] fetches a bundle by identifier, retrying a
//! failed request up to two more times with short backoff before the
//! error is propagated to the bootstrap layer.

use std::time::Duration;

use async_trait::async_trait;

/// Delays between fetch attempts (three attempts total).
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single fetch attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for blob fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The blob store returned a non-2xx status code.
    #[error("Blob store returned HTTP {0}")]
    HttpStatus(u16),
}

/// A source of remotely stored blobs, keyed by identifier.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the blob for `id`, or fail after the store's own retries.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches blobs over HTTP from a fixed base URL.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    /// Create a store targeting `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// One GET of `{base_url}/{id}`, no retry.
    async fn fetch_once(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.fetch_once(id).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Blob fetch attempt failed, retrying",
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.fetch_once(id).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Blob fetch failed after all retries");
                Err(e)
            }
        }
    }
}

//! The network side of the resource cache.

use crate::cache::error::CacheError;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{info, warn};
use reqwest::Client;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// A response body that is read incrementally.
pub type ResourceReader = Pin<Box<dyn AsyncRead + Send>>;

/// Opens remote resources by URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts fetching `url` and returns its body as a stream.
    async fn open(&self, url: &str) -> Result<ResourceReader, CacheError>;
}

/// [`Transport`] over HTTP(S) using `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<ResourceReader, CacheError> {
        info!("Downloading {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::NetworkRequest(url.to_string(), e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP error for {}: {}", url, status);
            return Err(CacheError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::pin(StreamReader::new(stream)))
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to delete cache file '{0}'")]
    CacheDeletion(PathBuf, #[source] std::io::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    // Stream errors while copying the response body to disk
    #[error("Download of {0} failed")]
    DownloadIo(String, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl CacheError {
    /// True for a 404 response; callers may treat those as a missing item rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CacheError::HttpStatus { status, .. } if *status == reqwest::StatusCode::NOT_FOUND
        )
    }
}

//! An in-memory [`Transport`], for offline runs and tests.

use crate::cache::error::CacheError;
use crate::cache::transport::{ResourceReader, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

/// Serves a fixed set of resources from memory and counts how often each one is requested.
/// Unknown URLs answer with a 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    resources: HashMap<String, Vec<u8>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(url.into(), body.into());
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|counts| counts.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<ResourceReader, CacheError> {
        if let Ok(mut counts) = self.requests.lock() {
            *counts.entry(url.to_string()).or_insert(0) += 1;
        }
        match self.resources.get(url) {
            Some(body) => Ok(Box::pin(Cursor::new(body.clone()))),
            None => Err(CacheError::HttpStatus {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            }),
        }
    }
}

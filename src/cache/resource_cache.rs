use crate::cache::error::CacheError;
use crate::cache::transport::Transport;
use crate::utils::ensure_dir_exists;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// On-disk, read-through cache of remote resources.
///
/// Every resource key (normally a URL) maps to a file named after the SHA-256 digest of the key.
/// The first [`fetch`](ResourceCache::fetch) of a key downloads it through the [`Transport`];
/// later fetches are served from disk without touching the network.
pub struct ResourceCache {
    cache_dir: PathBuf,
    transport: Arc<dyn Transport>,
}

fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

impl ResourceCache {
    /// The directory is created lazily, on the first download.
    pub fn new(cache_dir: &Path, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            transport,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Location of the local copy of `key`, whether or not it exists yet.
    pub fn cached_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(hash_key(key))
    }

    pub async fn contains(&self, key: &str) -> bool {
        fs::metadata(self.cached_path(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Returns the bytes of `key`, downloading them first on a cache miss.
    ///
    /// # Errors
    ///
    /// Network and HTTP failures during a miss are returned as-is; nothing is retried.
    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.cached_path(key);
        if self.contains(key).await {
            debug!("Cache hit for {} at {:?}", key, path);
        } else {
            warn!("Cache miss for {}. Downloading.", key);
            let written = self.download(key, &path).await?;
            info!("Cached {} bytes for {} at {:?}", written, key, path);
        }
        fs::read(&path)
            .await
            .map_err(|e| CacheError::CacheRead(path, e))
    }

    /// Downloads `key`, returns its bytes and removes the local copy straight away.
    ///
    /// Meant for large one-shot resources that should not pile up on disk.
    pub async fn fetch_uncached(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.cached_path(key);
        self.download(key, &path).await?;
        let bytes = fs::read(&path)
            .await
            .map_err(|e| CacheError::CacheRead(path.clone(), e))?;
        debug!("Removing cached instance for {}", key);
        fs::remove_file(&path)
            .await
            .map_err(|e| CacheError::CacheDeletion(path, e))?;
        Ok(bytes)
    }

    /// Drops the local copy of `key` so the next fetch downloads it again.
    /// Returns whether there was anything to remove.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.cached_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Invalidated cached {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::CacheDeletion(path, e)),
        }
    }

    /// Streams the resource into a temporary file next to `path`, then moves it into place so a
    /// failed download never leaves a truncated entry behind.
    async fn download(&self, key: &str, path: &Path) -> Result<u64, CacheError> {
        ensure_dir_exists(&self.cache_dir)
            .await
            .map_err(|e| CacheError::CacheDirCreation(self.cache_dir.clone(), e))?;

        let mut reader = self.transport.open(key).await?;

        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| CacheError::CacheWrite(self.cache_dir.clone(), e))?;
        let handle = temp
            .reopen()
            .map_err(|e| CacheError::CacheWrite(temp.path().to_path_buf(), e))?;
        let mut file = fs::File::from_std(handle);

        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| CacheError::DownloadIo(key.to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| CacheError::CacheWrite(temp.path().to_path_buf(), e))?;
        drop(file);

        temp.persist(path)
            .map_err(|e| CacheError::CacheWrite(path.to_path_buf(), e.error))?;
        Ok(written)
    }
}

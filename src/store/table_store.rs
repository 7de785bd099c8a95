use crate::store::error::StoreError;
use crate::utils::ensure_dir_exists;
use async_trait::async_trait;
use log::{info, warn};
use polars::prelude::*;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::{fs, task};

/// Named, persisted tables that are derived once and then reused across runs.
///
/// A table stored under a name is treated as final: it is never recomputed while present.
#[async_trait]
pub trait TableRepository: Send + Sync {
    /// Loads a previously derived table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `name` has never been stored.
    async fn load(&self, name: &str) -> Result<DataFrame, StoreError>;

    /// Persists `table` under `name`, replacing any previous table of that name.
    async fn save(&self, name: &str, table: &DataFrame) -> Result<(), StoreError>;

    /// Loads `name`, or runs `producer`, stores its table under `name` and returns it.
    ///
    /// `producer` is not invoked when the table already exists.
    async fn load_or_compute<F, Fut, E>(&self, name: &str, producer: F) -> Result<DataFrame, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<DataFrame, E>> + Send,
        E: From<StoreError> + Send,
    {
        match self.load(name).await {
            Ok(table) => return Ok(table),
            Err(StoreError::NotFound(_)) => {
                warn!("Table '{}' not in store. Deriving it.", name);
            }
            Err(e) => return Err(e.into()),
        }
        let table = producer().await?;
        self.save(name, &table).await?;
        Ok(table)
    }
}

/// [`TableRepository`] keeping one Parquet file per table in a directory.
#[derive(Debug, Clone)]
pub struct ParquetTableStore {
    store_dir: PathBuf,
}

impl ParquetTableStore {
    /// The directory is created on the first save.
    pub fn new(store_dir: &Path) -> Self {
        Self {
            store_dir: store_dir.to_path_buf(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.store_dir.join(format!("{name}.parquet"))
    }

    pub async fn contains(&self, name: &str) -> bool {
        fs::metadata(self.table_path(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TableRepository for ParquetTableStore {
    async fn load(&self, name: &str) -> Result<DataFrame, StoreError> {
        let path = self.table_path(name);
        if !self.contains(name).await {
            return Err(StoreError::NotFound(name.to_string()));
        }
        info!("Loading table '{}' from {:?}", name, path);

        task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)
                .map_err(|e| StoreError::ParquetReadIo(path.clone(), e))?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| StoreError::ParquetReadPolars(path, e))
        })
        .await?
    }

    async fn save(&self, name: &str, table: &DataFrame) -> Result<(), StoreError> {
        ensure_dir_exists(&self.store_dir)
            .await
            .map_err(|e| StoreError::StoreDirCreation(self.store_dir.clone(), e))?;

        let path = self.table_path(name);
        let mut df = table.clone();
        let target = path.clone();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&target)
                .map_err(|e| StoreError::ParquetWriteIo(target.clone(), e))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| StoreError::ParquetWritePolars(target, e))?;
            Ok::<(), StoreError>(())
        })
        .await??;
        info!("Stored table '{}' ({} rows) at {:?}", name, table.height(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> DataFrame {
        df!(
            "building_code" => &["A", "B"],
            "value" => &[1.0, 2.5]
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        assert!(matches!(
            store.load("nothing").await,
            Err(StoreError::NotFound(name)) if name == "nothing"
        ));
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(&dir.path().join("store"));
        store.save("sample", &sample()).await?;
        let loaded = store.load("sample").await?;
        assert!(loaded.equals(&sample()));
        Ok(())
    }

    #[tokio::test]
    async fn test_producer_runs_once() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        let calls = AtomicUsize::new(0);

        let first = store
            .load_or_compute("sample", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(sample())
            })
            .await?;
        let second = store
            .load_or_compute("sample", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(sample())
            })
            .await?;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.equals(&second));
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_table_wins_over_producer() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        store.save("sample", &sample()).await?;

        let loaded = store
            .load_or_compute("sample", || async {
                Ok::<_, StoreError>(df!("other" => &[0i64]).unwrap())
            })
            .await?;
        assert!(loaded.equals(&sample()));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_producer_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());

        let result = store
            .load_or_compute("broken", || async {
                Err::<DataFrame, _>(StoreError::NotFound("upstream".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!store.contains("broken").await);
    }
}

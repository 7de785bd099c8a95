use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Table '{0}' has not been derived yet")]
    NotFound(String),

    #[error("Failed to create store directory '{0}'")]
    StoreDirCreation(PathBuf, #[source] std::io::Error),

    #[error("I/O error reading table file '{0}'")]
    ParquetReadIo(PathBuf, #[source] std::io::Error),
    #[error("Decoding error reading table file '{0}'")]
    ParquetReadPolars(PathBuf, #[source] PolarsError),

    #[error("I/O error writing table file '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),
    #[error("Encoding error writing table file '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

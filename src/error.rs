use crate::cache::error::CacheError;
use crate::config::ConfigError;
use crate::model::error::ModelError;
use crate::sources::error::SourceError;
use crate::store::error::StoreError;
use crate::table::TableError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine default directory")]
    DirResolution(#[source] std::io::Error),

    #[error("Building '{0}' has no heating model")]
    UnknownBuilding(String),

    #[error("No seasonal anomaly report at index {0}")]
    NoAnomalyReport(isize),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

/// Invalid arguments handed to the pipeline. These are never retried or skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "reporting group should be one of Electricity, Heat, Water, DistrictCooling, got '{0}'"
    )]
    ReportingGroup(String),

    #[error("'{0}' is not an ISO month (expected YYYY-MM or YYYY-MM-DD)")]
    Month(String),
}

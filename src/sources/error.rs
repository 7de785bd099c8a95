use crate::cache::error::CacheError;
use crate::error::ValidationError;
use crate::table::TableError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to parse JSON from {url}")]
    JsonParse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse weather observations for station {station} ({year})")]
    XmlParse {
        station: u32,
        year: i32,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Resource {0} is not valid UTF-8 text")]
    NotText(String),

    #[error("Failed to build request URL from '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to decode forecast map {file}")]
    ImageDecode {
        file: String,
        #[source]
        source: image::ImageError,
    },

    #[error(
        "Forecast map {file} is {found_width}x{found_height}, \
         expected {expected_width}x{expected_height}; the map layout must be re-calibrated"
    )]
    MapLayout {
        file: String,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("Color {color:?} in forecast map {file} is not in the calibration table")]
    Calibration { file: String, color: [u8; 3] },

    #[error("Seasonal anomaly index lists lead month {lead} for {issued}, expected 1..=7")]
    LeadMonth { issued: NaiveDate, lead: u32 },

    #[error("Seasonal anomaly index entry pattern is invalid")]
    IndexPattern,

    #[error("Forecast map worker pool was closed")]
    WorkerPool(#[from] tokio::sync::AcquireError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed to write diagnostic copy to '{0}'")]
    DiagnosticWrite(std::path::PathBuf, #[source] std::io::Error),
}

impl SourceError {
    /// True when the remote service reported the requested item as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Cache(e) if e.is_not_found())
    }
}

//! Adapters that turn raw remote resources into normalized tables.

pub mod anomalies;
pub mod calibration;
pub mod energy;
pub mod error;
pub mod properties;
pub mod weather;

use crate::sources::error::SourceError;
use reqwest::Url;
use serde::de::DeserializeOwned;

pub(crate) fn parse_json<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T, SourceError> {
    serde_json::from_slice(bytes).map_err(|e| SourceError::JsonParse {
        url: url.to_string(),
        source: e,
    })
}

pub(crate) fn url_with_params(base: &str, params: &[(&str, &str)]) -> Result<String, SourceError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| SourceError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })
}

//! TOML-based pipeline configuration.
//!
//! Every field has a default matching the public Helsinki data sources, so an empty file (or
//! [`PipelineConfig::default`]) is a working configuration.

use crate::sources::calibration::MapLayout;
use crate::types::month::{Month, MonthWindow};
use crate::utils::{get_cache_dir, get_store_dir};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration, threaded explicitly into [`crate::HeatPipeline`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory of downloaded resources. Defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Directory of derived tables. Defaults to the platform local data directory.
    pub store_dir: Option<PathBuf>,
    /// Keep diagnostic artifacts (e.g. forecast maps that failed calibration).
    pub debug: bool,
    /// Length of the history window in years.
    pub history_years: u32,
    /// Last month of the history window. Defaults to the last completed month.
    pub window_end: Option<NaiveDate>,
    /// Size of the forecast map worker pool. Defaults to the available parallelism.
    pub workers: Option<usize>,
    pub endpoints: Endpoints,
    pub weather: WeatherConfig,
    pub anomaly_map: MapLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            store_dir: None,
            debug: false,
            history_years: 10,
            window_end: None,
            workers: None,
            endpoints: Endpoints::default(),
            weather: WeatherConfig::default(),
            anomaly_map: MapLayout::default(),
        }
    }
}

/// Base URLs of the four remote sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    /// Property directory API root (`/Property/List`, `/Property/Search`).
    pub properties: String,
    /// Monthly energy records by building.
    pub energy: String,
    /// WFS endpoint serving daily station observations.
    pub weather: String,
    /// Directory holding `T2m_index.txt` and the anomaly maps.
    pub seasonal: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            properties: "https://helsinki-openapi.nuuka.cloud/api/v1.0".to_string(),
            energy: concat!(
                "https://helsinki-openapi.nuuka.cloud/api/v1.0",
                "/EnergyData/Monthly/ListByProperty"
            )
            .to_string(),
            weather: "https://opendata.fmi.fi/wfs".to_string(),
            seasonal: "https://ies-ows.jrc.ec.europa.eu/SeasonalForecast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherConfig {
    /// Station ids whose daily means are averaged into one series.
    pub stations: Vec<u32>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            stations: vec![101007, 101004, 100971, 100973],
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_years == 0 {
            return Err(ConfigError::Invalid("history_years must be > 0".to_string()));
        }
        if self.weather.stations.is_empty() {
            return Err(ConfigError::Invalid(
                "weather.stations must list at least one station".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be > 0".to_string()));
        }
        self.anomaly_map.validate().map_err(ConfigError::Invalid)
    }

    pub fn cache_dir(&self) -> Result<PathBuf, std::io::Error> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_dir(),
        }
    }

    pub fn store_dir(&self) -> Result<PathBuf, std::io::Error> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_store_dir(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// The history window, ending at `window_end` or the last month completed before `today`.
    pub fn window(&self, today: NaiveDate) -> MonthWindow {
        let end = self
            .window_end
            .map(Month::from_date)
            .unwrap_or_else(|| Month::last_completed(today));
        MonthWindow::ending_at(end, self.history_years)
    }
}

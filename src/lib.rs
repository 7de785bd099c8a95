mod cache;
mod config;
mod error;
mod model;
mod pipeline;
mod reader;
mod sources;
mod store;
mod table;
mod types;
mod utils;

pub use error::{PipelineError, ValidationError};
pub use pipeline::{HeatPipeline, PipelineData};
pub use reader::StoreReader;

pub use config::{ConfigError, Endpoints, PipelineConfig, WeatherConfig};

pub use cache::error::CacheError;
pub use cache::memory::MemoryTransport;
pub use cache::resource_cache::ResourceCache;
pub use cache::transport::{HttpTransport, ResourceReader, Transport};

pub use store::error::StoreError;
pub use store::table_store::{ParquetTableStore, TableRepository};
pub use table::TableError;

pub use types::month::{month_range, months_between, Month, MonthWindow, RangeStop};
pub use types::reporting_group::ReportingGroup;

pub use sources::anomalies::{
    anomalies_for, assemble_reports, merge_reports, parse_index, AnomalyFetch, AnomalyImage,
    AnomalyReport, INDEX_FILE, LEAD_MONTHS, SEASONAL_ANOMALIES_TABLE,
};
pub use sources::calibration::{
    decode_map, read_anomaly, ColorScale, MapLayout, Rgb, NEGATIVE_SWATCHES, POSITIVE_SWATCHES,
    REFERENCE_COLORS,
};
pub use sources::energy::{energy_url, fetch_monthly_energy, EnergyRecord};
pub use sources::error::SourceError;
pub use sources::properties::{
    fetch_properties, normalize_properties, Property, RawProperty, PROPERTIES_TABLE,
};
pub use sources::weather::{
    combine_stations, daily_means, fetch_decade_temperatures, monthly_averages, monthly_means,
    observations_url, parse_daily_observations, CalendarMonthTemperature, DailyObservation,
    MonthlyTemperature, AVG_TEMPERATURES_TABLE, DECADE_TEMPERATURES_TABLE,
};

pub use model::error::ModelError;
pub use model::heating::{
    fit_heating_model, join_heated_buildings, HeatedBuilding, HeatingModel, HistoryPoint,
    ScoredFit, HEATED_BUILDINGS_TABLE, HEATING_MODELS_TABLE, LOG_OFFSET,
};
pub use model::outliers::{remove_outliers, z_scores, MAX_OUTLIER_PASSES, Z_SCORE_LIMIT};
pub use model::prognosis::{prognosis, ModelKind, PrognosisPoint};
pub use model::regression::LinearFit;

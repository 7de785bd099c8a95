//! The main entry point: fetches the four remote sources and derives every stored table.

use crate::cache::resource_cache::ResourceCache;
use crate::cache::transport::{HttpTransport, Transport};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::heating::{
    fit_heating_model, heated_from_frame, heated_to_frame, join_heated_buildings,
    models_from_frame, models_to_frame, HeatedBuilding, HeatingModel, HEATED_BUILDINGS_TABLE,
    HEATING_MODELS_TABLE,
};
use crate::sources::anomalies::{
    merge_reports, reports_from_frame, reports_to_frame, AnomalyFetch, AnomalyReport,
    SEASONAL_ANOMALIES_TABLE,
};
use crate::sources::energy::{fetch_monthly_energy, EnergyRecord};
use crate::sources::error::SourceError;
use crate::sources::properties::{
    fetch_properties, properties_from_frame, properties_to_frame, Property, PROPERTIES_TABLE,
};
use crate::sources::weather::{
    averages_from_frame, averages_to_frame, fetch_decade_temperatures, monthly_averages,
    temperatures_from_frame, temperatures_to_frame, CalendarMonthTemperature, MonthlyTemperature,
    AVG_TEMPERATURES_TABLE, DECADE_TEMPERATURES_TABLE,
};
use crate::store::error::StoreError;
use crate::store::table_store::{ParquetTableStore, TableRepository};
use crate::types::month::{Month, MonthWindow};
use crate::types::reporting_group::ReportingGroup;
use bon::bon;
use chrono::{Local, NaiveDate};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Everything the presentation layer needs, as returned by [`HeatPipeline::fetch_data`].
#[derive(Debug, Clone)]
pub struct PipelineData {
    pub buildings: Vec<HeatedBuilding>,
    pub temperatures: Vec<MonthlyTemperature>,
    pub avg_temperatures: Vec<CalendarMonthTemperature>,
    pub seasonal_anomalies: Vec<AnomalyReport>,
}

/// Derives the heating dataset from the public data sources.
///
/// Downloads go through an on-disk [`ResourceCache`]; derived tables are persisted in a
/// [`ParquetTableStore`]. A table that is already stored is never derived again, so an
/// interrupted run picks up where it stopped.
///
/// # Examples
///
/// ```rust,no_run
/// # use heat_prognosis::{HeatPipeline, PipelineConfig, PipelineError};
/// # async fn run() -> Result<(), PipelineError> {
/// let pipeline = HeatPipeline::new(PipelineConfig::default())?;
/// let data = pipeline.fetch_data().await?;
/// println!("{} buildings with a heating model", data.buildings.len());
/// # Ok(())
/// # }
/// ```
pub struct HeatPipeline {
    config: PipelineConfig,
    cache: Arc<ResourceCache>,
    store: ParquetTableStore,
    window: MonthWindow,
}

#[bon]
impl HeatPipeline {
    /// Creates a pipeline that downloads over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an invalid configuration and
    /// [`PipelineError::DirResolution`] when no default cache or store directory can be found.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Creates a pipeline that downloads through `transport`.
    pub fn with_transport(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PipelineError> {
        Self::with_transport_at(config, transport, Local::now().date_naive())
    }

    /// Like [`HeatPipeline::with_transport`], with the history window computed for `today`.
    pub fn with_transport_at(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        today: NaiveDate,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache_dir = config.cache_dir().map_err(PipelineError::DirResolution)?;
        let store_dir = config.store_dir().map_err(PipelineError::DirResolution)?;
        let window = config.window(today);
        info!(
            "History window {}..={}, cache at {:?}, store at {:?}",
            window.start, window.end, cache_dir, store_dir
        );
        Ok(Self {
            cache: Arc::new(ResourceCache::new(&cache_dir, transport)),
            store: ParquetTableStore::new(&store_dir),
            window,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn window(&self) -> MonthWindow {
        self.window
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn store(&self) -> &ParquetTableStore {
        &self.store
    }

    /// Properties with a building code and coordinates. Stored as `properties`.
    pub async fn properties(&self) -> Result<Vec<Property>, PipelineError> {
        let df = self
            .store
            .load_or_compute(PROPERTIES_TABLE, move || async move {
                let properties =
                    fetch_properties(&self.cache, &self.config.endpoints.properties).await?;
                Ok::<_, PipelineError>(properties_to_frame(&properties)?)
            })
            .await?;
        Ok(properties_from_frame(&df)?)
    }

    /// Monthly mean temperature across the configured stations over the history window.
    /// Stored as `decade_temperatures`.
    pub async fn decade_temperatures(&self) -> Result<Vec<MonthlyTemperature>, PipelineError> {
        let df = self
            .store
            .load_or_compute(DECADE_TEMPERATURES_TABLE, move || async move {
                let temperatures = fetch_decade_temperatures(
                    &self.cache,
                    &self.config.endpoints.weather,
                    &self.config.weather.stations,
                    &self.window,
                )
                .await?;
                Ok::<_, PipelineError>(temperatures_to_frame(&temperatures)?)
            })
            .await?;
        Ok(temperatures_from_frame(&df)?)
    }

    /// Average temperature of each calendar month. Stored as `avg_temperatures`.
    pub async fn avg_temperatures(&self) -> Result<Vec<CalendarMonthTemperature>, PipelineError> {
        let df = self
            .store
            .load_or_compute(AVG_TEMPERATURES_TABLE, move || async move {
                let temperatures = self.decade_temperatures().await?;
                Ok::<_, PipelineError>(averages_to_frame(&monthly_averages(&temperatures))?)
            })
            .await?;
        Ok(averages_from_frame(&df)?)
    }

    /// Fits a heating model for every property with heating data. Stored as `heating_models`.
    ///
    /// Buildings the energy service does not know, or whose heating data does not overlap the
    /// temperature series, get no model.
    pub async fn heating_models(&self) -> Result<Vec<HeatingModel>, PipelineError> {
        let df = self
            .store
            .load_or_compute(HEATING_MODELS_TABLE, move || async move {
                let properties = self.properties().await?;
                let temperatures = self.decade_temperatures().await?;
                let mut models = Vec::new();
                for property in &properties {
                    let code = &property.building_code;
                    let records = match self.heat_records(code).await {
                        Ok(records) => records,
                        Err(e) if e.is_not_found() => {
                            info!("Building {} has no heating data", code);
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    match fit_heating_model(code, &records, &temperatures) {
                        Some(model) => models.push(model),
                        None => info!("Building {} lacks usable heating data", code),
                    }
                }
                info!(
                    "Fitted heating models for {} of {} buildings",
                    models.len(),
                    properties.len()
                );
                Ok::<_, PipelineError>(models_to_frame(&models)?)
            })
            .await?;
        Ok(models_from_frame(&df)?)
    }

    async fn heat_records(
        &self,
        building_code: &str,
    ) -> Result<Vec<EnergyRecord>, SourceError> {
        fetch_monthly_energy(
            &self.cache,
            &self.config.endpoints.energy,
            building_code,
            ReportingGroup::Heat,
            self.window.start,
            self.window.end,
        )
        .await
    }

    /// Properties joined with their heating models. Stored as `heated_buildings`.
    pub async fn heated_buildings(&self) -> Result<Vec<HeatedBuilding>, PipelineError> {
        let df = self
            .store
            .load_or_compute(HEATED_BUILDINGS_TABLE, move || async move {
                let properties = self.properties().await?;
                let models = self.heating_models().await?;
                let buildings = join_heated_buildings(&properties, &models);
                Ok::<_, PipelineError>(heated_to_frame(&buildings)?)
            })
            .await?;
        Ok(heated_from_frame(&df)?)
    }

    /// Brings the `seasonal_anomalies` table up to date and returns it.
    ///
    /// The forecast index is read on every call. Only issue dates missing from the stored
    /// table are processed; stored dates are kept as they are.
    pub async fn seasonal_anomalies(&self) -> Result<Vec<AnomalyReport>, PipelineError> {
        let existing = match self.store.load(SEASONAL_ANOMALIES_TABLE).await {
            Ok(df) => reports_from_frame(&df)?,
            Err(StoreError::NotFound(_)) => {
                warn!("Table '{}' not in store. Deriving it.", SEASONAL_ANOMALIES_TABLE);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let known: HashSet<NaiveDate> = existing.iter().map(|r| r.issued).collect();

        let fetch = AnomalyFetch {
            base_url: self.config.endpoints.seasonal.clone(),
            layout: self.config.anomaly_map.clone(),
            workers: self.config.worker_count(),
            diagnostics_dir: self
                .config
                .debug
                .then(|| self.cache.cache_dir().join("diagnostics")),
        };
        let fresh = fetch.fetch_new_reports(&self.cache, &known).await?;
        if fresh.is_empty() && self.store.contains(SEASONAL_ANOMALIES_TABLE).await {
            return Ok(existing);
        }

        info!("Adding {} forecast issues to '{}'", fresh.len(), SEASONAL_ANOMALIES_TABLE);
        let merged = merge_reports(existing, fresh);
        self.store
            .save(SEASONAL_ANOMALIES_TABLE, &reports_to_frame(&merged)?)
            .await?;
        Ok(merged)
    }

    /// Derives (or loads) every table and returns the ones the presentation layer reads.
    pub async fn fetch_data(&self) -> Result<PipelineData, PipelineError> {
        let temperatures = self.decade_temperatures().await?;
        let avg_temperatures = self.avg_temperatures().await?;
        let buildings = self.heated_buildings().await?;
        let seasonal_anomalies = self.seasonal_anomalies().await?;
        info!(
            "Pipeline ready: {} buildings, {} months of temperatures, {} forecast issues",
            buildings.len(),
            temperatures.len(),
            seasonal_anomalies.len()
        );
        Ok(PipelineData {
            buildings,
            temperatures,
            avg_temperatures,
            seasonal_anomalies,
        })
    }

    /// Fetches the monthly energy records of one building.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.building_code(&str)`: **Required.** The building to query.
    /// * `.reporting_group(&str)`: **Required.** One of `Electricity`, `Heat`, `Water`,
    ///   `DistrictCooling`.
    /// * `.start(&str)`: Optional first month (`YYYY-MM` or `YYYY-MM-DD`). Defaults to the start of
    ///   the history window.
    /// * `.end(&str)`: Optional last month. Defaults to the end of the history window.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for an unknown reporting group or an unparsable month,
    /// before anything is fetched.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use heat_prognosis::{HeatPipeline, PipelineConfig, PipelineError};
    /// # async fn run() -> Result<(), PipelineError> {
    /// let pipeline = HeatPipeline::new(PipelineConfig::default())?;
    /// let records = pipeline
    ///     .energy_records()
    ///     .building_code("091-004-0001-0010")
    ///     .reporting_group("Electricity")
    ///     .start("2019-01")
    ///     .call()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn energy_records(
        &self,
        building_code: &str,
        reporting_group: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<EnergyRecord>, PipelineError> {
        let group: ReportingGroup = reporting_group.parse()?;
        let start = start.map(Month::parse).transpose()?.unwrap_or(self.window.start);
        let end = end.map(Month::parse).transpose()?.unwrap_or(self.window.end);
        Ok(fetch_monthly_energy(
            &self.cache,
            &self.config.endpoints.energy,
            building_code,
            group,
            start,
            end,
        )
        .await?)
    }
}

//! Read-only access to the derived tables, for presentation.
//!
//! Unlike [`crate::HeatPipeline`], the reader never fetches or derives anything: a table that has
//! not been derived yet is an error.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::heating::{
    heated_from_frame, HeatedBuilding, HistoryPoint, HEATED_BUILDINGS_TABLE,
};
use crate::model::prognosis::{prognosis, PrognosisPoint};
use crate::sources::anomalies::{reports_from_frame, AnomalyReport, SEASONAL_ANOMALIES_TABLE};
use crate::sources::weather::{
    averages_from_frame, temperatures_from_frame, CalendarMonthTemperature, MonthlyTemperature,
    AVG_TEMPERATURES_TABLE, DECADE_TEMPERATURES_TABLE,
};
use crate::store::table_store::{ParquetTableStore, TableRepository};
use bon::bon;
use std::path::Path;

pub struct StoreReader {
    store: ParquetTableStore,
}

#[bon]
impl StoreReader {
    pub fn new(store_dir: &Path) -> Self {
        Self {
            store: ParquetTableStore::new(store_dir),
        }
    }

    /// Reads the store the pipeline built from `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let store_dir = config.store_dir().map_err(PipelineError::DirResolution)?;
        Ok(Self::new(&store_dir))
    }

    /// All buildings with a heating model.
    pub async fn buildings(&self) -> Result<Vec<HeatedBuilding>, PipelineError> {
        let df = self.store.load(HEATED_BUILDINGS_TABLE).await?;
        Ok(heated_from_frame(&df)?)
    }

    pub async fn building(&self, building_code: &str) -> Result<HeatedBuilding, PipelineError> {
        self.buildings()
            .await?
            .into_iter()
            .find(|b| b.property.building_code == building_code)
            .ok_or_else(|| PipelineError::UnknownBuilding(building_code.to_string()))
    }

    /// Monthly heating energy and temperature of one building over its heating period.
    pub async fn history(&self, building_code: &str) -> Result<Vec<HistoryPoint>, PipelineError> {
        let building = self.building(building_code).await?;
        Ok(building.history(&self.temperatures().await?))
    }

    pub async fn temperatures(&self) -> Result<Vec<MonthlyTemperature>, PipelineError> {
        let df = self.store.load(DECADE_TEMPERATURES_TABLE).await?;
        Ok(temperatures_from_frame(&df)?)
    }

    pub async fn avg_temperatures(&self) -> Result<Vec<CalendarMonthTemperature>, PipelineError> {
        let df = self.store.load(AVG_TEMPERATURES_TABLE).await?;
        Ok(averages_from_frame(&df)?)
    }

    /// Forecast issues, oldest first.
    pub async fn seasonal_anomalies(&self) -> Result<Vec<AnomalyReport>, PipelineError> {
        let df = self.store.load(SEASONAL_ANOMALIES_TABLE).await?;
        Ok(reports_from_frame(&df)?)
    }

    /// The forecast issue at `index`; negative indexes count back from the latest issue.
    pub async fn anomaly_report(&self, index: isize) -> Result<AnomalyReport, PipelineError> {
        let mut reports = self.seasonal_anomalies().await?;
        let position = if index < 0 {
            reports.len().checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|i| *i < reports.len())
        };
        position
            .map(|i| reports.swap_remove(i))
            .ok_or(PipelineError::NoAnomalyReport(index))
    }

    /// Heating forecast of a building from one forecast issue.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.building(&str)`: **Required.** Code of a building with a heating model.
    /// * `.report_index(isize)`: Optional. Which forecast issue to use, indexed like
    ///   [`StoreReader::anomaly_report`]. Defaults to `-1`, the latest issue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownBuilding`] for a building without a model,
    /// [`PipelineError::NoAnomalyReport`] for an index past either end, and
    /// [`PipelineError::Model`] when the monthly averages are incomplete.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use heat_prognosis::{StoreReader, PipelineError};
    /// # use std::path::Path;
    /// # async fn run() -> Result<(), PipelineError> {
    /// let reader = StoreReader::new(Path::new("datastore"));
    /// for point in reader.prognosis().building("091-004-0001-0010").call().await? {
    ///     println!("{}: {:.1} °C, {:.0}", point.month, point.temperature, point.energy);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn prognosis(
        &self,
        building: &str,
        #[builder(default = -1)] report_index: isize,
    ) -> Result<Vec<PrognosisPoint>, PipelineError> {
        let building = self.building(building).await?;
        let report = self.anomaly_report(report_index).await?;
        let averages = self.avg_temperatures().await?;
        Ok(prognosis(&building.model, &averages, &report)?)
    }
}

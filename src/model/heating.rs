//! Per-building regression of heating energy on outdoor temperature.

use crate::model::error::ModelError;
use crate::model::outliers::remove_outliers;
use crate::model::regression::LinearFit;
use crate::sources::energy::EnergyRecord;
use crate::sources::properties::{properties_from_frame, properties_to_frame, Property};
use crate::sources::weather::MonthlyTemperature;
use crate::table::{build_frame, FrameReader, TableError};
use crate::types::month::{months_between, Month};
use log::debug;
use polars::prelude::{Column, DataFrame};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const HEATING_MODELS_TABLE: &str = "heating_models";
pub const HEATED_BUILDINGS_TABLE: &str = "heated_buildings";

/// Added to the energy before taking the logarithm, so months without heating stay finite.
pub const LOG_OFFSET: f64 = 3.0;

/// A fit together with its R² on the training data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredFit {
    pub fit: LinearFit,
    pub score: f64,
}

/// The two regressions fitted for one building.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatingModel {
    pub building_code: String,
    /// Months used for fitting.
    pub datapoints: usize,
    /// `energy ~ temperature`
    pub linear: ScoredFit,
    /// `ln(energy + 3) ~ temperature`, over the months that have a logarithm
    pub log: ScoredFit,
    /// First month of the cleaned heating series.
    pub heating_start: Month,
    /// Last month of the cleaned heating series.
    pub heating_stop: Month,
    /// Cleaned monthly heating energy.
    pub monthly: BTreeMap<Month, f64>,
}

/// Fits the heating model of one building from its `Heat` records.
///
/// Records without a value are ignored, records of the same month are averaged and extreme values
/// removed before the series is matched with `temperatures` by month. Returns `None` when no month
/// is left to fit on.
///
/// Months whose energy is at or below `-LOG_OFFSET` have no logarithm and are left out of the
/// log-linear fit only. Without any such month the log fit scores `-inf`, so it is never preferred.
pub fn fit_heating_model(
    building_code: &str,
    records: &[EnergyRecord],
    temperatures: &[MonthlyTemperature],
) -> Option<HeatingModel> {
    let series = remove_outliers(monthly_series(records), |(_, v)| *v);

    let heating_start = series.iter().map(|(m, _)| *m).min()?;
    let heating_stop = series.iter().map(|(m, _)| *m).max()?;

    let temperature_by_month: HashMap<Month, f64> =
        temperatures.iter().map(|t| (t.month, t.avg_temp)).collect();
    let (x, y): (Vec<f64>, Vec<f64>) = series
        .iter()
        .filter_map(|(m, v)| temperature_by_month.get(m).map(|t| (*t, *v)))
        .unzip();
    if x.is_empty() {
        debug!("No months with both heating and temperature for {}", building_code);
        return None;
    }

    let linear = LinearFit::fit(&x, &y)?;
    let log = log_fit(building_code, &x, &y);

    Some(HeatingModel {
        building_code: building_code.to_string(),
        datapoints: x.len(),
        linear: ScoredFit {
            fit: linear,
            score: linear.score(&x, &y),
        },
        log,
        heating_start,
        heating_stop,
        monthly: series.into_iter().collect(),
    })
}

/// Mean energy per month, ignoring missing and non-finite values.
fn monthly_series(records: &[EnergyRecord]) -> Vec<(Month, f64)> {
    let mut by_month: BTreeMap<Month, Vec<f64>> = BTreeMap::new();
    for r in records {
        if let Some(v) = r.value.filter(|v| v.is_finite()) {
            by_month.entry(r.month).or_default().push(v);
        }
    }
    by_month
        .into_iter()
        .map(|(month, values)| (month, values.iter().sum::<f64>() / values.len() as f64))
        .collect()
}

fn log_fit(building_code: &str, x: &[f64], y: &[f64]) -> ScoredFit {
    let (log_x, log_y): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .map(|(t, v)| (*t, (v + LOG_OFFSET).ln()))
        .filter(|(_, v)| v.is_finite())
        .unzip();
    if log_x.len() < x.len() {
        debug!(
            "{} of {} months of {} have no logarithm",
            x.len() - log_x.len(),
            x.len(),
            building_code
        );
    }
    match LinearFit::fit(&log_x, &log_y) {
        Some(fit) => ScoredFit {
            fit,
            score: fit.score(&log_x, &log_y),
        },
        None => ScoredFit {
            fit: LinearFit {
                coef: 0.0,
                intercept: 0.0,
            },
            score: f64::NEG_INFINITY,
        },
    }
}

/// A property that has a heating model.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatedBuilding {
    pub property: Property,
    pub model: HeatingModel,
}

/// One month of a building's heating history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub month: Month,
    pub energy: Option<f64>,
    pub avg_temp: Option<f64>,
}

impl HeatedBuilding {
    /// Every month from `heating_start` to `heating_stop` with the observed energy and the
    /// average temperature, where known.
    pub fn history(&self, temperatures: &[MonthlyTemperature]) -> Vec<HistoryPoint> {
        let temperature_by_month: HashMap<Month, f64> =
            temperatures.iter().map(|t| (t.month, t.avg_temp)).collect();
        months_between(self.model.heating_start, self.model.heating_stop)
            .map(|month| HistoryPoint {
                month,
                energy: self.model.monthly.get(&month).copied(),
                avg_temp: temperature_by_month.get(&month).copied(),
            })
            .collect()
    }
}

/// Pairs every property with its model, in property order. Properties without a model are left
/// out.
pub fn join_heated_buildings(
    properties: &[Property],
    models: &[HeatingModel],
) -> Vec<HeatedBuilding> {
    let by_code: HashMap<&str, &HeatingModel> =
        models.iter().map(|m| (m.building_code.as_str(), m)).collect();
    properties
        .iter()
        .filter_map(|p| {
            by_code.get(p.building_code.as_str()).map(|m| HeatedBuilding {
                property: p.clone(),
                model: (*m).clone(),
            })
        })
        .collect()
}

fn strs<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    values.collect()
}

pub fn models_to_frame(models: &[HeatingModel]) -> Result<DataFrame, ModelError> {
    let lin_models = models
        .iter()
        .map(|m| m.linear.fit.encode())
        .collect::<Result<Vec<_>, _>>()?;
    let log_models = models
        .iter()
        .map(|m| m.log.fit.encode())
        .collect::<Result<Vec<_>, _>>()?;
    let floats = |f: fn(&HeatingModel) -> f64| models.iter().map(f).collect::<Vec<_>>();

    let mut columns = vec![
        Column::new(
            "building_code".into(),
            strs(models.iter().map(|m| m.building_code.as_str())),
        ),
        Column::new(
            "datapoints".into(),
            models.iter().map(|m| m.datapoints as i64).collect::<Vec<_>>(),
        ),
        Column::new("lin_score".into(), floats(|m| m.linear.score)),
        Column::new("lin_coef".into(), floats(|m| m.linear.fit.coef)),
        Column::new("lin_intercept".into(), floats(|m| m.linear.fit.intercept)),
        Column::new("lin_model".into(), lin_models),
        Column::new("log_score".into(), floats(|m| m.log.score)),
        Column::new("log_coef".into(), floats(|m| m.log.fit.coef)),
        Column::new("log_intercept".into(), floats(|m| m.log.fit.intercept)),
        Column::new("log_model".into(), log_models),
        Column::new(
            "heating_start".into(),
            models.iter().map(|m| m.heating_start.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "heating_stop".into(),
            models.iter().map(|m| m.heating_stop.to_string()).collect::<Vec<_>>(),
        ),
    ];

    // One column per month seen in any building, oldest first.
    let months: BTreeSet<Month> = models.iter().flat_map(|m| m.monthly.keys().copied()).collect();
    for month in months {
        columns.push(Column::new(
            month.to_string().into(),
            models
                .iter()
                .map(|m| m.monthly.get(&month).copied())
                .collect::<Vec<_>>(),
        ));
    }
    Ok(build_frame(HEATING_MODELS_TABLE, columns)?)
}

pub fn models_from_frame(df: &DataFrame) -> Result<Vec<HeatingModel>, ModelError> {
    read_models(HEATING_MODELS_TABLE, df)
}

/// A score without a value (NaN) reads back as `-inf`, which never wins model selection.
fn scores(reader: &FrameReader<'_>, name: &str) -> Result<Vec<f64>, TableError> {
    Ok(reader
        .floats(name)?
        .into_iter()
        .map(|score| score.unwrap_or(f64::NEG_INFINITY))
        .collect())
}

fn read_models(table: &str, df: &DataFrame) -> Result<Vec<HeatingModel>, ModelError> {
    let reader = FrameReader::new(table, df);
    let codes = reader.required_strings("building_code")?;
    let datapoints = reader.required_integers("datapoints")?;
    let lin_scores = scores(&reader, "lin_score")?;
    let lin_models = reader.required_strings("lin_model")?;
    let log_scores = scores(&reader, "log_score")?;
    let log_models = reader.required_strings("log_model")?;
    let starts = reader.required_strings("heating_start")?;
    let stops = reader.required_strings("heating_stop")?;

    let month_columns = reader
        .column_names()
        .into_iter()
        .filter_map(|name| name.parse::<Month>().ok().map(|month| (month, name)))
        .map(|(month, name)| Ok((month, reader.floats(&name)?)))
        .collect::<Result<Vec<_>, TableError>>()?;

    let parse_month = |column: &str, value: &str| {
        value
            .parse::<Month>()
            .map_err(|_| reader.invalid(column, value))
    };

    let mut models = Vec::with_capacity(reader.height());
    for row in 0..reader.height() {
        let monthly = month_columns
            .iter()
            .filter_map(|(month, values)| values[row].map(|v| (*month, v)))
            .collect();
        models.push(HeatingModel {
            building_code: codes[row].clone(),
            datapoints: usize::try_from(datapoints[row])
                .map_err(|_| reader.invalid("datapoints", datapoints[row]))?,
            linear: ScoredFit {
                fit: LinearFit::decode(&lin_models[row])?,
                score: lin_scores[row],
            },
            log: ScoredFit {
                fit: LinearFit::decode(&log_models[row])?,
                score: log_scores[row],
            },
            heating_start: parse_month("heating_start", &starts[row])?,
            heating_stop: parse_month("heating_stop", &stops[row])?,
            monthly,
        });
    }
    Ok(models)
}

pub fn heated_to_frame(buildings: &[HeatedBuilding]) -> Result<DataFrame, ModelError> {
    let properties: Vec<Property> = buildings.iter().map(|b| b.property.clone()).collect();
    let models: Vec<HeatingModel> = buildings.iter().map(|b| b.model.clone()).collect();
    let property_frame = properties_to_frame(&properties)?;
    let model_frame = models_to_frame(&models)?;

    let mut columns = property_frame.get_columns().to_vec();
    columns.extend(
        model_frame
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != "building_code")
            .cloned(),
    );
    Ok(build_frame(HEATED_BUILDINGS_TABLE, columns)?)
}

pub fn heated_from_frame(df: &DataFrame) -> Result<Vec<HeatedBuilding>, ModelError> {
    let properties = properties_from_frame(df)?;
    let models = read_models(HEATED_BUILDINGS_TABLE, df)?;
    Ok(properties
        .into_iter()
        .zip(models)
        .map(|(property, model)| HeatedBuilding { property, model })
        .collect())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::reporting_group::ReportingGroup;

    pub fn month(m: u32, y: i32) -> Month {
        Month::new(m, y).unwrap()
    }

    /// Two years of temperatures, colder in winter.
    pub fn temperatures() -> Vec<MonthlyTemperature> {
        months_between(month(1, 2018), month(12, 2019))
            .map(|m| {
                let phase = (m.month() as f64 - 1.0) / 6.0 * std::f64::consts::PI;
                MonthlyTemperature {
                    month: m,
                    avg_temp: 8.0 - 12.0 * phase.cos(),
                }
            })
            .collect()
    }

    /// Heat that falls linearly with temperature.
    pub fn heat_records(building: &str, temperatures: &[MonthlyTemperature]) -> Vec<EnergyRecord> {
        temperatures
            .iter()
            .map(|t| EnergyRecord {
                building_code: building.to_string(),
                reporting_group: ReportingGroup::Heat,
                month: t.month,
                value: Some(500.0 - 20.0 * t.avg_temp),
                unit: Some("MWh".to_string()),
            })
            .collect()
    }

    pub fn property(code: &str) -> Property {
        Property {
            building_code: code.to_string(),
            property_code: format!("P-{code}"),
            property_name: format!("Property {code}"),
            latitude: 60.17,
            longitude: 24.94,
        }
    }
}

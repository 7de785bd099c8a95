//! Short-horizon heating forecasts from seasonal temperature anomalies.

use crate::model::error::ModelError;
use crate::model::heating::{HeatingModel, LOG_OFFSET};
use crate::sources::anomalies::{AnomalyReport, LEAD_MONTHS};
use crate::sources::weather::CalendarMonthTemperature;
use crate::types::month::Month;
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Linear,
    Log,
}

/// Forecast for one month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrognosisPoint {
    pub month: Month,
    pub temperature: f64,
    pub energy: f64,
}

impl HeatingModel {
    /// The regression with the higher R². A tie goes to the linear model.
    pub fn preferred(&self) -> ModelKind {
        if self.log.score > self.linear.score {
            ModelKind::Log
        } else {
            ModelKind::Linear
        }
    }

    /// Heating energy at `temperature` according to `kind`, in the units of the energy records.
    pub fn predict_with(&self, kind: ModelKind, temperature: f64) -> f64 {
        match kind {
            ModelKind::Linear => self.linear.fit.predict(temperature),
            ModelKind::Log => self.log.fit.predict(temperature).exp() - LOG_OFFSET,
        }
    }

    pub fn predict(&self, temperature: f64) -> f64 {
        self.predict_with(self.preferred(), temperature)
    }
}

/// Forecast for each lead month of `report`.
///
/// The temperature of a month is its climatological average plus the forecast anomaly. Lead
/// months without an anomaly are left out.
///
/// # Errors
///
/// [`ModelError::MissingAverage`] when `averages` lacks a forecast calendar month.
pub fn prognosis(
    model: &HeatingModel,
    averages: &[CalendarMonthTemperature],
    report: &AnomalyReport,
) -> Result<Vec<PrognosisPoint>, ModelError> {
    let average_by_month: HashMap<u32, f64> =
        averages.iter().map(|a| (a.month, a.avg_temp)).collect();
    let kind = model.preferred();

    let mut points = Vec::with_capacity(LEAD_MONTHS);
    for lead in 1..=LEAD_MONTHS as u32 {
        let month = report.target_month(lead);
        let Some(anomaly) = report.anomaly(lead) else {
            debug!("No anomaly for lead month {} of {}", lead, report.issued);
            continue;
        };
        let average = average_by_month
            .get(&month.month())
            .copied()
            .ok_or(ModelError::MissingAverage(month.month()))?;
        let temperature = average + anomaly;
        points.push(PrognosisPoint {
            month,
            temperature,
            energy: model.predict_with(kind, temperature),
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::heating::ScoredFit;
    use crate::model::regression::LinearFit;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn month(m: u32, y: i32) -> Month {
        Month::new(m, y).unwrap()
    }

    fn model(lin_score: f64, log_score: f64) -> HeatingModel {
        HeatingModel {
            building_code: "B1".to_string(),
            datapoints: 24,
            linear: ScoredFit {
                fit: LinearFit { coef: -20.0, intercept: 500.0 },
                score: lin_score,
            },
            log: ScoredFit {
                fit: LinearFit { coef: -0.05, intercept: 6.0 },
                score: log_score,
            },
            heating_start: month(1, 2018),
            heating_stop: month(12, 2019),
            monthly: BTreeMap::new(),
        }
    }

    fn averages() -> Vec<CalendarMonthTemperature> {
        (1..=12)
            .map(|m| CalendarMonthTemperature {
                month: m,
                avg_temp: m as f64,
            })
            .collect()
    }

    fn report(values: [Option<f64>; LEAD_MONTHS]) -> AnomalyReport {
        AnomalyReport {
            issued: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(),
            values,
        }
    }

    #[test]
    fn test_higher_score_wins_and_tie_is_linear() {
        assert_eq!(model(0.9, 0.8).preferred(), ModelKind::Linear);
        assert_eq!(model(0.8, 0.9).preferred(), ModelKind::Log);
        assert_eq!(model(0.85, 0.85).preferred(), ModelKind::Linear);
    }

    #[test]
    fn test_linear_prognosis() {
        let model = model(0.9, 0.5);
        let points = prognosis(&model, &averages(), &report([Some(1.0); LEAD_MONTHS])).unwrap();
        assert_eq!(points.len(), 7);
        // Lead 1 is October: average 10 plus anomaly 1
        assert_eq!(points[0].month, month(10, 2020));
        assert_eq!(points[0].temperature, 11.0);
        assert_eq!(points[0].energy, 500.0 - 20.0 * 11.0);
        // Lead 4 wraps into January
        assert_eq!(points[3].month, month(1, 2021));
        assert_eq!(points[3].temperature, 2.0);
    }

    #[test]
    fn test_log_prognosis_inverts_the_transform() {
        let model = model(0.5, 0.9);
        let points = prognosis(&model, &averages(), &report([Some(0.0); LEAD_MONTHS])).unwrap();
        let expected = (6.0 - 0.05 * 10.0f64).exp() - 3.0;
        assert!((points[0].energy - expected).abs() < 1e-9);
        // Feeding the inverse back through the log transform recovers the regression line
        assert!(((points[0].energy + LOG_OFFSET).ln() - (6.0 - 0.05 * 10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_anomalies_are_skipped() {
        let mut values = [None; LEAD_MONTHS];
        values[1] = Some(-0.5);
        let points = prognosis(&model(0.9, 0.5), &averages(), &report(values)).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].month, month(11, 2020));
        assert_eq!(points[0].temperature, 10.5);
    }

    #[test]
    fn test_missing_average_is_an_error() {
        let averages: Vec<_> = averages().into_iter().filter(|a| a.month != 12).collect();
        assert!(matches!(
            prognosis(&model(0.9, 0.5), &averages, &report([Some(0.0); LEAD_MONTHS])),
            Err(ModelError::MissingAverage(12))
        ));
    }
}

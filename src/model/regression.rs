//! Ordinary least squares with a single explanatory variable.

use crate::model::error::ModelError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bincode::config::{Configuration, Fixint, LittleEndian};
use serde::{Deserialize, Serialize};

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// `y = coef * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coef: f64,
    pub intercept: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl LinearFit {
    /// Least-squares fit of `y` on `x`.
    ///
    /// Returns `None` for empty input or slices of different length. When all `x` are equal the
    /// slope is zero and the fit predicts the mean of `y`.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.is_empty() || x.len() != y.len() {
            return None;
        }
        let x_mean = mean(x);
        let y_mean = mean(y);
        let sum_sq_dev: f64 = x.iter().map(|&xi| (xi - x_mean).powi(2)).sum();
        let coef = if sum_sq_dev > 0.0 {
            let covariance: f64 = x
                .iter()
                .zip(y)
                .map(|(&xi, &yi)| (xi - x_mean) * (yi - y_mean))
                .sum();
            covariance / sum_sq_dev
        } else {
            0.0
        };
        Some(Self {
            coef,
            intercept: y_mean - coef * x_mean,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.coef * x + self.intercept
    }

    /// Coefficient of determination (R²) of the fit on `x`, `y`.
    ///
    /// A constant `y` scores 1.0 when predicted exactly and 0.0 otherwise.
    pub fn score(&self, x: &[f64], y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let y_mean = mean(y);
        let ss_res: f64 = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| (yi - self.predict(xi)).powi(2))
            .sum();
        let ss_tot: f64 = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum();
        if ss_tot == 0.0 {
            return if ss_res == 0.0 { 1.0 } else { 0.0 };
        }
        1.0 - ss_res / ss_tot
    }

    /// Base64 text of the fit, storable in a table cell.
    pub fn encode(&self) -> Result<String, ModelError> {
        let bytes = bincode::serde::encode_to_vec(self, BINCODE_CONFIG)
            .map_err(|e| ModelError::Encode(Box::from(e)))?;
        Ok(STANDARD.encode(bytes))
    }

    pub fn decode(text: &str) -> Result<Self, ModelError> {
        let bytes = STANDARD.decode(text.trim())?;
        let (fit, _) = bincode::serde::decode_from_slice::<LinearFit, _>(&bytes, BINCODE_CONFIG)
            .map_err(|e| ModelError::Decode(Box::from(e)))?;
        Ok(fit)
    }
}

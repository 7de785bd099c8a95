//! Per-building heating models and the prognoses derived from them.

pub mod error;
pub mod heating;
pub mod outliers;
pub mod prognosis;
pub mod regression;

//! Z-score based removal of extreme values.
//!
//! A single huge spike inflates the standard deviation enough to hide smaller spikes, so removal
//! repeats until no value is extreme any more.

use log::{debug, warn};

/// Values at least this many standard deviations from the mean are dropped.
pub const Z_SCORE_LIMIT: f64 = 6.0;
/// Upper bound on removal passes.
pub const MAX_OUTLIER_PASSES: usize = 64;

/// Standard scores using the population standard deviation. All zero when the values are equal.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std == 0.0 || !std.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

/// Drops the rows whose value is an outlier, repeating until none remain.
///
/// Row order is preserved. Stops after [`MAX_OUTLIER_PASSES`] passes even if outliers remain.
pub fn remove_outliers<T>(rows: Vec<T>, value: impl Fn(&T) -> f64) -> Vec<T> {
    remove_outliers_within(rows, value, MAX_OUTLIER_PASSES)
}

fn remove_outliers_within<T>(
    mut rows: Vec<T>,
    value: impl Fn(&T) -> f64,
    max_passes: usize,
) -> Vec<T> {
    for pass in 0..max_passes {
        let values: Vec<f64> = rows.iter().map(&value).collect();
        let keep: Vec<bool> = z_scores(&values)
            .into_iter()
            .map(|z| z.abs() < Z_SCORE_LIMIT)
            .collect();
        if keep.iter().all(|k| *k) {
            return rows;
        }
        debug!(
            "Outlier pass {} drops {} of {} rows",
            pass + 1,
            keep.iter().filter(|k| !**k).count(),
            rows.len()
        );
        let mut flags = keep.into_iter();
        rows.retain(|_| flags.next().unwrap_or(true));
    }
    warn!("Outlier removal did not settle after {} passes", max_passes);
    rows
}

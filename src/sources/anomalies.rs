//! Seasonal temperature anomaly forecasts.
//!
//! Every forecast issue publishes seven maps, one per lead month, listed in a text index. Each
//! map is reduced to the single anomaly under the probe pixel
//! (see [`crate::sources::calibration`]).

use crate::cache::resource_cache::ResourceCache;
use crate::error::ValidationError;
use crate::sources::calibration::{decode_map, read_anomaly, MapLayout};
use crate::sources::error::SourceError;
use crate::table::{build_frame, FrameReader, TableError};
use crate::types::month::Month;
use crate::utils::ensure_dir_exists;
use chrono::NaiveDate;
use log::{debug, info, warn};
use polars::prelude::{Column, DataFrame};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

pub const SEASONAL_ANOMALIES_TABLE: &str = "seasonal_anomalies";
pub const INDEX_FILE: &str = "T2m_index.txt";
pub const LEAD_MONTHS: usize = 7;

static INDEX_ENTRY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^SeasonalAnomalies_T2m_(\d{8})_m(\d)\.png").ok());

/// One forecast map listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnomalyImage {
    pub issued: NaiveDate,
    /// 1-based lead month.
    pub lead: u32,
    pub file: String,
}

/// The seven lead-month anomalies of one forecast issue.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    pub issued: NaiveDate,
    /// `values[n - 1]` is the anomaly for lead month `n`.
    pub values: [Option<f64>; LEAD_MONTHS],
}

impl AnomalyReport {
    pub fn new(issued: NaiveDate) -> Self {
        Self {
            issued,
            values: [None; LEAD_MONTHS],
        }
    }

    pub fn issue_month(&self) -> Month {
        Month::from_date(self.issued)
    }

    pub fn anomaly(&self, lead: u32) -> Option<f64> {
        let index = usize::try_from(lead).ok()?.checked_sub(1)?;
        self.values.get(index).copied().flatten()
    }

    /// Calendar month covered by lead month `lead`.
    pub fn target_month(&self, lead: u32) -> Month {
        self.issue_month().add_months(lead as i32)
    }
}

/// The report laid out on the calendar: `(month, anomaly)` for leads 1 through 7.
pub fn anomalies_for(report: &AnomalyReport) -> Vec<(Month, Option<f64>)> {
    (1..=LEAD_MONTHS as u32)
        .map(|lead| (report.target_month(lead), report.anomaly(lead)))
        .collect()
}

/// Parses the map index. Lines that do not name a temperature anomaly map are ignored.
pub fn parse_index(text: &str) -> Result<Vec<AnomalyImage>, SourceError> {
    let pattern = INDEX_ENTRY.as_ref().ok_or(SourceError::IndexPattern)?;
    let mut images = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(captures) = pattern.captures(line) else {
            debug!("Ignoring index line '{}'", line);
            continue;
        };
        let issued = NaiveDate::parse_from_str(&captures[1], "%Y%m%d")
            .map_err(|_| ValidationError::Month(captures[1].to_string()))?;
        let lead: u32 = captures[2].parse().unwrap_or(0);
        if !(1..=LEAD_MONTHS as u32).contains(&lead) {
            return Err(SourceError::LeadMonth { issued, lead });
        }
        images.push(AnomalyImage {
            issued,
            lead,
            file: line.to_string(),
        });
    }
    Ok(images)
}

/// Folds per-map anomalies into one report per issue date, ordered by date.
pub fn assemble_reports(mut results: Vec<(AnomalyImage, f64)>) -> Vec<AnomalyReport> {
    results.sort_by(|(a, _), (b, _)| a.cmp(b));
    let mut reports: BTreeMap<NaiveDate, AnomalyReport> = BTreeMap::new();
    for (image, value) in results {
        let report = reports
            .entry(image.issued)
            .or_insert_with(|| AnomalyReport::new(image.issued));
        if let Some(slot) = (image.lead as usize)
            .checked_sub(1)
            .and_then(|i| report.values.get_mut(i))
        {
            *slot = Some(value);
        }
    }
    reports.into_values().collect()
}

/// Adds `fresh` reports to `existing`. Dates already present keep their stored values.
pub fn merge_reports(
    existing: Vec<AnomalyReport>,
    fresh: Vec<AnomalyReport>,
) -> Vec<AnomalyReport> {
    let mut merged: BTreeMap<NaiveDate, AnomalyReport> =
        existing.into_iter().map(|r| (r.issued, r)).collect();
    for report in fresh {
        merged.entry(report.issued).or_insert(report);
    }
    merged.into_values().collect()
}

/// Settings for processing forecast maps.
#[derive(Debug, Clone)]
pub struct AnomalyFetch {
    pub base_url: String,
    pub layout: MapLayout,
    pub workers: usize,
    /// Where to keep maps that fail calibration. `None` keeps nothing.
    pub diagnostics_dir: Option<PathBuf>,
}

impl AnomalyFetch {
    fn url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file)
    }

    /// Reads the index and processes every map of an issue date not in `known`.
    ///
    /// The index is always downloaded fresh. Maps are downloaded without caching and processed
    /// concurrently, at most `workers` at a time. The first failure aborts the whole run.
    pub async fn fetch_new_reports(
        &self,
        cache: &Arc<ResourceCache>,
        known: &HashSet<NaiveDate>,
    ) -> Result<Vec<AnomalyReport>, SourceError> {
        let index_url = self.url(INDEX_FILE);
        let index = cache.fetch_uncached(&index_url).await?;
        let index = String::from_utf8(index).map_err(|_| SourceError::NotText(index_url))?;

        let pending: Vec<AnomalyImage> = parse_index(&index)?
            .into_iter()
            .filter(|image| !known.contains(&image.issued))
            .collect();
        if pending.is_empty() {
            info!("No new seasonal anomaly maps");
            return Ok(Vec::new());
        }
        info!(
            "Processing {} seasonal anomaly maps with {} workers",
            pending.len(),
            self.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        let layout = Arc::new(self.layout.clone());
        let mut jobs = JoinSet::new();
        for image in pending {
            let semaphore = Arc::clone(&semaphore);
            let cache = Arc::clone(cache);
            let layout = Arc::clone(&layout);
            let url = self.url(&image.file);
            let diagnostics_dir = self.diagnostics_dir.clone();
            jobs.spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let value = process_map(&cache, &url, &image.file, layout, diagnostics_dir).await?;
                Ok::<_, SourceError>((image, value))
            });
        }

        let mut results = Vec::with_capacity(jobs.len());
        while let Some(joined) = jobs.join_next().await {
            results.push(joined??);
        }
        Ok(assemble_reports(results))
    }
}

async fn process_map(
    cache: &ResourceCache,
    url: &str,
    file: &str,
    layout: Arc<MapLayout>,
    diagnostics_dir: Option<PathBuf>,
) -> Result<f64, SourceError> {
    let bytes = cache.fetch_uncached(url).await?;
    let name = file.to_string();
    let (bytes, value) = task::spawn_blocking(move || {
        let value = decode_map(&bytes, &name).and_then(|map| read_anomaly(&map, &layout, &name));
        (bytes, value)
    })
    .await?;

    match value {
        Err(e @ (SourceError::Calibration { .. } | SourceError::MapLayout { .. })) => {
            if let Some(dir) = diagnostics_dir {
                keep_diagnostic_copy(dir, file, &bytes).await?;
            }
            Err(e)
        }
        other => other,
    }
}

async fn keep_diagnostic_copy(dir: PathBuf, file: &str, bytes: &[u8]) -> Result<(), SourceError> {
    ensure_dir_exists(&dir)
        .await
        .map_err(|e| SourceError::DiagnosticWrite(dir.clone(), e))?;
    let path = dir.join(format!("debug_{file}"));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| SourceError::DiagnosticWrite(path.clone(), e))?;
    warn!("Saved a copy of the problematic map as {:?}", path);
    Ok(())
}

fn lead_column(lead: usize) -> String {
    format!("month{lead}")
}

pub fn reports_to_frame(reports: &[AnomalyReport]) -> Result<DataFrame, TableError> {
    let mut columns = vec![Column::new(
        "date".into(),
        reports
            .iter()
            .map(|r| r.issued.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
    )];
    for lead in 1..=LEAD_MONTHS {
        columns.push(Column::new(
            lead_column(lead).into(),
            reports.iter().map(|r| r.values[lead - 1]).collect::<Vec<_>>(),
        ));
    }
    build_frame(SEASONAL_ANOMALIES_TABLE, columns)
}

pub fn reports_from_frame(df: &DataFrame) -> Result<Vec<AnomalyReport>, TableError> {
    let reader = FrameReader::new(SEASONAL_ANOMALIES_TABLE, df);
    let dates = reader.required_strings("date")?;
    let leads = (1..=LEAD_MONTHS)
        .map(|lead| reader.floats(&lead_column(lead)))
        .collect::<Result<Vec<_>, _>>()?;

    dates
        .iter()
        .enumerate()
        .map(|(row, date)| {
            let issued = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| reader.invalid("date", date))?;
            let mut report = AnomalyReport::new(issued);
            for (lead, values) in leads.iter().enumerate() {
                report.values[lead] = values[row];
            }
            Ok(report)
        })
        .collect()
}

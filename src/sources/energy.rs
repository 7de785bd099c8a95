//! Monthly energy records per building.

use crate::cache::resource_cache::ResourceCache;
use crate::sources::error::SourceError;
use crate::sources::{parse_json, url_with_params};
use crate::types::month::Month;
use crate::types::reporting_group::ReportingGroup;
use log::{debug, info};
use serde::Deserialize;

/// One month of metered consumption for a building.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyRecord {
    pub building_code: String,
    pub reporting_group: ReportingGroup,
    /// The month the raw timestamp falls in.
    pub month: Month,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnergyRecord {
    timestamp: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

pub fn energy_url(
    base_url: &str,
    building_code: &str,
    group: ReportingGroup,
    start: Month,
    end: Month,
) -> Result<String, SourceError> {
    let start = start.to_string();
    let end = end.to_string();
    url_with_params(
        base_url,
        &[
            ("Record", "BuildingCode"),
            ("SearchString", building_code),
            ("ReportingGroup", group.query_value()),
            ("StartTime", &start),
            ("EndTime", &end),
        ],
    )
}

/// Fetches the records of `building_code` for the months `start..=end`.
///
/// The query's end time is the first day after `end`, so the last month is complete. Records
/// outside the range are dropped.
///
/// # Errors
///
/// A building without data answers 404, which is returned as a [`SourceError::Cache`] error
/// for which `is_not_found()` holds.
pub async fn fetch_monthly_energy(
    cache: &ResourceCache,
    base_url: &str,
    building_code: &str,
    group: ReportingGroup,
    start: Month,
    end: Month,
) -> Result<Vec<EnergyRecord>, SourceError> {
    let url = energy_url(base_url, building_code, group, start, end.succ())?;
    let raw: Vec<RawEnergyRecord> = parse_json(&url, &cache.fetch(&url).await?)?;

    let mut records = Vec::with_capacity(raw.len());
    for record in raw {
        let month = Month::parse(&record.timestamp)?;
        if month < start || month > end {
            debug!("Dropping {} record outside {}..={}", building_code, start, end);
            continue;
        }
        records.push(EnergyRecord {
            building_code: building_code.to_string(),
            reporting_group: group,
            month,
            value: record.value,
            unit: record.unit,
        });
    }
    info!("{} {} records for building {}", records.len(), group, building_code);
    Ok(records)
}

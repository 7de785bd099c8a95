//! Property directory: one row per building, with coordinates.

use crate::cache::resource_cache::ResourceCache;
use crate::sources::error::SourceError;
use crate::sources::{parse_json, url_with_params};
use crate::table::{build_frame, FrameReader, TableError};
use log::{debug, info, warn};
use polars::prelude::{Column, DataFrame};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

pub const PROPERTIES_TABLE: &str = "properties";

/// A building-owning property with a known location.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub building_code: String,
    pub property_code: String,
    pub property_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A property as reported upstream, before required fields are enforced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawProperty {
    pub property_code: String,
    pub property_name: Option<String>,
    pub building_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertySummary {
    #[serde(default)]
    property_code: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyDetail {
    #[serde(default)]
    property_name: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default)]
    latitude: Option<Value>,
    #[serde(default)]
    longitude: Option<Value>,
    #[serde(default)]
    buildings: Vec<BuildingRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildingRef {
    #[serde(default)]
    building_code: Option<String>,
}

// The search endpoint answers with a list, but single objects show up as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailResponse {
    Many(Vec<PropertyDetail>),
    One(PropertyDetail),
}

impl DetailResponse {
    fn first(self) -> Option<PropertyDetail> {
        match self {
            DetailResponse::Many(details) => details.into_iter().next(),
            DetailResponse::One(detail) => Some(detail),
        }
    }
}

/// Numbers pass through; strings are parsed. Anything else, or a non-finite value, is absent.
fn coerce_coordinate(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl RawProperty {
    fn from_detail(
        property_code: String,
        listed_name: Option<String>,
        detail: PropertyDetail,
    ) -> Self {
        let building_code = detail
            .buildings
            .into_iter()
            .find_map(|b| non_blank(b.building_code));
        Self {
            property_code,
            property_name: non_blank(detail.property_name)
                .or_else(|| non_blank(detail.location_name))
                .or(listed_name),
            building_code,
            latitude: coerce_coordinate(detail.latitude.as_ref()),
            longitude: coerce_coordinate(detail.longitude.as_ref()),
        }
    }
}

/// Drops rows without a building code or coordinates, then keeps the first row per building.
pub fn normalize_properties(raw: Vec<RawProperty>) -> Vec<Property> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|p| {
            let (Some(building_code), Some(latitude), Some(longitude)) =
                (non_blank(p.building_code), p.latitude, p.longitude)
            else {
                debug!("Dropping property {} without building code or location", p.property_code);
                return None;
            };
            Some(Property {
                property_name: p.property_name.unwrap_or_else(|| p.property_code.clone()),
                property_code: p.property_code,
                building_code,
                latitude,
                longitude,
            })
        })
        .filter(|p| seen.insert(p.building_code.clone()))
        .collect()
}

/// Fetches the property index and every property's details.
///
/// Properties with a blank code are skipped, as are properties whose detail lookup answers 404.
pub async fn fetch_properties(
    cache: &ResourceCache,
    base_url: &str,
) -> Result<Vec<Property>, SourceError> {
    let base = base_url.trim_end_matches('/');
    let index_url = format!("{base}/Property/List");
    let summaries: Vec<PropertySummary> = parse_json(&index_url, &cache.fetch(&index_url).await?)?;
    info!("Property index lists {} properties", summaries.len());

    let search_url = format!("{base}/Property/Search");
    let mut raw = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let Some(code) = non_blank(summary.property_code) else {
            debug!("Skipping property without code ({:?})", summary.location_name);
            continue;
        };
        let url = url_with_params(
            &search_url,
            &[("Record", "PropertyCode"), ("SearchString", &code)],
        )?;
        let bytes = match cache.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                warn!("No details for property {}, skipping", code);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let response: DetailResponse = parse_json(&url, &bytes)?;
        match response.first() {
            Some(detail) => raw.push(RawProperty::from_detail(code, summary.location_name, detail)),
            None => warn!("Empty details for property {}, skipping", code),
        }
    }

    let properties = normalize_properties(raw);
    info!("{} properties with a building and location", properties.len());
    Ok(properties)
}

pub fn properties_to_frame(properties: &[Property]) -> Result<DataFrame, TableError> {
    build_frame(
        PROPERTIES_TABLE,
        vec![
            Column::new(
                "building_code".into(),
                properties.iter().map(|p| p.building_code.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "property_code".into(),
                properties.iter().map(|p| p.property_code.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "property_name".into(),
                properties.iter().map(|p| p.property_name.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "latitude".into(),
                properties.iter().map(|p| p.latitude).collect::<Vec<_>>(),
            ),
            Column::new(
                "longitude".into(),
                properties.iter().map(|p| p.longitude).collect::<Vec<_>>(),
            ),
        ],
    )
}

pub fn properties_from_frame(df: &DataFrame) -> Result<Vec<Property>, TableError> {
    let reader = FrameReader::new(PROPERTIES_TABLE, df);
    let building_codes = reader.required_strings("building_code")?;
    let property_codes = reader.required_strings("property_code")?;
    let names = reader.required_strings("property_name")?;
    let latitudes = reader.required_floats("latitude")?;
    let longitudes = reader.required_floats("longitude")?;

    Ok((0..reader.height())
        .map(|i| Property {
            building_code: building_codes[i].clone(),
            property_code: property_codes[i].clone(),
            property_name: names[i].clone(),
            latitude: latitudes[i],
            longitude: longitudes[i],
        })
        .collect())
}

//! Daily station observations from the FMI open data WFS, reduced to monthly temperatures.

use crate::cache::resource_cache::ResourceCache;
use crate::sources::error::SourceError;
use crate::sources::url_with_params;
use crate::table::{build_frame, FrameReader, TableError};
use crate::types::month::{Month, MonthWindow};
use chrono::NaiveDate;
use log::{debug, info, warn};
use polars::prelude::{Column, DataFrame};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

pub const DECADE_TEMPERATURES_TABLE: &str = "decade_temperatures";
pub const AVG_TEMPERATURES_TABLE: &str = "avg_temperatures";

/// Climatological averages are taken in Kelvin.
const KELVIN_OFFSET: f64 = 273.15;

const DAILY_QUERY: &str = "fmi::observations::weather::daily::timevaluepair";
/// Suffix of the `gml:id` of the daily mean temperature series.
const DAILY_MEAN_SERIES: &[u8] = b"-tday";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub temperature: f64,
}

/// Mean temperature of one month of the history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyTemperature {
    pub month: Month,
    pub avg_temp: f64,
}

/// Mean temperature of a calendar month (1 = January) across all years.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarMonthTemperature {
    pub month: u32,
    pub avg_temp: f64,
}

pub fn observations_url(base_url: &str, station: u32, year: i32) -> Result<String, SourceError> {
    let station = station.to_string();
    let start = format!("{year}-01-01T00:00:00Z");
    let end = format!("{year}-12-31T23:59:59Z");
    url_with_params(
        base_url,
        &[
            ("request", "getFeature"),
            ("storedquery_id", DAILY_QUERY),
            ("crs", "EPSG::3067"),
            ("fmisid", &station),
            ("starttime", &start),
            ("endtime", &end),
        ],
    )
}

/// Extracts the daily mean temperatures from a `timevaluepair` response.
///
/// Other series in the response (precipitation, snow depth, extremes) are ignored, as are
/// missing (`NaN`) values. A response without a daily mean series yields no observations.
pub fn parse_daily_observations(
    xml: &[u8],
    station: u32,
    year: i32,
) -> Result<Vec<DailyObservation>, SourceError> {
    let xml_error = |e: quick_xml::Error| SourceError::XmlParse {
        station,
        year,
        source: e,
    };

    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut observations = Vec::new();
    let mut found_series = false;
    let mut in_series = false;
    let mut field: Option<&'static str> = None;
    let mut time: Option<String> = None;
    let mut value: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"MeasurementTimeseries" => {
                    in_series = e.attributes().flatten().any(|attr| {
                        attr.key.as_ref() == b"gml:id" && attr.value.ends_with(DAILY_MEAN_SERIES)
                    });
                    found_series |= in_series;
                }
                b"time" if in_series => field = Some("time"),
                b"value" if in_series => field = Some("value"),
                _ => {}
            },
            Event::Text(t) => {
                let text = String::from_utf8_lossy(&t).trim().to_string();
                match field {
                    Some("time") => time = Some(text),
                    Some("value") => value = Some(text),
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"MeasurementTimeseries" => in_series = false,
                b"time" | b"value" => field = None,
                b"MeasurementTVP" => {
                    if let (Some(t), Some(v)) = (time.take(), value.take()) {
                        if let Some(observation) = to_observation(&t, &v) {
                            observations.push(observation);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !found_series {
        warn!("No daily mean series for station {} in {}", station, year);
    }
    Ok(observations)
}

fn to_observation(time: &str, value: &str) -> Option<DailyObservation> {
    let date = time
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let temperature = value.parse::<f64>().ok().filter(|v| v.is_finite());
    match (date, temperature) {
        (Some(date), Some(temperature)) => Some(DailyObservation { date, temperature }),
        _ => {
            debug!("Skipping observation {} = {}", time, value);
            None
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean per day of one station's observations.
pub fn daily_means(observations: &[DailyObservation]) -> BTreeMap<NaiveDate, f64> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for o in observations {
        by_day.entry(o.date).or_default().push(o.temperature);
    }
    by_day
        .into_iter()
        .filter_map(|(day, values)| mean(&values).map(|m| (day, m)))
        .collect()
}

/// Mean per day across stations. A day counts as long as one station observed it.
pub fn combine_stations(stations: &[BTreeMap<NaiveDate, f64>]) -> BTreeMap<NaiveDate, f64> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for station in stations {
        for (day, value) in station {
            by_day.entry(*day).or_default().push(*value);
        }
    }
    by_day
        .into_iter()
        .filter_map(|(day, values)| mean(&values).map(|m| (day, m)))
        .collect()
}

/// Monthly means of the days inside `window`. Months without observations are absent.
pub fn monthly_means(
    daily: &BTreeMap<NaiveDate, f64>,
    window: &MonthWindow,
) -> Vec<MonthlyTemperature> {
    let mut by_month: BTreeMap<Month, Vec<f64>> = BTreeMap::new();
    for (day, value) in daily {
        let month = Month::from_date(*day);
        if window.contains(month) {
            by_month.entry(month).or_default().push(*value);
        }
    }
    by_month
        .into_iter()
        .filter_map(|(month, values)| {
            mean(&values).map(|avg_temp| MonthlyTemperature { month, avg_temp })
        })
        .collect()
}

/// Per-calendar-month climatology of a monthly series.
pub fn monthly_averages(series: &[MonthlyTemperature]) -> Vec<CalendarMonthTemperature> {
    let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for t in series {
        by_month
            .entry(t.month.month())
            .or_default()
            .push(t.avg_temp + KELVIN_OFFSET);
    }
    by_month
        .into_iter()
        .filter_map(|(month, kelvin)| {
            mean(&kelvin).map(|k| CalendarMonthTemperature {
                month,
                avg_temp: k - KELVIN_OFFSET,
            })
        })
        .collect()
}

/// Monthly mean temperature over `window`, averaged across `stations`.
pub async fn fetch_decade_temperatures(
    cache: &ResourceCache,
    base_url: &str,
    stations: &[u32],
    window: &MonthWindow,
) -> Result<Vec<MonthlyTemperature>, SourceError> {
    let mut per_station = Vec::with_capacity(stations.len());
    for &station in stations {
        let mut observations = Vec::new();
        for year in window.years() {
            let url = observations_url(base_url, station, year)?;
            let xml = cache.fetch(&url).await?;
            observations.extend(parse_daily_observations(&xml, station, year)?);
        }
        debug!("{} daily observations for station {}", observations.len(), station);
        per_station.push(daily_means(&observations));
    }

    let monthly = monthly_means(&combine_stations(&per_station), window);
    info!(
        "{} monthly temperatures for {}..={} from {} stations",
        monthly.len(),
        window.start,
        window.end,
        stations.len()
    );
    Ok(monthly)
}

pub fn temperatures_to_frame(series: &[MonthlyTemperature]) -> Result<DataFrame, TableError> {
    build_frame(
        DECADE_TEMPERATURES_TABLE,
        vec![
            Column::new(
                "month".into(),
                series.iter().map(|t| t.month.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(
                "avg_temp".into(),
                series.iter().map(|t| t.avg_temp).collect::<Vec<_>>(),
            ),
        ],
    )
}

pub fn temperatures_from_frame(df: &DataFrame) -> Result<Vec<MonthlyTemperature>, TableError> {
    let reader = FrameReader::new(DECADE_TEMPERATURES_TABLE, df);
    let months = reader.required_strings("month")?;
    let temps = reader.required_floats("avg_temp")?;
    months
        .iter()
        .zip(temps)
        .map(|(month, avg_temp)| {
            let month = Month::parse(month).map_err(|_| reader.invalid("month", month))?;
            Ok(MonthlyTemperature { month, avg_temp })
        })
        .collect()
}

pub fn averages_to_frame(averages: &[CalendarMonthTemperature]) -> Result<DataFrame, TableError> {
    build_frame(
        AVG_TEMPERATURES_TABLE,
        vec![
            Column::new(
                "month".into(),
                averages.iter().map(|t| t.month as i64).collect::<Vec<_>>(),
            ),
            Column::new(
                "avg_temp".into(),
                averages.iter().map(|t| t.avg_temp).collect::<Vec<_>>(),
            ),
        ],
    )
}

pub fn averages_from_frame(df: &DataFrame) -> Result<Vec<CalendarMonthTemperature>, TableError> {
    let reader = FrameReader::new(AVG_TEMPERATURES_TABLE, df);
    let months = reader.required_integers("month")?;
    let temps = reader.required_floats("avg_temp")?;
    months
        .into_iter()
        .zip(temps)
        .map(|(month, avg_temp)| match u32::try_from(month) {
            Ok(m @ 1..=12) => Ok(CalendarMonthTemperature { month: m, avg_temp }),
            _ => Err(reader.invalid("month", month)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryTransport;
    use std::sync::Arc;

    const BASE: &str = "https://weather.test/wfs";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(m: u32, y: i32) -> Month {
        Month::new(m, y).unwrap()
    }

    fn timeseries(id: &str, points: &[(&str, &str)]) -> String {
        let points: String = points
            .iter()
            .map(|(t, v)| {
                format!(
                    "<wml2:point><wml2:MeasurementTVP><wml2:time>{t}</wml2:time>\
                     <wml2:value>{v}</wml2:value></wml2:MeasurementTVP></wml2:point>"
                )
            })
            .collect();
        format!(
            "<wfs:member><omso:PointTimeSeriesObservation><om:result>\
             <wml2:MeasurementTimeseries gml:id=\"{id}\">{points}</wml2:MeasurementTimeseries>\
             </om:result></omso:PointTimeSeriesObservation></wfs:member>"
        )
    }

    fn response(series: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" \
             xmlns:gml=\"http://www.opengis.net/gml/3.2\" \
             xmlns:om=\"http://www.opengis.net/om/2.0\" \
             xmlns:omso=\"http://inspire.ec.europa.eu/schemas/omso/3.0\" \
             xmlns:wml2=\"http://www.opengis.net/waterml/2.0\">{}</wfs:FeatureCollection>",
            series.concat()
        )
    }

    #[test]
    fn test_parse_picks_daily_mean_series() {
        let xml = response(&[
            timeseries("obs-obs-1-1-rrday", &[("2019-01-01T00:00:00Z", "4.2")]),
            timeseries(
                "obs-obs-1-1-tday",
                &[
                    ("2019-01-01T00:00:00Z", "-3.5"),
                    ("2019-01-02T00:00:00Z", "NaN"),
                    ("2019-01-03T00:00:00Z", "1.5"),
                ],
            ),
            timeseries("obs-obs-1-1-tmin", &[("2019-01-01T00:00:00Z", "-9.0")]),
        ]);
        let observations = parse_daily_observations(xml.as_bytes(), 1, 2019).unwrap();
        assert_eq!(
            observations,
            vec![
                DailyObservation { date: date(2019, 1, 1), temperature: -3.5 },
                DailyObservation { date: date(2019, 1, 3), temperature: 1.5 },
            ]
        );
    }

    #[test]
    fn test_parse_without_daily_series_is_empty() {
        let xml = response(&[timeseries("obs-obs-1-1-snow", &[("2019-01-01T00:00:00Z", "12")])]);
        assert!(parse_daily_observations(xml.as_bytes(), 1, 2019).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        assert!(matches!(
            parse_daily_observations(b"<a><b></a>", 7, 2019),
            Err(SourceError::XmlParse { station: 7, year: 2019, .. })
        ));
    }

    #[test]
    fn test_station_means_tolerate_gaps() {
        let a = BTreeMap::from([(date(2019, 1, 1), 1.0), (date(2019, 1, 2), 3.0)]);
        let b = BTreeMap::from([(date(2019, 1, 1), 3.0)]);
        let combined = combine_stations(&[a, b]);
        assert_eq!(combined[&date(2019, 1, 1)], 2.0);
        assert_eq!(combined[&date(2019, 1, 2)], 3.0);
    }

    #[test]
    fn test_monthly_means_stay_inside_window() {
        let daily = BTreeMap::from([
            (date(2018, 12, 31), 100.0),
            (date(2019, 1, 1), 1.0),
            (date(2019, 1, 31), 2.0),
            (date(2019, 2, 10), -4.0),
        ]);
        let window = MonthWindow::ending_at(month(12, 2019), 1);
        assert_eq!(
            monthly_means(&daily, &window),
            vec![
                MonthlyTemperature { month: month(1, 2019), avg_temp: 1.5 },
                MonthlyTemperature { month: month(2, 2019), avg_temp: -4.0 },
            ]
        );
    }

    #[test]
    fn test_climatology_per_calendar_month() {
        let series = [
            MonthlyTemperature { month: month(1, 2018), avg_temp: -6.0 },
            MonthlyTemperature { month: month(1, 2019), avg_temp: -2.0 },
            MonthlyTemperature { month: month(7, 2019), avg_temp: 18.0 },
        ];
        let averages = monthly_averages(&series);
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].month, 1);
        assert!((averages[0].avg_temp + 4.0).abs() < 1e-9);
        assert_eq!(averages[1].month, 7);
        assert!((averages[1].avg_temp - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_frames_round_trip() {
        let series = vec![
            MonthlyTemperature { month: month(1, 2019), avg_temp: -3.25 },
            MonthlyTemperature { month: month(2, 2019), avg_temp: -1.0 },
        ];
        let df = temperatures_to_frame(&series).unwrap();
        assert_eq!(temperatures_from_frame(&df).unwrap(), series);

        let averages = monthly_averages(&series);
        let df = averages_to_frame(&averages).unwrap();
        assert_eq!(averages_from_frame(&df).unwrap(), averages);
    }

    #[tokio::test]
    async fn test_fetch_averages_stations_per_day() -> Result<(), SourceError> {
        let window = MonthWindow::ending_at(month(12, 2019), 1);
        let first = response(&[timeseries(
            "obs-obs-1-1-tday",
            &[("2019-03-01T00:00:00Z", "2.0"), ("2019-03-02T00:00:00Z", "4.0")],
        )]);
        let second = response(&[timeseries(
            "obs-obs-1-1-tday",
            &[("2019-03-01T00:00:00Z", "6.0")],
        )]);
        let transport = MemoryTransport::new()
            .with_resource(observations_url(BASE, 1, 2019)?, first)
            .with_resource(observations_url(BASE, 2, 2019)?, second);
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::new(dir.path(), Arc::new(transport));

        let monthly = fetch_decade_temperatures(&cache, BASE, &[1, 2], &window).await?;
        // Day means 4.0 and 4.0
        assert_eq!(
            monthly,
            vec![MonthlyTemperature { month: month(3, 2019), avg_temp: 4.0 }]
        );
        Ok(())
    }
}

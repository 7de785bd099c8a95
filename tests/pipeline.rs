use chrono::NaiveDate;
use heat_prognosis::{
    energy_url, observations_url, HeatPipeline, MapLayout, MemoryTransport, Month, PipelineConfig,
    PipelineError, ReportingGroup, StoreReader, INDEX_FILE, NEGATIVE_SWATCHES, REFERENCE_COLORS,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::Url;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

const PROPERTIES: &str = "http://properties.test/api";
const ENERGY: &str = "http://energy.test/Monthly/ListByProperty";
const WEATHER: &str = "http://weather.test/wfs";
const SEASONAL: &str = "http://seasonal.test/forecast";
const STATION: u32 = 101004;

fn month(m: u32, y: i32) -> Month {
    Month::new(m, y).unwrap()
}

/// Colder in winter, warmer in summer.
fn temperature(calendar_month: u32) -> f64 {
    2.0 * calendar_month as f64 - 8.0
}

fn layout() -> MapLayout {
    MapLayout {
        width: 48,
        height: 32,
        probe_x: 30,
        probe_y: 20,
        calibration_row: 3,
        negative_start_col: 2,
        positive_start_col: 24,
        swatch_spacing: 2,
        fuzz_radius: 4,
    }
}

fn config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        cache_dir: Some(dir.join("cache")),
        store_dir: Some(dir.join("store")),
        history_years: 1,
        window_end: NaiveDate::from_ymd_opt(2019, 12, 1),
        workers: Some(2),
        anomaly_map: layout(),
        ..PipelineConfig::default()
    };
    config.endpoints.properties = PROPERTIES.to_string();
    config.endpoints.energy = ENERGY.to_string();
    config.endpoints.weather = WEATHER.to_string();
    config.endpoints.seasonal = SEASONAL.to_string();
    config.weather.stations = vec![STATION];
    config
}

fn property_url(code: &str) -> String {
    Url::parse_with_params(
        &format!("{PROPERTIES}/Property/Search"),
        &[("Record", "PropertyCode"), ("SearchString", code)],
    )
    .unwrap()
    .to_string()
}

fn weather_xml() -> String {
    let points: String = (1..=12)
        .map(|m| {
            format!(
                "<wml2:point><wml2:MeasurementTVP><wml2:time>2019-{m:02}-15T00:00:00Z</wml2:time>\
                 <wml2:value>{}</wml2:value></wml2:MeasurementTVP></wml2:point>",
                temperature(m)
            )
        })
        .chain(std::iter::once(
            "<wml2:point><wml2:MeasurementTVP><wml2:time>2019-06-16T00:00:00Z</wml2:time>\
             <wml2:value>NaN</wml2:value></wml2:MeasurementTVP></wml2:point>"
                .to_string(),
        ))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" \
         xmlns:gml=\"http://www.opengis.net/gml/3.2\" \
         xmlns:om=\"http://www.opengis.net/om/2.0\" \
         xmlns:wml2=\"http://www.opengis.net/waterml/2.0\">\
         <wfs:member><om:result>\
         <wml2:MeasurementTimeseries gml:id=\"obs-obs-1-1-tday\">\
         {points}</wml2:MeasurementTimeseries>\
         </om:result></wfs:member></wfs:FeatureCollection>"
    )
}

fn energy_json() -> String {
    let records: Vec<String> = (1..=12)
        .map(|m| {
            format!(
                r#"{{"timestamp": "2019-{m:02}-01T00:00:00", "reportingGroup": "Heat",
                    "value": {}, "unit": "MWh"}}"#,
                500.0 - 20.0 * temperature(m)
            )
        })
        .collect();
    format!("[{}]", records.join(","))
}

/// A legend with every reference color, and the color of `anomaly` under the probe.
fn anomaly_map(anomaly: f64) -> Vec<u8> {
    let layout = layout();
    let mut image = RgbaImage::from_pixel(layout.width, layout.height, Rgba([128, 128, 128, 255]));
    for (i, ([r, g, b], _)) in REFERENCE_COLORS.iter().enumerate() {
        let x = if i < NEGATIVE_SWATCHES.len() {
            layout.negative_start_col + i as u32 * layout.swatch_spacing
        } else {
            layout.positive_start_col + (i - NEGATIVE_SWATCHES.len()) as u32 * layout.swatch_spacing
        };
        image.put_pixel(x, layout.calibration_row, Rgba([*r, *g, *b, 255]));
    }
    let (probe, _) = REFERENCE_COLORS
        .iter()
        .find(|(_, value)| *value == anomaly)
        .unwrap();
    image.put_pixel(
        layout.probe_x,
        layout.probe_y,
        Rgba([probe[0], probe[1], probe[2], 255]),
    );

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn map_file(issued: &str, lead: u32) -> String {
    format!("SeasonalAnomalies_T2m_{issued}_m{lead}.png")
}

fn with_issue(mut transport: MemoryTransport, issued: &str, anomaly: f64) -> MemoryTransport {
    for lead in 1..=7 {
        transport = transport.with_resource(
            format!("{SEASONAL}/{}", map_file(issued, lead)),
            anomaly_map(anomaly),
        );
    }
    transport
}

fn index(issues: &[&str]) -> String {
    let mut lines = vec!["README.txt".to_string()];
    for issued in issues {
        lines.extend((1..=7).map(|lead| map_file(issued, lead)));
    }
    lines.join("\n")
}

fn first_run_transport() -> MemoryTransport {
    let window_start = month(1, 2019);
    let transport = MemoryTransport::new()
        .with_resource(
            format!("{PROPERTIES}/Property/List"),
            r#"[
                {"propertyCode": "P1", "locationName": "Kallio school"},
                {"propertyCode": "P2", "locationName": "Library"},
                {"propertyCode": "P3", "locationName": "Demolished"},
                {"propertyCode": " ", "locationName": "Unnamed"}
            ]"#,
        )
        .with_resource(
            property_url("P1"),
            r#"[{"propertyName": "Kallio school", "latitude": "60.18", "longitude": 24.95,
                 "buildings": [{"buildingCode": "B1"}]}]"#,
        )
        .with_resource(
            property_url("P2"),
            r#"{"propertyName": "Library", "latitude": 60.17, "longitude": 24.93,
                "buildings": [{"buildingCode": "B2"}]}"#,
        )
        .with_resource(
            observations_url(WEATHER, STATION, 2019).unwrap(),
            weather_xml(),
        )
        .with_resource(
            energy_url(ENERGY, "B1", ReportingGroup::Heat, window_start, month(1, 2020)).unwrap(),
            energy_json(),
        )
        .with_resource(format!("{SEASONAL}/{INDEX_FILE}"), index(&["20200901"]));
    with_issue(transport, "20200901", -1.0)
}

#[tokio::test]
async fn test_fetch_data_end_to_end() -> Result<(), PipelineError> {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(first_run_transport());
    let pipeline = HeatPipeline::with_transport(config(dir.path()), transport.clone())?;

    let data = pipeline.fetch_data().await?;

    // B2 has no energy data and P3 no details, so only B1 gets a model
    assert_eq!(data.buildings.len(), 1);
    let building = &data.buildings[0];
    assert_eq!(building.property.building_code, "B1");
    assert_eq!(building.property.property_name, "Kallio school");
    assert!((building.property.latitude - 60.18).abs() < 1e-9);
    assert_eq!(building.model.datapoints, 12);
    assert_eq!(building.model.heating_start, month(1, 2019));
    assert_eq!(building.model.heating_stop, month(12, 2019));
    assert!((building.model.linear.fit.coef + 20.0).abs() < 1e-6);
    assert!((building.model.linear.score - 1.0).abs() < 1e-9);

    assert_eq!(data.temperatures.len(), 12);
    assert_eq!(data.temperatures[0].month, month(1, 2019));
    assert!((data.temperatures[5].avg_temp - temperature(6)).abs() < 1e-9);
    assert_eq!(data.avg_temperatures.len(), 12);

    assert_eq!(data.seasonal_anomalies.len(), 1);
    assert_eq!(data.seasonal_anomalies[0].values, [Some(-1.0); 7]);

    // Every table is stored; a second run only re-reads the forecast index
    let requests = transport.total_requests();
    let again = pipeline.fetch_data().await?;
    assert_eq!(again.buildings.len(), 1);
    assert_eq!(transport.total_requests(), requests + 1);
    assert_eq!(transport.request_count(&format!("{SEASONAL}/{INDEX_FILE}")), 2);
    assert_eq!(
        transport.request_count(&format!("{SEASONAL}/{}", map_file("20200901", 1))),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_new_forecast_issues_are_appended() -> Result<(), PipelineError> {
    let dir = tempfile::tempdir().unwrap();
    let first = HeatPipeline::with_transport(config(dir.path()), Arc::new(first_run_transport()))?;
    first.fetch_data().await?;

    // A month later the index lists a new issue; the old maps are gone upstream
    let transport = with_issue(
        MemoryTransport::new().with_resource(
            format!("{SEASONAL}/{INDEX_FILE}"),
            index(&["20200901", "20201001"]),
        ),
        "20201001",
        1.0,
    );
    let transport = Arc::new(transport);
    let second = HeatPipeline::with_transport(config(dir.path()), transport.clone())?;
    let reports = second.seasonal_anomalies().await?;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].issued, NaiveDate::from_ymd_opt(2020, 9, 1).unwrap());
    assert_eq!(reports[0].values, [Some(-1.0); 7]);
    assert_eq!(reports[1].values, [Some(1.0); 7]);
    assert_eq!(
        transport.request_count(&format!("{SEASONAL}/{}", map_file("20200901", 1))),
        0
    );

    let reader = StoreReader::new(&dir.path().join("store"));
    let forecast = reader.prognosis().building("B1").call().await?;
    assert_eq!(forecast.len(), 7);
    // Lead 1 of the October issue is November: average 14 plus anomaly 1
    assert_eq!(forecast[0].month, month(11, 2020));
    assert!((forecast[0].temperature - 15.0).abs() < 1e-9);
    assert!((forecast[0].energy - 200.0).abs() < 1e-6);

    let september = reader.prognosis().building("B1").report_index(0).call().await?;
    assert_eq!(september[0].month, month(10, 2020));
    assert!((september[0].temperature - 11.0).abs() < 1e-9);
    Ok(())
}

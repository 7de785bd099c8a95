use heat_prognosis::{HeatPipeline, PipelineConfig, PipelineError, StoreReader};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    env_logger::init();

    // Optional path to a TOML config file
    let config = match env::args().nth(1) {
        Some(path) => PipelineConfig::from_toml_file(Path::new(&path))?,
        None => PipelineConfig::default(),
    };

    let pipeline = HeatPipeline::new(config)?;
    let data = pipeline.fetch_data().await?;
    println!(
        "{} buildings, {} months of temperatures, {} forecast issues",
        data.buildings.len(),
        data.temperatures.len(),
        data.seasonal_anomalies.len()
    );

    let Some(building) = data.buildings.first() else {
        return Ok(());
    };
    println!(
        "{} ({}): {} months, heating {}..={}",
        building.property.property_name,
        building.property.building_code,
        building.model.datapoints,
        building.model.heating_start,
        building.model.heating_stop
    );

    let reader = StoreReader::from_config(pipeline.config())?;
    for point in reader
        .prognosis()
        .building(&building.property.building_code)
        .call()
        .await?
    {
        println!("{}: {:.1} °C -> {:.0}", point.month, point.temperature, point.energy);
    }

    Ok(())
}

use anyhow::{Context, Result};
use relief::{GeoPoint, TerrainClass};
use serde::Serialize;

use super::{warn_failed_tiles, Settings};

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: f32,
    terrain: String,
    tile: String,
}

pub async fn run(settings: Settings, lat: f64, lon: f64, json: bool) -> Result<()> {
    let engine = settings.engine()?;
    let point = GeoPoint::new(lon, lat);

    let location = engine.locate(point).context("Invalid coordinate")?;
    let elevation = engine
        .elevation_at(point)
        .await
        .context("Failed to get elevation")?;
    let terrain = TerrainClass::classify(elevation);

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
            terrain: terrain.to_string(),
            tile: location.address.to_string(),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{:.1}", elevation);
    }

    warn_failed_tiles(&engine);
    Ok(())
}

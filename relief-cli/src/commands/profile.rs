use anyhow::{Context, Result};
use relief::{GeoPoint, ProfileRequest, ProfileResult};
use serde::Serialize;

use super::{warn_failed_tiles, Settings};

#[derive(Serialize)]
struct Position {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct ProfileResponse {
    from: Position,
    to: Position,
    samples: usize,
    distance_km: f64,
    min_elevation: Option<f32>,
    max_elevation: Option<f32>,
    elevations: Vec<f32>,
}

impl From<&ProfileResult> for ProfileResponse {
    fn from(result: &ProfileResult) -> Self {
        Self {
            from: Position {
                lat: result.a.lat,
                lon: result.a.lon,
            },
            to: Position {
                lat: result.b.lat,
                lon: result.b.lon,
            },
            samples: result.elevations.len(),
            distance_km: result.distance_km(),
            min_elevation: result.min(),
            max_elevation: result.max(),
            elevations: result.elevations.clone(),
        }
    }
}

pub async fn run(
    settings: Settings,
    from: GeoPoint,
    to: GeoPoint,
    samples: Option<usize>,
    json: bool,
    geojson: bool,
) -> Result<()> {
    let engine = settings.engine()?;
    let samples = samples.unwrap_or(engine.config().profile_samples);

    let result = engine
        .profile(ProfileRequest::new(from, to, samples))
        .await
        .context("Failed to sample profile")?;

    if json {
        println!("{}", serde_json::to_string(&ProfileResponse::from(&result))?);
    } else if geojson {
        let feature = relief::geojson::profile_to_feature(&result);
        println!("{}", serde_json::to_string_pretty(&feature)?);
    } else {
        println!("{:>6} {:>12} {:>12} {:>10}", "#", "lat", "lon", "elevation");
        for (i, (p, h)) in result.points().iter().zip(&result.elevations).enumerate() {
            println!("{:>6} {:>12.6} {:>12.6} {:>10.1}", i, p.lat, p.lon, h);
        }
        println!();
        println!("Distance: {:.1} km", result.distance_km());
        if let (Some(min), Some(max)) = (result.min(), result.max()) {
            println!("Min elevation: {:.1}m", min);
            println!("Max elevation: {:.1}m", max);
        }
    }

    warn_failed_tiles(&engine);
    Ok(())
}

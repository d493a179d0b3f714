pub mod batch;
pub mod heightfield;
pub mod profile;
pub mod query;
pub mod tile;

use anyhow::{Context, Result};
use relief::{ElevationEngine, GeoPoint, RegionBounds, TerrainConfig};

/// Options shared by every subcommand.
pub struct Settings {
    pub tile_server: Option<String>,
    pub zoom: Option<u8>,
}

impl Settings {
    /// Environment configuration with the command-line overrides applied.
    pub fn config(&self) -> Result<TerrainConfig> {
        let mut config = TerrainConfig::from_env().context("Invalid RELIEF_* configuration")?;

        if let Some(server) = &self.tile_server {
            config.tile_server = server.trim_end_matches('/').to_string();
        }
        if let Some(zoom) = self.zoom {
            config.dem_zoom = zoom;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Build the elevation engine.
    pub fn engine(&self) -> Result<ElevationEngine> {
        ElevationEngine::new(self.config()?).context("Failed to create elevation engine")
    }
}

/// Print a warning for tiles that could not be loaded.
pub fn warn_failed_tiles(engine: &ElevationEngine) {
    let failures = engine.store().stats().failure_count;
    if failures > 0 {
        eprintln!(
            "warning: {} tile(s) unavailable from {}, read as 0 m",
            failures,
            engine.store().source_description()
        );
    }
}

/// A point in the model-space square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPoint {
    pub x: f64,
    pub z: f64,
}

/// Parse `X,Z` into a model-space point.
pub fn parse_model_point(s: &str) -> std::result::Result<ModelPoint, String> {
    match parse_numbers(s)?[..] {
        [x, z] => Ok(ModelPoint { x, z }),
        _ => Err(format!("expected X,Z, got '{}'", s)),
    }
}

/// Parse `LAT,LON` into a point.
pub fn parse_lat_lon(s: &str) -> std::result::Result<GeoPoint, String> {
    match parse_numbers(s)?[..] {
        [lat, lon] => Ok(GeoPoint::new(lon, lat)),
        _ => Err(format!("expected LAT,LON, got '{}'", s)),
    }
}

/// Parse `MIN_LON,MIN_LAT,MAX_LON,MAX_LAT` into validated bounds.
pub fn parse_bounds(s: &str) -> std::result::Result<RegionBounds, String> {
    match parse_numbers(s)?[..] {
        [min_lon, min_lat, max_lon, max_lat] => {
            RegionBounds::new(min_lon, max_lon, min_lat, max_lat).map_err(|e| e.to_string())
        }
        _ => Err(format!("expected MIN_LON,MIN_LAT,MAX_LON,MAX_LAT, got '{}'", s)),
    }
}

fn parse_numbers(s: &str) -> std::result::Result<Vec<f64>, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{}'", part.trim()))
        })
        .collect()
}

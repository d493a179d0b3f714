use anyhow::{Context, Result};
use relief::{coords, GeoPoint};

use super::Settings;

pub async fn run(settings: Settings, lat: f64, lon: f64, fetch: bool) -> Result<()> {
    let engine = settings.engine()?;
    let config = engine.config();
    let point = GeoPoint::new(lon, lat);

    let location = engine.locate(point).context("Invalid coordinate")?;
    let bounds = location.address.bounds();
    let center = coords::pixel_center(location, config.tile_res);

    println!("Tile: {}", location.address);
    println!("Source: {}", engine.store().source_description());
    println!();
    println!(
        "Pixel: col {}, row {} ({}x{} samples)",
        location.col, location.row, config.tile_res, config.tile_res
    );
    println!("Pixel center: {}", center);
    println!(
        "Coverage: lon {:.6} to {:.6}, lat {:.6} to {:.6}",
        bounds.min_lon, bounds.max_lon, bounds.min_lat, bounds.max_lat
    );
    println!(
        "Resolution: {:.2} m/pixel (at the equator)",
        coords::resolution(location.address.zoom, config.tile_res)
    );

    if fetch {
        let raster = engine.store().get(location.address).await;
        let stats = engine.store().stats();
        println!();

        if stats.failure_count > 0 {
            println!("Status: unavailable, read as 0 m");
        } else {
            let (min, max) = raster.min_max();
            println!("Status: loaded");
            println!("Min elevation: {:.1}m", min);
            println!("Max elevation: {:.1}m", max);
            println!(
                "Elevation here: {:.1}m",
                raster.sample(location.col, location.row)
            );
        }
    }

    Ok(())
}

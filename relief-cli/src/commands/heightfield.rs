use anyhow::{bail, Context, Result};
use relief::{ElevationEngine, HeightField, Region, RegionBounds};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use super::{warn_failed_tiles, ModelPoint, Settings};

pub async fn run(
    settings: Settings,
    bounds: Option<RegionBounds>,
    model: Option<ModelPoint>,
    resolution: Option<usize>,
    exaggeration: Option<f32>,
    output: Option<PathBuf>,
) -> Result<()> {
    let engine = settings.engine()?;
    let resolution = resolution.unwrap_or(engine.config().tile_res as usize);
    let exaggeration = exaggeration.unwrap_or(engine.config().exaggeration);
    let region = region_for(&engine, bounds, model)?;

    let field = engine
        .build_height_field(region, resolution, exaggeration)
        .await
        .context("Failed to build height field")?;

    match &output {
        Some(path) => {
            let file = File::create(path).context("Failed to create output file")?;
            write_csv(&field, BufWriter::new(file))?;
            eprintln!("Output written to: {}", path.display());
        }
        None => write_csv(&field, io::stdout().lock())?,
    }

    let (min, max) = field
        .heights()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)));
    eprintln!(
        "{}x{} cells, height range {:.3} to {:.3} (exaggeration {})",
        resolution, resolution, min, max, exaggeration
    );

    warn_failed_tiles(&engine);
    Ok(())
}

fn region_for(
    engine: &ElevationEngine,
    bounds: Option<RegionBounds>,
    model: Option<ModelPoint>,
) -> Result<Region> {
    match (bounds, model) {
        (Some(bounds), _) => Ok(Region::Bounds(bounds)),
        (None, Some(point)) => Ok(engine.model_region(point.x, point.z)),
        (None, None) => bail!("Either --bounds or --model is required"),
    }
}

/// One row per cell: `row,col,lon,lat,height,slope`.
fn write_csv<W: Write>(field: &HeightField, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["row", "col", "lon", "lat", "height", "slope"])?;

    let n = field.resolution();
    for row in 0..n {
        for col in 0..n {
            let p = field.cell_point(row, col);
            let i = row * n + col;
            writer.write_record(&[
                row.to_string(),
                col.to_string(),
                format!("{:.6}", p.lon),
                format!("{:.6}", p.lat),
                field.heights()[i].to_string(),
                field.slopes()[i].to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

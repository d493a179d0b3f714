use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use relief::{ElevationEngine, GeoPoint};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{warn_failed_tiles, Settings};

pub async fn run(
    settings: Settings,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
) -> Result<()> {
    let engine = settings.engine()?;

    // Detect file format
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let output_path = match output {
        Some(path) => path,
        None => default_output(&input, &extension)?,
    };

    match extension.as_str() {
        "csv" => process_csv(&engine, &input, &output_path, &lat_col, &lon_col).await?,
        "geojson" | "json" => process_geojson(&engine, &input, &output_path).await?,
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    }

    println!("Output written to: {}", output_path.display());
    warn_failed_tiles(&engine);
    Ok(())
}

/// `data.csv` becomes `data_elevation.csv` next to the input.
fn default_output(input: &Path, extension: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .with_context(|| format!("Invalid input path: {}", input.display()))?
        .to_string_lossy();
    Ok(input.with_file_name(format!("{}_elevation.{}", stem, extension)))
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

async fn process_csv(
    engine: &ElevationEngine,
    input: &Path,
    output: &Path,
    lat_col: &str,
    lon_col: &str,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let points = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let field = |idx: usize, name: &str| -> Result<f64> {
                record
                    .get(idx)
                    .with_context(|| format!("Row {}: missing {}", i + 1, name))?
                    .trim()
                    .parse()
                    .with_context(|| format!("Row {}: invalid {}", i + 1, name))
            };
            Ok(GeoPoint::new(field(lon_idx, "longitude")?, field(lat_idx, "latitude")?))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = spinner(format!("Sampling {} points", points.len()))?;
    let elevations = engine
        .elevations_at(&points)
        .await
        .context("Failed to get elevations")?;
    pb.finish_with_message(format!("{} points done", points.len()));

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    for (record, elevation) in records.iter().zip(elevations) {
        let elevation = format!("{:.1}", elevation);
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&elevation);
        writer.write_record(&new_record)?;
    }

    writer.flush()?;
    Ok(())
}

async fn process_geojson(engine: &ElevationEngine, input: &Path, output: &Path) -> Result<()> {
    use relief::geojson::{add_elevations_to_features, add_elevations_to_geometry};

    let file = File::open(input).context("Failed to open input file")?;
    let geojson: geojson::GeoJson =
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let pb = spinner("Sampling coordinates".to_string())?;
    let result = match geojson {
        geojson::GeoJson::Geometry(geometry) => {
            geojson::GeoJson::Geometry(add_elevations_to_geometry(engine, geometry).await?)
        }
        geojson::GeoJson::Feature(mut feature) => {
            if let Some(geometry) = feature.geometry.take() {
                feature.geometry = Some(add_elevations_to_geometry(engine, geometry).await?);
            }
            geojson::GeoJson::Feature(feature)
        }
        geojson::GeoJson::FeatureCollection(mut fc) => {
            add_elevations_to_features(engine, &mut fc.features).await?;
            geojson::GeoJson::FeatureCollection(fc)
        }
    };
    pb.finish_with_message("done");

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief::coords::{pixel_center, PixelLocation};
    use relief::terrarium::encode_png;
    use relief::{DirTileSource, ElevationRaster, TerrainConfig, TileAddress, TileStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    const FUJI: TileAddress = TileAddress::new(7, 113, 50);

    fn test_engine(dir: &Path) -> ElevationEngine {
        let mut raster = ElevationRaster::from_fn(256, |_, _| 500.0);
        raster.set(128, 128, 3776.0);

        let source = DirTileSource::new(dir, "png");
        let path = source.path_for(FUJI);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, encode_png(&raster).unwrap()).unwrap();

        let store = TileStore::builder(Arc::new(source)).tile_res(256).build();
        ElevationEngine::with_store(Arc::new(store), TerrainConfig::default())
    }

    fn peak() -> GeoPoint {
        pixel_center(
            PixelLocation {
                address: FUJI,
                col: 128,
                row: 128,
            },
            256,
        )
    }

    #[tokio::test]
    async fn test_process_csv() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path());
        let p = peak();

        let input = dir.path().join("points.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &input,
            format!("name,lat,lon\npeak,{},{}\nflank,35.0,138.5\n", p.lat, p.lon),
        )
        .unwrap();

        process_csv(&engine, &input, &output, "lat", "lon").await.unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,lat,lon,elevation");
        assert!(lines[1].starts_with("peak,") && lines[1].ends_with(",3776.0"));
        assert!(lines[2].ends_with(",500.0"));
    }

    #[tokio::test]
    async fn test_process_csv_missing_column() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path());

        let input = dir.path().join("points.csv");
        std::fs::write(&input, "y,x\n35.0,138.5\n").unwrap();

        let result = process_csv(&engine, &input, &dir.path().join("out.csv"), "lat", "lon").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_process_geojson_feature_collection() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path());
        let p = peak();

        let input = dir.path().join("route.geojson");
        let output = dir.path().join("out.geojson");
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[p.lon, p.lat], [138.5, 35.0]]
                }
            }]
        });
        std::fs::write(&input, collection.to_string()).unwrap();

        process_geojson(&engine, &input, &output).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let coords = &value["features"][0]["geometry"]["coordinates"];
        assert_eq!(coords[0][2].as_f64().unwrap(), 3776.0);
        assert_eq!(coords[1][2].as_f64().unwrap(), 500.0);
    }

    #[test]
    fn test_default_output() {
        let path = default_output(Path::new("/data/points.csv"), "csv").unwrap();
        assert_eq!(path, PathBuf::from("/data/points_elevation.csv"));

        let path = default_output(Path::new("route.geojson"), "geojson").unwrap();
        assert_eq!(path, PathBuf::from("route_elevation.geojson"));
    }
}

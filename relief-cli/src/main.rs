use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{parse_bounds, parse_lat_lon, parse_model_point, ModelPoint, Settings};
use relief::{GeoPoint, RegionBounds};

/// Terrarium elevation data CLI tool
#[derive(Parser)]
#[command(name = "relief")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tile server base URL or local tile directory
    #[arg(short, long, env = "RELIEF_TILE_SERVER", global = true)]
    tile_server: Option<String>,

    /// Zoom level of the DEM tiles
    #[arg(short, long, env = "RELIEF_DEM_ZOOM", global = true)]
    zoom: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Sample an elevation profile between two points
    Profile {
        /// Start point as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        from: GeoPoint,

        /// End point as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        to: GeoPoint,

        /// Number of samples (default from RELIEF_PROFILE_SAMPLES)
        #[arg(short, long)]
        samples: Option<usize>,

        /// Output result as JSON
        #[arg(short, long, conflicts_with = "geojson")]
        json: bool,

        /// Output result as a GeoJSON LineString feature
        #[arg(short, long)]
        geojson: bool,
    },

    /// Build a height field over a region and write it as CSV
    #[command(group(clap::ArgGroup::new("region").required(true).args(["bounds", "model"])))]
    Heightfield {
        /// Region as MIN_LON,MIN_LAT,MAX_LON,MAX_LAT
        #[arg(long, value_parser = parse_bounds, allow_hyphen_values = true)]
        bounds: Option<RegionBounds>,

        /// DEM tile under a model-space point X,Z (square side from RELIEF_MODEL_SIZE)
        #[arg(long, value_parser = parse_model_point, allow_hyphen_values = true)]
        model: Option<ModelPoint>,

        /// Cells per side (default: tile resolution)
        #[arg(short, long)]
        resolution: Option<usize>,

        /// Vertical exaggeration (default from RELIEF_EXAGGERATION)
        #[arg(short, long)]
        exaggeration: Option<f32>,

        /// Output CSV file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Process elevation for multiple coordinates from a file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Display information about the DEM tile under a coordinate
    Tile {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Also fetch the tile and report its elevation range
        #[arg(short, long)]
        fetch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings {
        tile_server: cli.tile_server,
        zoom: cli.zoom,
    };

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(settings, lat, lon, json).await,
        Commands::Profile {
            from,
            to,
            samples,
            json,
            geojson,
        } => commands::profile::run(settings, from, to, samples, json, geojson).await,
        Commands::Heightfield {
            bounds,
            model,
            resolution,
            exaggeration,
            output,
        } => {
            commands::heightfield::run(settings, bounds, model, resolution, exaggeration, output)
                .await
        }
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(settings, input, output, lat_col, lon_col).await,
        Commands::Tile { lat, lon, fetch } => commands::tile::run(settings, lat, lon, fetch).await,
    }
}

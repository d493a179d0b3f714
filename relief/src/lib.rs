//! # Relief - Terrarium Elevation Library
//!
//! Async library for resolving terrain elevation from Terrarium-encoded DEM
//! tiles served on a spherical Web-Mercator slippy-map grid.
//!
//! ## Features
//!
//! - **Exact tile math**: invertible geographic ↔ Web-Mercator ↔ tile/pixel transforms
//! - **Coalesced fetching**: concurrent requests for one tile share a single download
//! - **Graceful degradation**: unavailable tiles read as 0 m and are reported, never raised
//! - **Batch queries**: height fields and profiles fetch each distinct tile once
//!
//! ## Quick Start
//!
//! ```ignore
//! use relief::{ElevationEngine, GeoPoint, Region, RegionBounds, TerrainConfig};
//!
//! let engine = ElevationEngine::new(TerrainConfig::default())?;
//!
//! // Single point
//! let h = engine.elevation_at(GeoPoint::new(138.7274, 35.3606)).await?;
//! println!("Elevation: {}m", h);
//!
//! // Profile between two points
//! let profile = engine
//!     .sample_profile(GeoPoint::new(138.5, 35.2), GeoPoint::new(138.9, 35.5), 200)
//!     .await?;
//!
//! // Height field over a region
//! let bounds = RegionBounds::new(138.0, 139.5, 35.0, 36.0)?;
//! let field = engine.build_height_field(Region::Bounds(bounds), 128, 3.0).await?;
//! ```
//!
//! ## Terrarium Encoding
//!
//! Each tile is a `256×256` RGB image; a pixel decodes to
//! `(r·256 + g + b/256) − 32768` metres.
//!
//! ## Data Sources
//!
//! The default tile server is the public Terrarium set on AWS Open Data:
//! - <https://registry.opendata.aws/terrain-tiles/>

pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod profile;
pub mod store;
pub mod terrarium;
pub mod tile;

#[cfg(feature = "geojson")]
pub mod geojson;

#[cfg(test)]
mod testing;

// Re-export main types at crate root for convenience
pub use config::{FailurePolicy, TerrainConfig};
pub use coords::{GeoPoint, PixelLocation, ProjectedPoint, RegionBounds, TileAddress};
pub use engine::{ElevationEngine, HeightField, Region, TerrainClass};
pub use error::{ReliefError, Result};
pub use fetch::{DirTileSource, TileSource};
#[cfg(feature = "http")]
pub use fetch::{FetchConfig, HttpTileSource};
pub use profile::{ProfileRequest, ProfileResult};
pub use store::{CacheStats, PreloadStats, TileStore, TileStoreBuilder};
pub use tile::ElevationRaster;

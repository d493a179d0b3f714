//! Elevation queries over cached DEM tiles.
//!
//! [`ElevationEngine`] composes the coordinate transform, the tile store and
//! the raster helpers to answer point queries, batch queries and height-field
//! requests.
//!
//! # Tile Grouping
//!
//! Batch operations project every input first, group the results by tile
//! address and then fetch each distinct tile once, concurrently. Results are
//! written back by input index, so output order never depends on which fetch
//! finishes first.
//!
//! # Precision
//!
//! Lookups return the nearest raster sample; no bilinear interpolation is
//! performed.

use std::fmt;
use std::sync::Arc;

use crate::config::TerrainConfig;
use crate::coords::{
    locate, model_to_geographic, pixel_center, to_projected, GeoPoint, PixelLocation,
    RegionBounds, TileAddress,
};
use crate::error::{ReliefError, Result};
use crate::store::{TileStore, TileStoreBuilder};

/// Area covered by a height field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// An explicit geographic rectangle.
    Bounds(RegionBounds),
    /// The DEM tile under a point of the model-space square.
    ///
    /// `(x, z)` is mapped through [`model_to_geographic`] with a square of
    /// side `size`; the field then spans that whole tile. See
    /// [`ElevationEngine::model_region`] for the configured square.
    Model { x: f64, z: f64, size: f64 },
}

impl From<RegionBounds> for Region {
    fn from(bounds: RegionBounds) -> Self {
        Region::Bounds(bounds)
    }
}

/// How grid cells map onto the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CellLayout {
    /// Evenly spaced in lon/lat across the bounds.
    Geographic,
    /// Evenly spaced over the pixels of one DEM tile.
    TilePixels { address: TileAddress, tile_res: u32 },
}

/// Square grid of scaled heights and slopes.
///
/// Both grids are row-major with row 0 on the northern edge and column 0 on
/// the western edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    resolution: usize,
    bounds: RegionBounds,
    layout: CellLayout,
    heights: Vec<f32>,
    slopes: Vec<f32>,
}

impl HeightField {
    /// Cells per row/column.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Geographic extent the grid spans.
    pub fn bounds(&self) -> RegionBounds {
        self.bounds
    }

    /// Scaled heights (`raw · exaggeration / 1000`).
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Central-difference slopes of the raw raster, in metres per sample step.
    pub fn slopes(&self) -> &[f32] {
        &self.slopes
    }

    /// Height of one cell.
    pub fn height(&self, row: usize, col: usize) -> Option<f32> {
        self.index(row, col).map(|i| self.heights[i])
    }

    /// Slope of one cell.
    pub fn slope(&self, row: usize, col: usize) -> Option<f32> {
        self.index(row, col).map(|i| self.slopes[i])
    }

    /// Geographic position the cell was sampled at.
    ///
    /// For bounds regions this is the lattice point itself; for model regions
    /// it is the centre of the tile pixel the cell reads.
    pub fn cell_point(&self, row: usize, col: usize) -> GeoPoint {
        match self.layout {
            CellLayout::Geographic => bounds_lattice_point(&self.bounds, self.resolution, row, col),
            CellLayout::TilePixels { address, tile_res } => {
                let step = |i| pixel_step(i, self.resolution, tile_res);
                let location = PixelLocation {
                    address,
                    col: step(col),
                    row: step(row),
                };
                pixel_center(location, tile_res)
            }
        }
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.resolution && col < self.resolution).then(|| row * self.resolution + col)
    }
}

/// Coarse land-cover band for an elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainClass {
    /// At or below sea level.
    Water,
    /// Up to 50 m above sea level.
    Sand,
    /// Everything between sand and mountain.
    Plain,
    /// 1000 m and above.
    Mountain,
    /// 2500 m and above.
    Snow,
}

impl TerrainClass {
    const WATER_LEVEL: f32 = 0.0;
    const SAND_BAND: f32 = 50.0;
    const MOUNTAIN_LEVEL: f32 = 1000.0;
    const SNOW_LEVEL: f32 = 2500.0;

    /// Classify a raw elevation in metres.
    pub fn classify(elevation: f32) -> Self {
        if elevation <= Self::WATER_LEVEL {
            TerrainClass::Water
        } else if elevation <= Self::WATER_LEVEL + Self::SAND_BAND {
            TerrainClass::Sand
        } else if elevation >= Self::SNOW_LEVEL {
            TerrainClass::Snow
        } else if elevation >= Self::MOUNTAIN_LEVEL {
            TerrainClass::Mountain
        } else {
            TerrainClass::Plain
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainClass::Water => "water",
            TerrainClass::Sand => "sand",
            TerrainClass::Plain => "plain",
            TerrainClass::Mountain => "mountain",
            TerrainClass::Snow => "snow",
        }
    }
}

impl fmt::Display for TerrainClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers elevation queries through a shared [`TileStore`].
///
/// # Example
///
/// ```ignore
/// use relief::{ElevationEngine, GeoPoint, TerrainConfig};
///
/// let engine = ElevationEngine::new(TerrainConfig::default())?;
/// let fuji = engine.elevation_at(GeoPoint::new(138.7274, 35.3606)).await?;
/// ```
pub struct ElevationEngine {
    store: Arc<TileStore>,
    config: TerrainConfig,
}

impl ElevationEngine {
    /// Create an engine and its tile store from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the tile source
    /// cannot be created.
    pub fn new(config: TerrainConfig) -> Result<Self> {
        config.validate()?;
        let store = TileStoreBuilder::from_config(&config)?.build();
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Create an engine configured from `RELIEF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(TerrainConfig::from_env()?)
    }

    /// Create an engine over an existing store.
    ///
    /// The store's tile resolution takes precedence over `config.tile_res`.
    pub fn with_store(store: Arc<TileStore>, mut config: TerrainConfig) -> Self {
        config.tile_res = store.tile_res();
        Self { store, config }
    }

    /// The underlying tile store.
    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    /// The engine configuration.
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Tile and pixel that answer queries for a point at the DEM zoom.
    pub fn locate(&self, point: GeoPoint) -> Result<PixelLocation> {
        let projected = to_projected(point)?;
        Ok(locate(projected, self.config.dem_zoom, self.config.tile_res))
    }

    /// Elevation in metres at a geographic point.
    ///
    /// # Errors
    ///
    /// Only [`ReliefError::ProjectionSingularity`]; tile failures read as 0 m.
    pub async fn elevation_at(&self, point: GeoPoint) -> Result<f32> {
        let location = self.locate(point)?;
        let raster = self.store.get(location.address).await;
        Ok(raster.sample(location.col, location.row))
    }

    /// Elevations for many points, in input order.
    ///
    /// Every point is projected before anything is fetched, so one bad
    /// latitude fails the whole call without touching the network.
    pub async fn elevations_at(&self, points: &[GeoPoint]) -> Result<Vec<f32>> {
        let locations = points
            .iter()
            .map(|&point| self.locate(point))
            .collect::<Result<Vec<_>>>()?;

        let tiles = self
            .store
            .get_many(locations.iter().map(|loc| loc.address))
            .await;

        tracing::debug!(points = points.len(), tiles = tiles.len(), "Batch elevation query");

        Ok(locations
            .iter()
            .map(|loc| tiles[&loc.address].sample(loc.col, loc.row))
            .collect())
    }

    /// Build a `grid_resolution × grid_resolution` height field.
    ///
    /// Each cell stores `raw · vertical_exaggeration / 1000` and the slope of
    /// the raster at the sampled pixel.
    ///
    /// # Errors
    ///
    /// [`ReliefError::InvalidGridResolution`] for `grid_resolution < 2`,
    /// [`ReliefError::InvalidRegion`] for malformed bounds, and
    /// [`ReliefError::ProjectionSingularity`] for unprojectable cells. All are
    /// reported before any tile is fetched.
    pub async fn build_height_field(
        &self,
        region: Region,
        grid_resolution: usize,
        vertical_exaggeration: f32,
    ) -> Result<HeightField> {
        if grid_resolution < 2 {
            return Err(ReliefError::InvalidGridResolution {
                resolution: grid_resolution,
            });
        }

        let (bounds, layout, locations) = self.lattice(region, grid_resolution)?;
        let tiles = self
            .store
            .get_many(locations.iter().map(|loc| loc.address))
            .await;

        tracing::debug!(
            resolution = grid_resolution,
            cells = locations.len(),
            tiles = tiles.len(),
            "Building height field"
        );

        let mut heights = Vec::with_capacity(locations.len());
        let mut slopes = Vec::with_capacity(locations.len());
        for loc in &locations {
            let raster = &tiles[&loc.address];
            heights.push(raster.sample(loc.col, loc.row) * vertical_exaggeration / 1000.0);
            slopes.push(raster.slope(loc.col, loc.row));
        }

        Ok(HeightField {
            resolution: grid_resolution,
            bounds,
            layout,
            heights,
            slopes,
        })
    }

    /// [`build_height_field`](Self::build_height_field) with one cell per tile
    /// sample and the configured exaggeration.
    pub async fn build_height_field_default(&self, region: Region) -> Result<HeightField> {
        self.build_height_field(region, self.config.tile_res as usize, self.config.exaggeration)
            .await
    }

    /// Model region at `(x, z)` in the configured model-space square
    /// (`config.model_size`).
    pub fn model_region(&self, x: f64, z: f64) -> Region {
        Region::Model {
            x,
            z,
            size: self.config.model_size,
        }
    }

    /// Geographic extent of a region.
    ///
    /// # Errors
    ///
    /// [`ReliefError::InvalidRegion`] for malformed bounds and
    /// [`ReliefError::InvalidCoordinate`] for a non-positive model size or
    /// non-finite model coordinates.
    pub fn resolve_region(&self, region: Region) -> Result<RegionBounds> {
        match region {
            Region::Bounds(bounds) => {
                bounds.validate()?;
                Ok(bounds)
            }
            Region::Model { x, z, size } => Ok(self.model_tile(x, z, size)?.bounds()),
        }
    }

    /// DEM tile under a model-space point.
    fn model_tile(&self, x: f64, z: f64, size: f64) -> Result<TileAddress> {
        if !(size.is_finite() && size > 0.0) {
            return Err(ReliefError::InvalidCoordinate {
                message: format!("model size must be positive, got {size}"),
            });
        }
        if !(x.is_finite() && z.is_finite()) {
            return Err(ReliefError::InvalidCoordinate {
                message: format!("model point ({x}, {z}) is not finite"),
            });
        }
        Ok(self.locate(model_to_geographic(x, z, size))?.address)
    }

    /// Pixel sampled by every cell of the grid, row-major.
    fn lattice(
        &self,
        region: Region,
        n: usize,
    ) -> Result<(RegionBounds, CellLayout, Vec<PixelLocation>)> {
        let mut cells = Vec::with_capacity(n * n);

        match region {
            Region::Bounds(bounds) => {
                bounds.validate()?;
                for row in 0..n {
                    for col in 0..n {
                        cells.push(self.locate(bounds_lattice_point(&bounds, n, row, col))?);
                    }
                }
                Ok((bounds, CellLayout::Geographic, cells))
            }
            Region::Model { x, z, size } => {
                let address = self.model_tile(x, z, size)?;
                let tile_res = self.config.tile_res;
                for row in 0..n {
                    for col in 0..n {
                        cells.push(PixelLocation {
                            address,
                            col: pixel_step(col, n, tile_res),
                            row: pixel_step(row, n, tile_res),
                        });
                    }
                }
                let layout = CellLayout::TilePixels { address, tile_res };
                Ok((address.bounds(), layout, cells))
            }
        }
    }
}

/// Tile pixel read by grid index `i` of `n` when the grid spans one tile;
/// `n == tile_res` is 1:1.
fn pixel_step(i: usize, n: usize, tile_res: u32) -> u32 {
    let last = tile_res.saturating_sub(1) as f64;
    let span = n.saturating_sub(1).max(1) as f64;
    ((i as f64 * last / span).round() as u32).min(tile_res.saturating_sub(1))
}

/// Affine map from grid index to lon/lat, row 0 on the northern edge.
fn bounds_lattice_point(bounds: &RegionBounds, n: usize, row: usize, col: usize) -> GeoPoint {
    let last = n.saturating_sub(1).max(1) as f64;
    GeoPoint {
        lon: bounds.min_lon + (bounds.max_lon - bounds.min_lon) * col as f64 / last,
        lat: bounds.max_lat - (bounds.max_lat - bounds.min_lat) * row as f64 / last,
    }
}

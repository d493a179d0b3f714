//! Error types for the relief library.

use thiserror::Error;

use crate::coords::TileAddress;

/// Errors that can occur when resolving elevations.
#[derive(Error, Debug)]
pub enum ReliefError {
    /// Latitude at or beyond the poles, where Web-Mercator is singular.
    #[error("Projection singularity: lat={lat} (valid: |lat| < 90°, practical limit ±85.05°)")]
    ProjectionSingularity { lat: f64 },

    /// Region bounds are empty or inverted.
    #[error(
        "Invalid region: lon [{min_lon}, {max_lon}], lat [{min_lat}, {max_lat}] (min must be < max)"
    )]
    InvalidRegion {
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    },

    /// A profile needs at least both endpoints.
    #[error("Invalid sample count: {count} (at least 2 required)")]
    InvalidSampleCount { count: usize },

    /// A height field needs at least a 2×2 lattice.
    #[error("Invalid grid resolution: {resolution} (at least 2 required)")]
    InvalidGridResolution { resolution: usize },

    /// A coordinate that cannot be read as `[lon, lat, ...]`.
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    /// Zoom level outside what the tile grid can address.
    #[error("Invalid zoom level: {zoom} (valid: 0-24)")]
    InvalidZoom { zoom: u8 },

    /// Network or transport failure while fetching a tile.
    #[error("Failed to fetch tile {address}: {reason}")]
    TileFetch { address: TileAddress, reason: String },

    /// Fetched bytes could not be decoded into an elevation raster.
    #[error("Failed to decode tile {address}: {reason}")]
    Decode { address: TileAddress, reason: String },

    /// A configuration value could not be parsed.
    #[error("Invalid configuration: {key}={value}")]
    Config { key: String, value: String },

    /// IO error when reading local tiles.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReliefError {
    /// Whether the error describes a malformed request that was rejected
    /// before any tile was fetched.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            ReliefError::InvalidRegion { .. }
                | ReliefError::InvalidSampleCount { .. }
                | ReliefError::InvalidGridResolution { .. }
                | ReliefError::InvalidCoordinate { .. }
        )
    }
}

/// Result type alias using [`ReliefError`].
pub type Result<T> = std::result::Result<T, ReliefError>;

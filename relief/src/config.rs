//! Terrain configuration.
//!
//! [`TerrainConfig`] is built once and handed to the tile store and query
//! engine at construction time. Nothing reads configuration from global state.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RELIEF_TILE_RES` | Samples per tile row/column | 256 |
//! | `RELIEF_DEM_ZOOM` | Zoom level of the DEM tiles | 7 |
//! | `RELIEF_EXAGGERATION` | Vertical exaggeration for height fields | 3.0 |
//! | `RELIEF_PROFILE_SAMPLES` | Default profile sample count | 200 |
//! | `RELIEF_MODEL_SIZE` | Side length of the model-space square | 100 |
//! | `RELIEF_TILE_SERVER` | Tile server base URL or local directory | AWS Terrarium |
//! | `RELIEF_TILE_EXT` | Tile file extension | png |
//! | `RELIEF_CACHE_CAPACITY` | Maximum tiles in cache | unbounded |
//! | `RELIEF_FAILURE_POLICY` | `cache` or `retry` for failed tiles | cache |
//! | `RELIEF_TIMEOUT_SECS` | HTTP request timeout | 30 |
//! | `RELIEF_MAX_RETRIES` | HTTP retry attempts | 0 |
//! | `RELIEF_MAX_CONCURRENT_FETCHES` | Tile fetches in flight at once | 16 |

use std::fmt;
use std::str::FromStr;

use crate::coords::MAX_ZOOM;
use crate::error::{ReliefError, Result};
use crate::tile::DEFAULT_TILE_RES;

/// Public Terrarium tile set on AWS Open Data.
pub const DEFAULT_TILE_SERVER: &str = "https://s3.amazonaws.com/elevation-tiles-prod/terrarium";

/// Default DEM zoom level.
pub const DEFAULT_DEM_ZOOM: u8 = 7;

/// Default vertical exaggeration.
pub const DEFAULT_EXAGGERATION: f32 = 3.0;

/// Default number of profile samples.
pub const DEFAULT_PROFILE_SAMPLES: usize = 200;

/// Default number of tile fetches allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// What the tile store keeps after a tile fails to fetch or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Cache the zero-filled substitute permanently (until `clear()`).
    #[default]
    CacheZero,
    /// Hand out a zero-filled substitute but fetch again on the next access.
    Retry,
}

impl FromStr for FailurePolicy {
    type Err = ReliefError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cache" | "cache-zero" | "zero" => Ok(FailurePolicy::CacheZero),
            "retry" => Ok(FailurePolicy::Retry),
            _ => Err(ReliefError::Config {
                key: "RELIEF_FAILURE_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::CacheZero => f.write_str("cache"),
            FailurePolicy::Retry => f.write_str("retry"),
        }
    }
}

/// Configuration shared by the tile store and the query engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainConfig {
    /// Samples per tile row/column.
    pub tile_res: u32,
    /// Zoom level of the DEM tiles.
    pub dem_zoom: u8,
    /// Vertical exaggeration applied by height fields.
    pub exaggeration: f32,
    /// Default number of profile samples.
    pub profile_samples: usize,
    /// Side length of the model-space square.
    pub model_size: f64,
    /// Tile server base (`http(s)://...`) or local directory.
    pub tile_server: String,
    /// Tile file extension, without the dot.
    pub tile_ext: String,
    /// Maximum number of cached tiles; `None` keeps every tile.
    pub cache_capacity: Option<u64>,
    /// Handling of failed tiles.
    pub failure_policy: FailurePolicy,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// HTTP retry attempts after the first failure.
    pub max_retries: u32,
    /// Upper bound on tile fetches running at the same time.
    pub max_concurrent_fetches: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            tile_res: DEFAULT_TILE_RES,
            dem_zoom: DEFAULT_DEM_ZOOM,
            exaggeration: DEFAULT_EXAGGERATION,
            profile_samples: DEFAULT_PROFILE_SAMPLES,
            model_size: 100.0,
            tile_server: DEFAULT_TILE_SERVER.to_string(),
            tile_ext: "png".to_string(),
            cache_capacity: None,
            failure_policy: FailurePolicy::CacheZero,
            timeout_secs: 30,
            max_retries: 0,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl TerrainConfig {
    /// Load configuration from `RELIEF_*` environment variables, using the
    /// defaults for anything unset.
    ///
    /// ```bash
    /// export RELIEF_DEM_ZOOM=9
    /// export RELIEF_TILE_SERVER=/data/terrarium
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::Config`] if a variable is set but cannot be
    /// parsed, or the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("RELIEF_TILE_RES")? {
            config.tile_res = v;
        }
        if let Some(v) = env_parse("RELIEF_DEM_ZOOM")? {
            config.dem_zoom = v;
        }
        if let Some(v) = env_parse("RELIEF_EXAGGERATION")? {
            config.exaggeration = v;
        }
        if let Some(v) = env_parse("RELIEF_PROFILE_SAMPLES")? {
            config.profile_samples = v;
        }
        if let Some(v) = env_parse("RELIEF_MODEL_SIZE")? {
            config.model_size = v;
        }
        if let Ok(v) = std::env::var("RELIEF_TILE_SERVER") {
            config.tile_server = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("RELIEF_TILE_EXT") {
            config.tile_ext = v.trim_start_matches('.').to_string();
        }
        if let Some(v) = env_parse("RELIEF_CACHE_CAPACITY")? {
            config.cache_capacity = Some(v);
        }
        if let Some(v) = env_parse("RELIEF_FAILURE_POLICY")? {
            config.failure_policy = v;
        }
        if let Some(v) = env_parse("RELIEF_TIMEOUT_SECS")? {
            config.timeout_secs = v;
        }
        if let Some(v) = env_parse("RELIEF_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parse("RELIEF_MAX_CONCURRENT_FETCHES")? {
            config.max_concurrent_fetches = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.dem_zoom > MAX_ZOOM {
            return Err(ReliefError::InvalidZoom {
                zoom: self.dem_zoom,
            });
        }
        if self.tile_res < 3 {
            return Err(config_error("RELIEF_TILE_RES", self.tile_res));
        }
        if self.profile_samples < 2 {
            return Err(ReliefError::InvalidSampleCount {
                count: self.profile_samples,
            });
        }
        if self.model_size.is_nan() || self.model_size <= 0.0 {
            return Err(config_error("RELIEF_MODEL_SIZE", self.model_size));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(config_error("RELIEF_MAX_CONCURRENT_FETCHES", 0));
        }
        Ok(())
    }

    /// Whether tiles come from a remote server rather than a local directory.
    pub fn is_remote(&self) -> bool {
        self.tile_server.starts_with("http://") || self.tile_server.starts_with("https://")
    }
}

fn config_error(key: &str, value: impl ToString) -> ReliefError {
    ReliefError::Config {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parse an environment variable if it is set.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| config_error(key, raw)),
        Err(_) => Ok(None),
    }
}

//! Tile transport.
//!
//! The tile store reaches raster bytes through the [`TileSource`] trait. Two
//! implementations are provided:
//!
//! - [`HttpTileSource`] (feature `http`, on by default): one `GET` per tile
//!   against a slippy-map server.
//! - [`DirTileSource`]: the same `{z}/{x}/{y}.{ext}` layout on local disk,
//!   for offline use.
//!
//! # URL Templates
//!
//! A base such as `https://example.com/terrarium` expands to
//! `https://example.com/terrarium/{z}/{x}/{y}.{ext}`. A base that already
//! contains `{z}`, `{x}` and `{y}` is used as a template as-is; `{ext}` is
//! also substituted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TerrainConfig;
use crate::coords::TileAddress;
use crate::error::{ReliefError, Result};

/// Default timeout for HTTP requests in seconds.
#[cfg(feature = "http")]
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Source of raw (still encoded) tile bytes.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the encoded raster for one tile.
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Expand a base URL or template for one tile.
///
/// # Examples
///
/// ```
/// use relief::coords::TileAddress;
/// use relief::fetch::tile_url;
///
/// let url = tile_url("https://example.com/terrarium", "png", TileAddress::new(7, 68, 45));
/// assert_eq!(url, "https://example.com/terrarium/7/68/45.png");
///
/// let url = tile_url("https://example.com/{z}-{x}-{y}.{ext}", "webp", TileAddress::new(3, 1, 2));
/// assert_eq!(url, "https://example.com/3-1-2.webp");
/// ```
pub fn tile_url(base: &str, ext: &str, address: TileAddress) -> String {
    let template = if base.contains("{z}") && base.contains("{x}") && base.contains("{y}") {
        base.to_string()
    } else {
        format!("{}/{{z}}/{{x}}/{{y}}.{{ext}}", base.trim_end_matches('/'))
    };

    template
        .replace("{z}", &address.zoom.to_string())
        .replace("{x}", &address.x.to_string())
        .replace("{y}", &address.y.to_string())
        .replace("{ext}", ext)
}

/// Build the source described by the configuration.
///
/// `http://` and `https://` bases use [`HttpTileSource`]; anything else is
/// treated as a local directory.
pub fn source_from_config(config: &TerrainConfig) -> Result<Arc<dyn TileSource>> {
    if config.is_remote() {
        #[cfg(feature = "http")]
        {
            let fetch = FetchConfig::new(&config.tile_server)
                .with_extension(&config.tile_ext)
                .with_timeout(config.timeout_secs)
                .with_max_retries(config.max_retries);
            return Ok(Arc::new(HttpTileSource::new(fetch)?));
        }

        #[cfg(not(feature = "http"))]
        {
            return Err(ReliefError::Config {
                key: "RELIEF_TILE_SERVER".to_string(),
                value: format!("{} (built without the http feature)", config.tile_server),
            });
        }
    }

    Ok(Arc::new(DirTileSource::new(
        &config.tile_server,
        &config.tile_ext,
    )))
}

/// Configuration for fetching tiles over HTTP.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL or `{z}/{x}/{y}` template.
    pub base_url: String,
    /// File extension substituted for `{ext}`.
    pub extension: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retry attempts on failure.
    pub max_retries: u32,
}

#[cfg(feature = "http")]
impl FetchConfig {
    /// Create a configuration for a base URL, `png` tiles and no retries.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            extension: "png".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
        }
    }

    /// Set the tile file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Fetches tiles from a slippy-map HTTP server.
#[cfg(feature = "http")]
pub struct HttpTileSource {
    client: reqwest::Client,
    config: FetchConfig,
}

#[cfg(feature = "http")]
impl HttpTileSource {
    /// Create a new source with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReliefError::Config {
                key: "http client".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    /// URL of one tile.
    pub fn url_for(&self, address: TileAddress) -> String {
        tile_url(&self.config.base_url, &self.config.extension, address)
    }

    async fn fetch_once(&self, address: TileAddress, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| ReliefError::TileFetch { address, reason };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>> {
        let url = self.url_for(address);
        tracing::debug!(tile = %address, url = %url, "Fetching tile");

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Brief delay before retry
                tokio::time::sleep(std::time::Duration::from_millis(500 * attempt as u64)).await;
            }

            match self.fetch_once(address, &url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!(
                        tile = %address,
                        attempt,
                        error = %e,
                        "Tile fetch attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ReliefError::TileFetch {
            address,
            reason: "Unknown error".to_string(),
        }))
    }

    fn describe(&self) -> String {
        tile_url(&self.config.base_url, &self.config.extension, TileAddress::new(0, 0, 0))
            .replace("/0/0/0.", "/{z}/{x}/{y}.")
    }
}

/// Reads tiles laid out as `{root}/{z}/{x}/{y}.{ext}` on local disk.
#[derive(Debug, Clone)]
pub struct DirTileSource {
    root: PathBuf,
    extension: String,
}

impl DirTileSource {
    /// Create a source rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P, extension: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Path of one tile.
    pub fn path_for(&self, address: TileAddress) -> PathBuf {
        self.root
            .join(address.zoom.to_string())
            .join(address.x.to_string())
            .join(format!("{}.{}", address.y, self.extension))
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TileSource for DirTileSource {
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>> {
        let path = self.path_for(address);
        tracing::debug!(tile = %address, path = %path.display(), "Reading tile");

        tokio::fs::read(&path)
            .await
            .map_err(|e| ReliefError::TileFetch {
                address,
                reason: format!("{}: {}", path.display(), e),
            })
    }

    fn describe(&self) -> String {
        format!("{}/{{z}}/{{x}}/{{y}}.{}", self.root.display(), self.extension)
    }
}

//! Tile store with coalesced async fetching.
//!
//! This module provides [`TileStore`], which resolves a [`TileAddress`] to a
//! decoded [`ElevationRaster`], fetching and decoding on first access and
//! serving from memory afterwards.
//!
//! # Request Coalescing
//!
//! Concurrent callers asking for the same address while its fetch is still
//! running wait on that one fetch instead of issuing their own. At most one
//! fetch per address is outstanding at any time.
//!
//! # Fetch Limit
//!
//! At most `max_concurrent_fetches` distinct tiles are fetched and decoded at
//! the same time; further loads wait for a permit. Cache hits never wait.
//!
//! # Failed Tiles
//!
//! A fetch or decode failure never reaches the caller. The store logs it,
//! notifies the optional failure observer and hands out a zero-filled raster
//! of the right size. Whether that substitute is cached is controlled by
//! [`FailurePolicy`].
//!
//! ```ignore
//! use relief::{TerrainConfig, TileStoreBuilder};
//!
//! let store = TileStoreBuilder::from_config(&TerrainConfig::default())?
//!     .on_failure(|address, error| eprintln!("tile {address} unavailable: {error}"))
//!     .build();
//!
//! let raster = store.get(TileAddress::new(7, 68, 45)).await;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use moka::future::Cache;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{FailurePolicy, TerrainConfig, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::coords::{tiles_covering, RegionBounds, TileAddress};
use crate::error::{ReliefError, Result};
use crate::fetch::{source_from_config, TileSource};
use crate::terrarium::decode_tile;
use crate::tile::{ElevationRaster, DEFAULT_TILE_RES};

/// Callback invoked for every tile that failed to fetch or decode.
pub type FailureObserver = Arc<dyn Fn(TileAddress, &ReliefError) + Send + Sync>;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub count: usize,
    /// Cached tile addresses, sorted.
    pub keys: Vec<TileAddress>,
    /// Number of requests served straight from the cache.
    pub hit_count: u64,
    /// Number of requests that had to wait for a fetch.
    pub miss_count: u64,
    /// Number of fetches actually issued to the source.
    pub fetch_count: u64,
    /// Number of fetches that failed and were replaced by a zero raster.
    pub failure_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Statistics from a preload operation.
#[derive(Debug, Clone, Default)]
pub struct PreloadStats {
    /// Number of tiles intersecting the requested bounds.
    pub tiles_matched: u64,
    /// Number of tiles fetched into the cache.
    pub tiles_loaded: u64,
    /// Number of tiles that were already in cache.
    pub tiles_already_cached: u64,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Cached, coalescing resolver from tile addresses to elevation rasters.
pub struct TileStore {
    /// Where encoded tiles come from.
    source: Arc<dyn TileSource>,
    /// Decoded tiles keyed by address.
    cache: Cache<TileAddress, Arc<ElevationRaster>>,
    /// Samples per tile row/column.
    tile_res: u32,
    failure_policy: FailurePolicy,
    observer: Option<FailureObserver>,
    /// Permits for loads in flight.
    fetch_permits: Semaphore,
    max_concurrent_fetches: usize,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    fetch_count: AtomicU64,
    failure_count: AtomicU64,
}

impl TileStore {
    /// Create a store with default settings over the given source.
    pub fn new(source: Arc<dyn TileSource>) -> Self {
        TileStoreBuilder::new(source).build()
    }

    /// Create a builder for more configuration options.
    pub fn builder(source: Arc<dyn TileSource>) -> TileStoreBuilder {
        TileStoreBuilder::new(source)
    }

    /// Resolve a tile address to its raster.
    ///
    /// Never fails: tiles that cannot be fetched or decoded come back as a
    /// zero-filled raster (see the module documentation).
    pub async fn get(&self, address: TileAddress) -> Arc<ElevationRaster> {
        if let Some(raster) = self.cache.get(&address).await {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return raster;
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);

        match self.cache.try_get_with(address, self.load(address)).await {
            Ok(raster) => raster,
            // Already reported by `load`; not cached under FailurePolicy::Retry.
            Err(_) => Arc::new(ElevationRaster::zeroed(self.tile_res)),
        }
    }

    /// Resolve several addresses concurrently.
    ///
    /// Each distinct address is requested once; the returned map is keyed by
    /// address so callers never depend on completion order.
    pub async fn get_many(
        self: &Arc<Self>,
        addresses: impl IntoIterator<Item = TileAddress>,
    ) -> HashMap<TileAddress, Arc<ElevationRaster>> {
        let unique: HashSet<TileAddress> = addresses.into_iter().collect();
        let mut tiles = HashMap::with_capacity(unique.len());
        let mut tasks = JoinSet::new();

        for &address in &unique {
            let store = Arc::clone(self);
            tasks.spawn(async move { (address, store.get(address).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, raster)) => {
                    tiles.insert(address, raster);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Tile task failed");
                }
            }
        }

        // A task that panicked only degrades its own tile.
        for address in unique {
            tiles
                .entry(address)
                .or_insert_with(|| Arc::new(ElevationRaster::zeroed(self.tile_res)));
        }

        tiles
    }

    /// Fetch and decode one tile, applying the failure policy.
    async fn load(&self, address: TileAddress) -> Result<Arc<ElevationRaster>> {
        // The semaphore is never closed, so acquiring cannot fail.
        let _permit = self.fetch_permits.acquire().await.ok();
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.fetch_and_decode(address).await {
            Ok(raster) => {
                tracing::debug!(
                    tile = %address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tile loaded"
                );
                Ok(Arc::new(raster))
            }
            Err(e) => {
                self.report_failure(address, &e);
                match self.failure_policy {
                    FailurePolicy::CacheZero => {
                        Ok(Arc::new(ElevationRaster::zeroed(self.tile_res)))
                    }
                    FailurePolicy::Retry => Err(e),
                }
            }
        }
    }

    async fn fetch_and_decode(&self, address: TileAddress) -> Result<ElevationRaster> {
        let bytes = self.source.fetch(address).await?;
        let tile_res = self.tile_res;

        // PNG decoding is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || decode_tile(address, &bytes, tile_res))
            .await
            .map_err(|e| ReliefError::Decode {
                address,
                reason: format!("Task join error: {e}"),
            })?
    }

    fn report_failure(&self, address: TileAddress, error: &ReliefError) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            tile = %address,
            error = %error,
            policy = %self.failure_policy,
            "Tile unavailable, substituting zero raster"
        );
        if let Some(observer) = &self.observer {
            observer(address, error);
        }
    }

    /// Check whether a tile is cached, without fetching it.
    pub fn contains(&self, address: TileAddress) -> bool {
        self.cache.contains_key(&address)
    }

    /// Get cache statistics.
    ///
    /// Read-only: nothing is fetched or evicted.
    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<TileAddress> = self.cache.iter().map(|(key, _)| *key).collect();
        keys.sort();

        CacheStats {
            count: keys.len(),
            keys,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            fetch_count: self.fetch_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached tile and reset the counters.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;

        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.fetch_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Invalidate (remove) a specific tile from the cache.
    pub async fn invalidate(&self, address: TileAddress) {
        self.cache.invalidate(&address).await;
    }

    /// Warm the cache with every tile intersecting `bounds` at `zoom`.
    pub async fn preload(
        self: &Arc<Self>,
        bounds: &RegionBounds,
        zoom: u8,
    ) -> Result<PreloadStats> {
        let start = Instant::now();
        let mut stats = PreloadStats::default();

        let mut pending = Vec::new();
        for address in tiles_covering(bounds, zoom, self.tile_res)? {
            stats.tiles_matched += 1;
            if self.contains(address) {
                stats.tiles_already_cached += 1;
            } else {
                pending.push(address);
            }
        }

        stats.tiles_loaded = self.get_many(pending).await.len() as u64;
        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Samples per tile row/column.
    pub fn tile_res(&self) -> u32 {
        self.tile_res
    }

    /// Configured failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Upper bound on loads running at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches
    }

    /// Get the maximum cache size, if bounded.
    pub fn cache_capacity(&self) -> Option<u64> {
        self.cache.policy().max_capacity()
    }

    /// Description of the tile source.
    pub fn source_description(&self) -> String {
        self.source.describe()
    }
}

/// Builder for creating [`TileStore`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use relief::{FailurePolicy, TileStoreBuilder};
///
/// let store = TileStoreBuilder::new(source)
///     .cache_capacity(Some(512))
///     .failure_policy(FailurePolicy::Retry)
///     .build();
/// ```
pub struct TileStoreBuilder {
    source: Arc<dyn TileSource>,
    tile_res: u32,
    cache_capacity: Option<u64>,
    failure_policy: FailurePolicy,
    observer: Option<FailureObserver>,
    max_concurrent_fetches: usize,
}

impl TileStoreBuilder {
    /// Create a new builder over the given source.
    pub fn new(source: Arc<dyn TileSource>) -> Self {
        Self {
            source,
            tile_res: DEFAULT_TILE_RES,
            cache_capacity: None,
            failure_policy: FailurePolicy::default(),
            observer: None,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    /// Create a builder from a [`TerrainConfig`], including its tile source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &TerrainConfig) -> Result<Self> {
        Ok(Self::new(source_from_config(config)?)
            .tile_res(config.tile_res)
            .cache_capacity(config.cache_capacity)
            .failure_policy(config.failure_policy)
            .max_concurrent_fetches(config.max_concurrent_fetches))
    }

    /// Create a builder configured from `RELIEF_*` environment variables.
    ///
    /// See [`TerrainConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::from_config(&TerrainConfig::from_env()?)
    }

    /// Set the number of samples per tile row/column.
    ///
    /// Default is 256.
    pub fn tile_res(mut self, tile_res: u32) -> Self {
        self.tile_res = tile_res;
        self
    }

    /// Bound the number of cached tiles. `None` (the default) keeps every tile.
    pub fn cache_capacity(mut self, capacity: Option<u64>) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set what happens to tiles that fail to load.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Limit how many tiles are fetched at the same time. Values below 1
    /// are raised to 1.
    ///
    /// Default is 16.
    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    /// Register a callback for failed tiles.
    pub fn on_failure(
        mut self,
        observer: impl Fn(TileAddress, &ReliefError) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Build the [`TileStore`].
    pub fn build(self) -> TileStore {
        let mut cache = Cache::builder();
        if let Some(capacity) = self.cache_capacity {
            cache = cache.max_capacity(capacity);
        }

        tracing::debug!(
            source = %self.source.describe(),
            tile_res = self.tile_res,
            capacity = ?self.cache_capacity,
            policy = %self.failure_policy,
            max_concurrent_fetches = self.max_concurrent_fetches,
            "Tile store created"
        );

        TileStore {
            source: self.source,
            cache: cache.build(),
            tile_res: self.tile_res,
            failure_policy: self.failure_policy,
            observer: self.observer,
            fetch_permits: Semaphore::new(self.max_concurrent_fetches),
            max_concurrent_fetches: self.max_concurrent_fetches,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            fetch_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{indexed_raster, shared, MockSource};
    use std::sync::Mutex;

    const TILE: TileAddress = TileAddress::new(7, 68, 45);
    const OTHER: TileAddress = TileAddress::new(7, 69, 45);

    fn store_with(source: MockSource, res: u32) -> (Arc<MockSource>, Arc<TileStore>) {
        let (mock, source) = shared(source);
        let store = TileStore::builder(source).tile_res(res).build();
        (mock, Arc::new(store))
    }

    #[tokio::test]
    async fn test_get_decodes_tile() {
        let raster = indexed_raster(16);
        let (mock, store) = store_with(MockSource::new().with_raster(TILE, &raster), 16);

        let got = store.get(TILE).await;
        assert_eq!(*got, raster);
        assert_eq!(mock.fetches(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit() {
        let (mock, store) =
            store_with(MockSource::new().with_raster(TILE, &indexed_raster(16)), 16);

        let _ = store.get(TILE).await;
        let stats1 = store.stats();
        assert_eq!(stats1.miss_count, 1);
        assert_eq!(stats1.hit_count, 0);

        let _ = store.get(TILE).await;
        let stats2 = store.stats();
        assert_eq!(stats2.miss_count, 1);
        assert_eq!(stats2.hit_count, 1);
        assert_eq!(mock.fetches(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_share_one_fetch() {
        let (mock, store) =
            store_with(MockSource::new().with_raster(TILE, &indexed_raster(16)), 16);

        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.get(TILE).await });
        }

        let mut results = Vec::new();
        while let Some(raster) = tasks.join_next().await {
            results.push(raster.unwrap());
        }

        assert_eq!(results.len(), 50);
        assert_eq!(mock.fetches(), 1);
        assert!(results.iter().all(|r| r.sample(3, 2) == 2003.0));
        assert_eq!(store.stats().fetch_count, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_zero_raster() {
        let (mock, store) = store_with(MockSource::new(), 256);

        let raster = store.get(TILE).await;
        assert_eq!(raster.tile_res(), 256);
        assert_eq!(raster.samples().len(), 256 * 256);
        assert!(raster.is_zeroed());

        // Cached under the default policy: no second fetch.
        let _ = store.get(TILE).await;
        assert_eq!(mock.fetches(), 1);

        let stats = store.stats();
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.keys, vec![TILE]);
    }

    #[tokio::test]
    async fn test_undecodable_tile_yields_zero_raster() {
        let (_mock, store) = store_with(MockSource::new().with_bytes(TILE, b"not a png"), 16);

        let raster = store.get(TILE).await;
        assert!(raster.is_zeroed());
        assert_eq!(store.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_wrong_size_tile_yields_zero_raster() {
        let (_mock, store) =
            store_with(MockSource::new().with_raster(TILE, &indexed_raster(8)), 16);

        let raster = store.get(TILE).await;
        assert_eq!(raster.tile_res(), 16);
        assert!(raster.is_zeroed());
    }

    #[tokio::test]
    async fn test_retry_policy_fetches_again() {
        let (mock, source) = shared(MockSource::new());
        let store = TileStore::builder(source)
            .tile_res(16)
            .failure_policy(FailurePolicy::Retry)
            .build();

        assert!(store.get(TILE).await.is_zeroed());
        assert!(!store.contains(TILE));

        // The tile shows up later and is picked up on the next access.
        mock.insert_bytes(TILE, crate::terrarium::encode_png(&indexed_raster(16)).unwrap());
        let raster = store.get(TILE).await;
        assert_eq!(raster.sample(1, 1), 1001.0);
        assert_eq!(mock.fetches(), 2);
        assert_eq!(store.stats().failure_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retry_policy_still_coalesces() {
        let (mock, source) = shared(MockSource::new());
        let store = Arc::new(
            TileStore::builder(source)
                .tile_res(16)
                .failure_policy(FailurePolicy::Retry)
                .build(),
        );

        let mut tasks = JoinSet::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.get(TILE).await });
        }
        while let Some(raster) = tasks.join_next().await {
            assert!(raster.unwrap().is_zeroed());
        }

        assert_eq!(mock.fetches(), 1);
    }

    #[tokio::test]
    async fn test_failure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let (_mock, source) = shared(MockSource::new());
        let store = TileStore::builder(source)
            .tile_res(16)
            .on_failure(move |address, error| {
                seen_clone.lock().unwrap().push((address, error.to_string()));
            })
            .build();

        let _ = store.get(TILE).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, TILE);
        assert!(seen[0].1.contains("404"));
    }

    #[tokio::test]
    async fn test_get_many_deduplicates() {
        let (mock, store) = store_with(
            MockSource::new()
                .with_raster(TILE, &indexed_raster(16))
                .with_raster(OTHER, &ElevationRaster::zeroed(16)),
            16,
        );

        let tiles = store.get_many([TILE, OTHER, TILE, TILE, OTHER]).await;
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[&TILE].sample(2, 0), 2.0);
        assert_eq!(mock.fetches_of(TILE), 1);
        assert_eq!(mock.fetches_of(OTHER), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_many_limits_concurrent_fetches() {
        let (mock, source) = shared(MockSource::new());
        let store = Arc::new(
            TileStore::builder(source)
                .tile_res(16)
                .max_concurrent_fetches(3)
                .build(),
        );

        let addresses: Vec<TileAddress> = (0..40).map(|x| TileAddress::new(7, x, 45)).collect();
        let tiles = store.get_many(addresses).await;

        assert_eq!(tiles.len(), 40);
        assert_eq!(mock.fetches(), 40);
        assert!(mock.peak_in_flight() <= 3, "peak {}", mock.peak_in_flight());
        assert!(mock.peak_in_flight() >= 1);
    }

    #[test]
    fn test_max_concurrent_fetches_from_config() {
        let (_mock, source) = shared(MockSource::new());
        assert_eq!(TileStore::new(Arc::clone(&source)).max_concurrent_fetches(), 16);

        let store = TileStore::builder(source).max_concurrent_fetches(0).build();
        assert_eq!(store.max_concurrent_fetches(), 1);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let (mock, store) = store_with(
            MockSource::new()
                .with_raster(TILE, &indexed_raster(16))
                .with_raster(OTHER, &indexed_raster(16)),
            16,
        );

        let _ = store.get(OTHER).await;
        let _ = store.get(TILE).await;

        let stats = store.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.keys, vec![TILE, OTHER]);

        store.clear().await;
        let stats = store.stats();
        assert_eq!(stats.count, 0);
        assert!(stats.keys.is_empty());
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.fetch_count, 0);

        // After clearing, next access is a miss again
        let _ = store.get(TILE).await;
        assert_eq!(store.stats().miss_count, 1);
        assert_eq!(mock.fetches_of(TILE), 2);
    }

    #[tokio::test]
    async fn test_invalidate_single_tile() {
        let (mock, store) =
            store_with(MockSource::new().with_raster(TILE, &indexed_raster(16)), 16);

        let _ = store.get(TILE).await;
        store.invalidate(TILE).await;
        assert!(!store.contains(TILE));

        let _ = store.get(TILE).await;
        assert_eq!(mock.fetches(), 2);
    }

    #[tokio::test]
    async fn test_preload() {
        let (mock, store) =
            store_with(MockSource::new().with_raster(TILE, &indexed_raster(16)), 16);

        let bounds = TILE.bounds();
        let inner = RegionBounds::new(
            bounds.min_lon + 0.01,
            bounds.max_lon - 0.01,
            bounds.min_lat + 0.01,
            bounds.max_lat - 0.01,
        )
        .unwrap();

        let stats = store.preload(&inner, 7).await.unwrap();
        assert_eq!(stats.tiles_matched, 1);
        assert_eq!(stats.tiles_loaded, 1);
        assert_eq!(stats.tiles_already_cached, 0);

        let stats = store.preload(&inner, 7).await.unwrap();
        assert_eq!(stats.tiles_loaded, 0);
        assert_eq!(stats.tiles_already_cached, 1);
        assert_eq!(mock.fetches(), 1);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hit_count: 80,
            miss_count: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.8);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_capacity() {
        let (_mock, source) = shared(MockSource::new());
        assert_eq!(TileStore::new(Arc::clone(&source)).cache_capacity(), None);

        let bounded = TileStore::builder(source).cache_capacity(Some(100)).build();
        assert_eq!(bounded.cache_capacity(), Some(100));
    }
}

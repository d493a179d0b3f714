//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::coords::TileAddress;
use crate::error::{ReliefError, Result};
use crate::fetch::TileSource;
use crate::terrarium::encode_png;
use crate::tile::ElevationRaster;

/// In-memory tile source that counts fetches.
///
/// Addresses without a registered tile fail with a 404-style error.
pub struct MockSource {
    tiles: Mutex<HashMap<TileAddress, Vec<u8>>>,
    fetches: AtomicUsize,
    per_tile: Mutex<HashMap<TileAddress, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Duration,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            tiles: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            per_tile: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        }
    }

    pub fn with_raster(self, address: TileAddress, raster: &ElevationRaster) -> Self {
        self.insert_bytes(address, encode_png(raster).unwrap());
        self
    }

    pub fn with_bytes(self, address: TileAddress, bytes: &[u8]) -> Self {
        self.insert_bytes(address, bytes.to_vec());
        self
    }

    pub fn insert_bytes(&self, address: TileAddress, bytes: Vec<u8>) {
        self.tiles.lock().unwrap().insert(address, bytes);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetches_of(&self, address: TileAddress) -> usize {
        self.per_tile.lock().unwrap().get(&address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TileSource for MockSource {
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.per_tile.lock().unwrap().entry(address).or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let bytes = self.tiles.lock().unwrap().get(&address).cloned();
        bytes.ok_or_else(|| ReliefError::TileFetch {
            address,
            reason: "HTTP 404 Not Found".to_string(),
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Raster where each sample encodes its own position: `col + row * 1000`.
pub fn indexed_raster(tile_res: u32) -> ElevationRaster {
    ElevationRaster::from_fn(tile_res, |col, row| (col + row * 1000) as f32)
}

/// Share a mock source with the store while keeping a handle for assertions.
pub fn shared(source: MockSource) -> (Arc<MockSource>, Arc<dyn TileSource>) {
    let source = Arc::new(source);
    let dyn_source: Arc<dyn TileSource> = source.clone();
    (source, dyn_source)
}

//! Decoded elevation rasters and per-pixel sampling.
//!
//! This module provides the [`ElevationRaster`] struct holding one decoded
//! DEM tile, plus the nearest-sample lookup and central-difference slope used
//! by the query engine.

/// Default number of samples per row/column of a Terrarium tile.
pub const DEFAULT_TILE_RES: u32 = 256;

/// A decoded DEM tile: `tile_res × tile_res` elevations in metres.
///
/// Samples are stored row-major, row 0 being the northern edge and column 0
/// the western edge.
///
/// # Example
///
/// ```
/// use relief::ElevationRaster;
///
/// let mut raster = ElevationRaster::zeroed(256);
/// raster.set(10, 20, 512.0);
/// assert_eq!(raster.sample(10, 20), 512.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationRaster {
    /// Number of samples per row/column
    tile_res: u32,
    /// Row-major elevations in metres
    samples: Vec<f32>,
}

impl ElevationRaster {
    /// A raster where every sample is 0 m.
    ///
    /// This is what the tile store hands out for tiles that could not be
    /// fetched or decoded.
    pub fn zeroed(tile_res: u32) -> Self {
        Self {
            tile_res,
            samples: vec![0.0; (tile_res as usize) * (tile_res as usize)],
        }
    }

    /// Wrap row-major samples.
    ///
    /// Returns `None` if `samples.len() != tile_res²`.
    pub fn from_samples(tile_res: u32, samples: Vec<f32>) -> Option<Self> {
        if samples.len() != (tile_res as usize) * (tile_res as usize) {
            return None;
        }
        Some(Self { tile_res, samples })
    }

    /// Build a raster by evaluating `f(col, row)` for every sample.
    pub fn from_fn(tile_res: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut samples = Vec::with_capacity((tile_res as usize) * (tile_res as usize));
        for row in 0..tile_res {
            for col in 0..tile_res {
                samples.push(f(col, row));
            }
        }
        Self { tile_res, samples }
    }

    /// Nearest-sample elevation at a pixel.
    ///
    /// Indices past the edge are clamped to the last row/column.
    pub fn sample(&self, col: u32, row: u32) -> f32 {
        let last = self.tile_res.saturating_sub(1);
        let col = col.min(last) as usize;
        let row = row.min(last) as usize;
        self.samples[row * self.tile_res as usize + col]
    }

    /// Overwrite one sample.
    ///
    /// Out-of-range indices are ignored.
    pub fn set(&mut self, col: u32, row: u32, height: f32) {
        if col < self.tile_res && row < self.tile_res {
            let idx = row as usize * self.tile_res as usize + col as usize;
            self.samples[idx] = height;
        }
    }

    /// Central-difference slope magnitude at a pixel.
    ///
    /// `sqrt(((h(c+1) − h(c−1))/2)² + ((h(r+1) − h(r−1))/2)²)`, in metres of
    /// rise per sample step. Pixels on the raster border return exactly `0`:
    /// nothing is extrapolated past the tile edge.
    pub fn slope(&self, col: u32, row: u32) -> f32 {
        let last = self.tile_res.saturating_sub(1);
        if col == 0 || row == 0 || col >= last || row >= last {
            return 0.0;
        }

        let dx = (self.sample(col + 1, row) - self.sample(col - 1, row)) / 2.0;
        let dy = (self.sample(col, row + 1) - self.sample(col, row - 1)) / 2.0;
        (dx * dx + dy * dy).sqrt()
    }

    /// Number of samples per row/column.
    pub fn tile_res(&self) -> u32 {
        self.tile_res
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Whether every sample is exactly 0 m (the failure substitute, or sea).
    pub fn is_zeroed(&self) -> bool {
        self.samples.iter().all(|&h| h == 0.0)
    }

    /// Lowest and highest sample.
    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plane rising 3 m per column and 4 m per row.
    fn ramp(tile_res: u32) -> ElevationRaster {
        ElevationRaster::from_fn(tile_res, |col, row| col as f32 * 3.0 + row as f32 * 4.0)
    }

    #[test]
    fn test_zeroed() {
        let raster = ElevationRaster::zeroed(DEFAULT_TILE_RES);
        assert_eq!(raster.samples().len(), 256 * 256);
        assert!(raster.is_zeroed());
        assert_eq!(raster.sample(255, 255), 0.0);
    }

    #[test]
    fn test_from_samples_checks_length() {
        assert!(ElevationRaster::from_samples(4, vec![0.0; 16]).is_some());
        assert!(ElevationRaster::from_samples(4, vec![0.0; 15]).is_none());
    }

    #[test]
    fn test_row_major_layout() {
        let raster = ramp(8);
        assert_eq!(raster.samples()[8 + 2], raster.sample(2, 1));
        assert_eq!(raster.sample(2, 1), 10.0);
    }

    #[test]
    fn test_sample_clamps_past_edge() {
        let raster = ramp(8);
        assert_eq!(raster.sample(100, 0), raster.sample(7, 0));
        assert_eq!(raster.sample(0, 100), raster.sample(0, 7));
    }

    #[test]
    fn test_slope_interior() {
        let raster = ramp(8);
        // dx = 3, dy = 4
        assert_eq!(raster.slope(3, 3), 5.0);
        assert_eq!(raster.slope(6, 6), 5.0);
    }

    #[test]
    fn test_slope_edges_are_zero() {
        let raster = ramp(DEFAULT_TILE_RES);
        let last = DEFAULT_TILE_RES - 1;
        for i in 0..DEFAULT_TILE_RES {
            assert_eq!(raster.slope(0, i), 0.0);
            assert_eq!(raster.slope(last, i), 0.0);
            assert_eq!(raster.slope(i, 0), 0.0);
            assert_eq!(raster.slope(i, last), 0.0);
        }
        assert!(raster.slope(1, 1) > 0.0);
    }

    #[test]
    fn test_slope_non_negative() {
        let raster = ElevationRaster::from_fn(16, |col, row| -((col * row) as f32));
        for row in 0..16 {
            for col in 0..16 {
                assert!(raster.slope(col, row) >= 0.0);
            }
        }
    }

    #[test]
    fn test_set_ignores_out_of_range() {
        let mut raster = ElevationRaster::zeroed(4);
        raster.set(4, 0, 1.0);
        raster.set(1, 2, 7.0);
        assert_eq!(raster.sample(1, 2), 7.0);
        assert_eq!(raster.min_max(), (0.0, 7.0));
        assert!(!raster.is_zeroed());
    }
}

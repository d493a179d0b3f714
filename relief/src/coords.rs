//! Geographic, Web-Mercator and tile/pixel coordinate conversions.
//!
//! Three spaces are involved:
//!
//! - **Geographic**: [`GeoPoint`], longitude/latitude in degrees (WGS84).
//! - **Projected**: [`ProjectedPoint`], spherical Web-Mercator metres (EPSG:3857).
//! - **Tile grid**: [`TileAddress`] plus a pixel inside that tile, following
//!   the slippy-map convention (x grows eastward, y grows southward).
//!
//! # Tile Grid
//!
//! At zoom `z` the world is `2^z × 2^z` tiles of `tile_res × tile_res` pixels.
//! The ground resolution is `2πR / (tile_res · 2^z)` metres per pixel.
//!
//! Everything here is pure and never suspends.

use std::f64::consts::PI;
use std::fmt;

use crate::error::{ReliefError, Result};

/// Spherical Earth radius used by Web-Mercator, in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the projected world width (πR), in metres.
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;

/// Latitude limit of the square Web-Mercator world (arctan(sinh(π))).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Highest zoom level the `u32` tile grid can address with 256-pixel tiles.
pub const MAX_ZOOM: u8 = 24;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude (-180 to 180).
    pub lon: f64,
    /// Latitude (practically -85.05 to 85.05).
    pub lat: f64,
}

impl GeoPoint {
    /// Create a new point. Note the `(lon, lat)` order.
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lon, self.lat)
    }
}

/// A point on the Web-Mercator plane, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

/// Slippy-map tile identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Zoom level.
    pub zoom: u8,
    /// Column (0 at 180°W, increases eastward).
    pub x: u32,
    /// Row (0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileAddress {
    /// Create a tile address.
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.zoom
    }

    /// Geographic extent of this tile.
    ///
    /// Longitude is linear in `x`; latitude follows the inverse Mercator
    /// mapping of the row edges.
    pub fn bounds(&self) -> RegionBounds {
        let n = self.tiles_per_axis() as f64;
        let lon_at = |x: f64| x / n * 360.0 - 180.0;
        let lat_at = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();

        RegionBounds {
            min_lon: lon_at(self.x as f64),
            max_lon: lon_at(self.x as f64 + 1.0),
            min_lat: lat_at(self.y as f64 + 1.0),
            max_lat: lat_at(self.y as f64),
        }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// A rectangular geographic region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    /// Western boundary longitude.
    pub min_lon: f64,
    /// Eastern boundary longitude.
    pub max_lon: f64,
    /// Southern boundary latitude.
    pub min_lat: f64,
    /// Northern boundary latitude.
    pub max_lat: f64,
}

impl RegionBounds {
    /// Create validated bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::InvalidRegion`] unless `min_lon < max_lon` and
    /// `min_lat < max_lat` (which also rejects NaN).
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Result<Self> {
        let bounds = Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check the `min < max` invariant on both axes.
    pub fn validate(&self) -> Result<()> {
        if self.min_lon < self.max_lon && self.min_lat < self.max_lat {
            Ok(())
        } else {
            Err(ReliefError::InvalidRegion {
                min_lon: self.min_lon,
                max_lon: self.max_lon,
                min_lat: self.min_lat,
                max_lat: self.max_lat,
            })
        }
    }

    /// Whether the point lies inside the bounds (edges inclusive).
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&point.lon)
            && (self.min_lat..=self.max_lat).contains(&point.lat)
    }
}

/// A pixel inside a specific tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelLocation {
    pub address: TileAddress,
    /// Column inside the tile (0 = west edge).
    pub col: u32,
    /// Row inside the tile (0 = north edge).
    pub row: u32,
}

/// Project a geographic point onto the Web-Mercator plane.
///
/// `x = R·lon·π/180`, `y = R·ln(tan(π/4 + lat·π/360))`.
///
/// # Errors
///
/// Returns [`ReliefError::ProjectionSingularity`] for `|lat| >= 90` or
/// non-finite input. The latitude is never clamped here; callers that accept
/// arbitrary input should restrict it to ±[`MAX_LATITUDE`] themselves.
///
/// # Examples
///
/// ```
/// use relief::coords::{to_projected, GeoPoint};
///
/// let p = to_projected(GeoPoint::new(180.0, 0.0)).unwrap();
/// assert!((p.x - 20_037_508.342_789_244).abs() < 1e-6);
/// assert!(p.y.abs() < 1e-9);
///
/// assert!(to_projected(GeoPoint::new(0.0, 90.0)).is_err());
/// ```
pub fn to_projected(point: GeoPoint) -> Result<ProjectedPoint> {
    if !point.lat.is_finite() || !point.lon.is_finite() || point.lat.abs() >= 90.0 {
        return Err(ReliefError::ProjectionSingularity { lat: point.lat });
    }

    let x = EARTH_RADIUS * point.lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + point.lat.to_radians() / 2.0).tan().ln();

    Ok(ProjectedPoint { x, y })
}

/// Inverse of [`to_projected`].
pub fn to_geographic(point: ProjectedPoint) -> GeoPoint {
    let lon = (point.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    GeoPoint { lon, lat }
}

/// Ground resolution in metres per pixel.
pub fn resolution(zoom: u8, tile_res: u32) -> f64 {
    2.0 * ORIGIN_SHIFT / (tile_res as f64 * (1u64 << zoom) as f64)
}

/// Fractional global pixel position of a projected point.
///
/// The y axis is inverted so that row 0 is the northern edge. Positions are
/// confined to the world extent, so `lon = 180` and latitudes past
/// ±[`MAX_LATITUDE`] land on the outermost pixel instead of a tile that does
/// not exist.
pub fn global_pixel(point: ProjectedPoint, zoom: u8, tile_res: u32) -> (f64, f64) {
    let res = resolution(zoom, tile_res);
    let world = tile_res as f64 * (1u64 << zoom) as f64;
    let max = world - 1.0;

    let gx = ((point.x + ORIGIN_SHIFT) / res).clamp(0.0, max);
    let gy = ((ORIGIN_SHIFT - point.y) / res).clamp(0.0, max);
    (gx, gy)
}

/// Tile and in-tile pixel for a projected point.
pub fn locate(point: ProjectedPoint, zoom: u8, tile_res: u32) -> PixelLocation {
    let (gx, gy) = global_pixel(point, zoom, tile_res);
    let (gx, gy) = (gx.floor() as u64, gy.floor() as u64);
    let tile_res = tile_res as u64;

    PixelLocation {
        address: TileAddress {
            zoom,
            x: (gx / tile_res) as u32,
            y: (gy / tile_res) as u32,
        },
        col: (gx % tile_res) as u32,
        row: (gy % tile_res) as u32,
    }
}

/// Tile containing a projected point.
///
/// # Examples
///
/// ```
/// use relief::coords::{tile_address_for, to_projected, GeoPoint, TileAddress};
///
/// let p = to_projected(GeoPoint::new(0.0, 0.0)).unwrap();
/// assert_eq!(tile_address_for(p, 7, 256), TileAddress::new(7, 64, 64));
/// ```
pub fn tile_address_for(point: ProjectedPoint, zoom: u8, tile_res: u32) -> TileAddress {
    locate(point, zoom, tile_res).address
}

/// Pixel `(col, row)` inside the tile containing a projected point.
pub fn pixel_within_tile(point: ProjectedPoint, zoom: u8, tile_res: u32) -> (u32, u32) {
    let loc = locate(point, zoom, tile_res);
    (loc.col, loc.row)
}

/// Geographic position of the centre of a pixel.
pub fn pixel_center(location: PixelLocation, tile_res: u32) -> GeoPoint {
    let res = resolution(location.address.zoom, tile_res);
    let gx = (location.address.x as f64 * tile_res as f64) + location.col as f64 + 0.5;
    let gy = (location.address.y as f64 * tile_res as f64) + location.row as f64 + 0.5;

    to_geographic(ProjectedPoint {
        x: gx * res - ORIGIN_SHIFT,
        y: ORIGIN_SHIFT - gy * res,
    })
}

/// All tiles at `zoom` that intersect the bounds, row by row from the north.
///
/// Latitudes are limited to ±[`MAX_LATITUDE`] for the enumeration only, so
/// polar bounds simply include the outermost tile rows.
pub fn tiles_covering(bounds: &RegionBounds, zoom: u8, tile_res: u32) -> Result<Vec<TileAddress>> {
    bounds.validate()?;

    let corner = |lon: f64, lat: f64| -> Result<TileAddress> {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        Ok(tile_address_for(to_projected(GeoPoint::new(lon, lat))?, zoom, tile_res))
    };
    let north_west = corner(bounds.min_lon, bounds.max_lat)?;
    let south_east = corner(bounds.max_lon, bounds.min_lat)?;

    let mut tiles = Vec::new();
    for y in north_west.y..=south_east.y {
        for x in north_west.x..=south_east.x {
            tiles.push(TileAddress::new(zoom, x, y));
        }
    }
    Ok(tiles)
}

/// Map a point of a square model of side `size`, centred on the origin, to
/// geographic coordinates.
///
/// `x` spans longitude ±180° and `z` spans latitude ±85°.
pub fn model_to_geographic(x: f64, z: f64, size: f64) -> GeoPoint {
    let half = size / 2.0;
    GeoPoint {
        lon: x / half * 180.0,
        lat: z / half * 85.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so the round-trip sweep needs no extra crate.
    struct Lcg(u64);

    impl Lcg {
        fn next_unit(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    #[test]
    fn test_round_trip_random_points() {
        let mut rng = Lcg(0x5eed);
        for _ in 0..1000 {
            let p = GeoPoint::new(
                rng.next_unit() * 360.0 - 180.0,
                rng.next_unit() * 170.1 - 85.05,
            );
            let back = to_geographic(to_projected(p).unwrap());
            assert!((back.lon - p.lon).abs() < 1e-9, "lon {} -> {}", p.lon, back.lon);
            assert!((back.lat - p.lat).abs() < 1e-9, "lat {} -> {}", p.lat, back.lat);
        }
    }

    #[test]
    fn test_projection_singularity() {
        assert!(matches!(
            to_projected(GeoPoint::new(0.0, 90.0)),
            Err(ReliefError::ProjectionSingularity { .. })
        ));
        assert!(to_projected(GeoPoint::new(0.0, -90.0)).is_err());
        assert!(to_projected(GeoPoint::new(0.0, 120.0)).is_err());
        assert!(to_projected(GeoPoint::new(0.0, f64::NAN)).is_err());
        assert!(to_projected(GeoPoint::new(f64::INFINITY, 0.0)).is_err());
        assert!(to_projected(GeoPoint::new(0.0, 89.999)).is_ok());
    }

    #[test]
    fn test_world_edges() {
        let p = to_projected(GeoPoint::new(0.0, MAX_LATITUDE)).unwrap();
        assert!((p.y - ORIGIN_SHIFT).abs() < 1e-3);

        let p = to_projected(GeoPoint::new(-180.0, 0.0)).unwrap();
        assert!((p.x + ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_resolution() {
        assert!((resolution(0, 256) - 156_543.033_928_041).abs() < 1e-6);
        assert!((resolution(7, 256) - 156_543.033_928_041 / 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_tile_address_known_points() {
        let origin = to_projected(GeoPoint::new(0.0, 0.0)).unwrap();
        assert_eq!(tile_address_for(origin, 0, 256), TileAddress::new(0, 0, 0));
        assert_eq!(tile_address_for(origin, 1, 256), TileAddress::new(1, 1, 1));
        assert_eq!(pixel_within_tile(origin, 1, 256), (0, 0));

        // Mount Fuji at zoom 7
        let fuji = to_projected(GeoPoint::new(138.7274, 35.3606)).unwrap();
        assert_eq!(tile_address_for(fuji, 7, 256), TileAddress::new(7, 113, 50));

        // North-west quadrant
        let nw = to_projected(GeoPoint::new(-100.0, 40.0)).unwrap();
        let tile = tile_address_for(nw, 2, 256);
        assert_eq!((tile.x, tile.y), (0, 1));
    }

    #[test]
    fn test_world_edge_is_clamped_to_last_tile() {
        let east = to_projected(GeoPoint::new(180.0, 0.0)).unwrap();
        let loc = locate(east, 7, 256);
        assert_eq!(loc.address.x, 127);
        assert_eq!(loc.col, 255);

        let north = to_projected(GeoPoint::new(0.0, 89.0)).unwrap();
        let loc = locate(north, 7, 256);
        assert_eq!(loc.address.y, 0);
        assert_eq!(loc.row, 0);
    }

    #[test]
    fn test_tile_address_monotonic_in_zoom() {
        let mut rng = Lcg(42);
        for _ in 0..200 {
            let p = to_projected(GeoPoint::new(
                rng.next_unit() * 359.0 - 179.5,
                rng.next_unit() * 170.0 - 85.0,
            ))
            .unwrap();
            for zoom in 0..14 {
                let a = tile_address_for(p, zoom, 256);
                let b = tile_address_for(p, zoom + 1, 256);
                assert!(b.x == 2 * a.x || b.x == 2 * a.x + 1, "x at zoom {}", zoom);
                assert!(b.y == 2 * a.y || b.y == 2 * a.y + 1, "y at zoom {}", zoom);
            }
        }
    }

    #[test]
    fn test_pixel_center_locates_back() {
        let loc = PixelLocation {
            address: TileAddress::new(7, 68, 45),
            col: 10,
            row: 10,
        };
        let center = pixel_center(loc, 256);
        assert_eq!(locate(to_projected(center).unwrap(), 7, 256), loc);

        let corner = PixelLocation {
            address: TileAddress::new(7, 68, 45),
            col: 255,
            row: 0,
        };
        let center = pixel_center(corner, 256);
        assert_eq!(locate(to_projected(center).unwrap(), 7, 256), corner);
    }

    #[test]
    fn test_tile_bounds() {
        let world = TileAddress::new(0, 0, 0).bounds();
        assert_eq!(world.min_lon, -180.0);
        assert_eq!(world.max_lon, 180.0);
        assert!((world.max_lat - MAX_LATITUDE).abs() < 1e-9);
        assert!((world.min_lat + MAX_LATITUDE).abs() < 1e-9);

        let tile = TileAddress::new(7, 113, 50);
        let b = tile.bounds();
        assert!(b.contains(GeoPoint::new(138.7274, 35.3606)));
        assert!(b.validate().is_ok());
    }

    #[test]
    fn test_region_bounds_validation() {
        assert!(RegionBounds::new(0.0, 1.0, 0.0, 1.0).is_ok());
        assert!(RegionBounds::new(1.0, 1.0, 0.0, 1.0).is_err());
        assert!(RegionBounds::new(0.0, 1.0, 2.0, 1.0).is_err());
        assert!(RegionBounds::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_tiles_covering() {
        let single = TileAddress::new(7, 113, 50).bounds();
        let inner = RegionBounds::new(
            single.min_lon + 0.1,
            single.max_lon - 0.1,
            single.min_lat + 0.1,
            single.max_lat - 0.1,
        )
        .unwrap();
        assert_eq!(
            tiles_covering(&inner, 7, 256).unwrap(),
            vec![TileAddress::new(7, 113, 50)]
        );

        let wide = RegionBounds::new(-10.0, 10.0, -10.0, 10.0).unwrap();
        let tiles = tiles_covering(&wide, 2, 256).unwrap();
        assert_eq!(
            tiles,
            vec![
                TileAddress::new(2, 1, 1),
                TileAddress::new(2, 2, 1),
                TileAddress::new(2, 1, 2),
                TileAddress::new(2, 2, 2),
            ]
        );

        let polar = RegionBounds::new(0.0, 1.0, 80.0, 90.0).unwrap();
        assert_eq!(tiles_covering(&polar, 0, 256).unwrap().len(), 1);
    }

    #[test]
    fn test_model_to_geographic() {
        assert_eq!(model_to_geographic(0.0, 0.0, 100.0), GeoPoint::new(0.0, 0.0));
        assert_eq!(model_to_geographic(50.0, -50.0, 100.0), GeoPoint::new(180.0, -85.0));
        assert_eq!(model_to_geographic(25.0, 25.0, 100.0), GeoPoint::new(90.0, 42.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(TileAddress::new(7, 1, 2).to_string(), "7/1/2");
        assert_eq!(GeoPoint::new(1.0, 2.0).to_string(), "(1.000000, 2.000000)");
    }
}

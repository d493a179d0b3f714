//! Straight-line elevation profiles.
//!
//! Samples are spaced evenly in longitude and latitude between the two end
//! points. There is no geodesic correction; [`ProfileResult::distance_km`]
//! is informational only.

use crate::coords::GeoPoint;
use crate::engine::ElevationEngine;
use crate::error::{ReliefError, Result};

/// Mean Earth radius used for great-circle distances, in kilometres.
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0;

/// A profile between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileRequest {
    /// Start point (sample 0).
    pub a: GeoPoint,
    /// End point (last sample).
    pub b: GeoPoint,
    /// Number of samples, at least 2.
    pub sample_count: usize,
}

impl ProfileRequest {
    /// Create a request.
    pub fn new(a: GeoPoint, b: GeoPoint, sample_count: usize) -> Self {
        Self { a, b, sample_count }
    }

    /// Check the sample count.
    pub fn validate(&self) -> Result<()> {
        if self.sample_count < 2 {
            return Err(ReliefError::InvalidSampleCount {
                count: self.sample_count,
            });
        }
        Ok(())
    }

    /// Sample positions from `a` to `b`, both included.
    pub fn points(&self) -> Vec<GeoPoint> {
        interpolate(self.a, self.b, self.sample_count)
    }
}

/// Elevations along a profile, index 0 at `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileResult {
    pub a: GeoPoint,
    pub b: GeoPoint,
    /// Elevations in metres.
    pub elevations: Vec<f32>,
}

impl ProfileResult {
    /// Sample positions matching [`elevations`](Self::elevations).
    pub fn points(&self) -> Vec<GeoPoint> {
        interpolate(self.a, self.b, self.elevations.len())
    }

    /// Lowest elevation, if any.
    pub fn min(&self) -> Option<f32> {
        self.elevations.iter().copied().reduce(f32::min)
    }

    /// Highest elevation, if any.
    pub fn max(&self) -> Option<f32> {
        self.elevations.iter().copied().reduce(f32::max)
    }

    /// Great-circle distance between the end points.
    pub fn distance_km(&self) -> f64 {
        haversine_km(self.a, self.b)
    }
}

/// Great-circle distance in kilometres on a sphere of radius
/// [`MEAN_EARTH_RADIUS_KM`].
///
/// # Examples
///
/// ```
/// use relief::coords::GeoPoint;
/// use relief::profile::haversine_km;
///
/// let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
/// assert!((d - 111.195).abs() < 0.001);
/// ```
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * MEAN_EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    if a == b {
        a
    } else {
        a * (1.0 - t) + b * t
    }
}

/// `n` points evenly spaced in lon/lat; exact at both ends.
fn interpolate(a: GeoPoint, b: GeoPoint, n: usize) -> Vec<GeoPoint> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => {
            let last = (n - 1) as f64;
            (0..n)
                .map(|i| {
                    let t = i as f64 / last;
                    GeoPoint::new(lerp(a.lon, b.lon, t), lerp(a.lat, b.lat, t))
                })
                .collect()
        }
    }
}

impl ElevationEngine {
    /// Elevations of `n` evenly spaced points from `a` to `b`.
    ///
    /// Sample 0 is exactly `a` and sample `n - 1` exactly `b`. Tiles are
    /// fetched through the same grouping as
    /// [`elevations_at`](ElevationEngine::elevations_at).
    ///
    /// # Errors
    ///
    /// [`ReliefError::InvalidSampleCount`] for `n < 2`, before any fetch.
    pub async fn sample_profile(&self, a: GeoPoint, b: GeoPoint, n: usize) -> Result<Vec<f32>> {
        let request = ProfileRequest::new(a, b, n);
        request.validate()?;
        self.elevations_at(&request.points()).await
    }

    /// Run a [`ProfileRequest`].
    pub async fn profile(&self, request: ProfileRequest) -> Result<ProfileResult> {
        let elevations = self.sample_profile(request.a, request.b, request.sample_count).await?;
        Ok(ProfileResult {
            a: request.a,
            b: request.b,
            elevations,
        })
    }

    /// Run a profile with the configured default sample count.
    pub async fn profile_default(&self, a: GeoPoint, b: GeoPoint) -> Result<ProfileResult> {
        self.profile(ProfileRequest::new(a, b, self.config().profile_samples))
            .await
    }
}

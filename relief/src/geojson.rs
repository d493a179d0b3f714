//! GeoJSON elevation enrichment.
//!
//! This module provides functions to add elevation data to GeoJSON geometries
//! and to export profiles as GeoJSON features.
//! Enable the `geojson` feature to use this module.
//!
//! # Example
//!
//! ```ignore
//! use relief::ElevationEngine;
//! use relief::geojson::add_elevations_to_geometry;
//! use geojson::Geometry;
//!
//! let engine = ElevationEngine::from_env()?;
//!
//! // Parse a GeoJSON geometry
//! let geometry: Geometry = r#"{"type": "Point", "coordinates": [138.7274, 35.3606]}"#
//!     .parse()
//!     .unwrap();
//!
//! // Add elevation to the geometry
//! let enriched = add_elevations_to_geometry(&engine, geometry).await?;
//! // Result: {"type": "Point", "coordinates": [138.7274, 35.3606, 3776.0]}
//! ```

use geojson::{Feature, Geometry, JsonObject, JsonValue, Value as GeoJsonValue};

use crate::coords::GeoPoint;
use crate::engine::ElevationEngine;
use crate::error::{ReliefError, Result};
use crate::profile::ProfileResult;

/// Add elevations to all coordinates in a GeoJSON geometry.
///
/// Every position gets its elevation as the Z coordinate; an existing third
/// value is replaced. Input positions are in GeoJSON order:
/// `[longitude, latitude]` or `[longitude, latitude, altitude]`.
///
/// All positions are resolved in one batch, so each tile is fetched at most
/// once however many vertices fall on it.
///
/// # Errors
///
/// Returns an error if a position has fewer than 2 elements or a latitude
/// cannot be projected. Unavailable tiles read as 0 m.
///
/// # Example
///
/// ```ignore
/// use relief::geojson::add_elevations_to_geometry;
/// use geojson::Geometry;
///
/// let line: Geometry = r#"{
///     "type": "LineString",
///     "coordinates": [[138.5, 35.5], [138.6, 35.6]]
/// }"#.parse().unwrap();
///
/// let enriched = add_elevations_to_geometry(&engine, line).await?;
/// // [[138.5, 35.5, 500.0], [138.6, 35.6, 750.0]]
/// ```
pub async fn add_elevations_to_geometry(
    engine: &ElevationEngine,
    geometry: Geometry,
) -> Result<Geometry> {
    let mut points = Vec::new();
    collect_points(&geometry.value, &mut points)?;

    let elevations = engine.elevations_at(&points).await?;
    let mut elevations = elevations.into_iter();

    Ok(Geometry::new(apply_elevations(geometry.value, &mut elevations)))
}

/// Add elevations to every feature geometry of a collection, in place.
///
/// Features without geometry are left untouched.
pub async fn add_elevations_to_features(
    engine: &ElevationEngine,
    features: &mut [Feature],
) -> Result<()> {
    let mut points = Vec::new();
    for feature in features.iter() {
        if let Some(geometry) = &feature.geometry {
            collect_points(&geometry.value, &mut points)?;
        }
    }

    let elevations = engine.elevations_at(&points).await?;
    let mut elevations = elevations.into_iter();

    for feature in features.iter_mut() {
        if let Some(geometry) = feature.geometry.take() {
            let value = apply_elevations(geometry.value, &mut elevations);
            feature.geometry = Some(Geometry::new(value));
        }
    }
    Ok(())
}

/// Convert a profile into a `LineString` feature.
///
/// Coordinates are `[lon, lat, elevation]`; the properties carry
/// `samples`, `distance_km`, `min_elevation` and `max_elevation`.
pub fn profile_to_feature(profile: &ProfileResult) -> Feature {
    let coords: Vec<Vec<f64>> = profile
        .points()
        .iter()
        .zip(&profile.elevations)
        .map(|(p, &h)| vec![p.lon, p.lat, h as f64])
        .collect();

    let mut properties = JsonObject::new();
    properties.insert(
        "samples".to_string(),
        JsonValue::from(profile.elevations.len()),
    );
    properties.insert(
        "distance_km".to_string(),
        JsonValue::from(profile.distance_km()),
    );
    if let (Some(min), Some(max)) = (profile.min(), profile.max()) {
        properties.insert("min_elevation".to_string(), JsonValue::from(min as f64));
        properties.insert("max_elevation".to_string(), JsonValue::from(max as f64));
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoJsonValue::LineString(coords))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Read a GeoJSON position as a point.
fn to_point(coord: &[f64]) -> Result<GeoPoint> {
    match coord {
        [lon, lat, ..] => Ok(GeoPoint::new(*lon, *lat)),
        _ => Err(ReliefError::InvalidCoordinate {
            message: "Coordinate must have at least 2 elements (lon, lat)".to_string(),
        }),
    }
}

/// Append every position of the geometry, in document order.
fn collect_points(value: &GeoJsonValue, out: &mut Vec<GeoPoint>) -> Result<()> {
    fn push_all(coords: &[Vec<f64>], out: &mut Vec<GeoPoint>) -> Result<()> {
        for coord in coords {
            out.push(to_point(coord)?);
        }
        Ok(())
    }

    match value {
        GeoJsonValue::Point(coord) => out.push(to_point(coord)?),
        GeoJsonValue::MultiPoint(coords) | GeoJsonValue::LineString(coords) => {
            push_all(coords, out)?
        }
        GeoJsonValue::MultiLineString(lines) | GeoJsonValue::Polygon(lines) => {
            for line in lines {
                push_all(line, out)?;
            }
        }
        GeoJsonValue::MultiPolygon(polygons) => {
            for ring in polygons.iter().flatten() {
                push_all(ring, out)?;
            }
        }
        GeoJsonValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_points(&geometry.value, out)?;
            }
        }
    }
    Ok(())
}

/// Rebuild the geometry, consuming elevations in the order of [`collect_points`].
fn apply_elevations(
    value: GeoJsonValue,
    elevations: &mut impl Iterator<Item = f32>,
) -> GeoJsonValue {
    fn elevate(coord: Vec<f64>, elevations: &mut impl Iterator<Item = f32>) -> Vec<f64> {
        let h = elevations.next().unwrap_or(0.0);
        vec![coord[0], coord[1], h as f64]
    }

    fn elevate_all(
        coords: Vec<Vec<f64>>,
        elevations: &mut impl Iterator<Item = f32>,
    ) -> Vec<Vec<f64>> {
        coords.into_iter().map(|c| elevate(c, elevations)).collect()
    }

    match value {
        GeoJsonValue::Point(coord) => GeoJsonValue::Point(elevate(coord, elevations)),
        GeoJsonValue::MultiPoint(coords) => {
            GeoJsonValue::MultiPoint(elevate_all(coords, elevations))
        }
        GeoJsonValue::LineString(coords) => {
            GeoJsonValue::LineString(elevate_all(coords, elevations))
        }
        GeoJsonValue::MultiLineString(lines) => GeoJsonValue::MultiLineString(
            lines.into_iter().map(|l| elevate_all(l, elevations)).collect(),
        ),
        GeoJsonValue::Polygon(rings) => GeoJsonValue::Polygon(
            rings.into_iter().map(|r| elevate_all(r, elevations)).collect(),
        ),
        GeoJsonValue::MultiPolygon(polygons) => GeoJsonValue::MultiPolygon(
            polygons
                .into_iter()
                .map(|polygon| polygon.into_iter().map(|r| elevate_all(r, elevations)).collect())
                .collect(),
        ),
        GeoJsonValue::GeometryCollection(geometries) => GeoJsonValue::GeometryCollection(
            geometries
                .into_iter()
                .map(|g| Geometry::new(apply_elevations(g.value, elevations)))
                .collect(),
        ),
    }
}

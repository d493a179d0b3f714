//! HTTP request handlers for the elevation service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use relief::coords::tiles_covering;
use relief::{GeoPoint, ProfileRequest, Region, RegionBounds, ReliefError, TerrainClass};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Largest accepted height-field grid (cells per side).
pub const MAX_HEIGHTFIELD_RESOLUTION: usize = 1024;

/// Largest number of DEM tiles one height field may cover.
pub const MAX_HEIGHTFIELD_TILES: usize = 64;

/// Largest accepted profile sample count.
pub const MAX_PROFILE_SAMPLES: usize = 10_000;

/// Query parameters for elevation endpoint.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (|lat| < 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Elevation in meters (nearest raster sample).
    pub elevation: f32,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
    /// Coarse terrain band (water, sand, plain, mountain, snow).
    pub terrain: String,
    /// DEM tile answering the query, as `z/x/y`.
    pub tile: String,
}

/// Query parameters for profile endpoint.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ProfileQuery {
    /// Start latitude.
    pub from_lat: f64,
    /// Start longitude.
    pub from_lon: f64,
    /// End latitude.
    pub to_lat: f64,
    /// End longitude.
    pub to_lon: f64,
    /// Number of samples (default from `RELIEF_PROFILE_SAMPLES`).
    pub samples: Option<usize>,
}

/// A geographic position.
#[derive(Debug, Serialize, ToSchema)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl From<GeoPoint> for Position {
    fn from(p: GeoPoint) -> Self {
        Self { lat: p.lat, lon: p.lon }
    }
}

/// Successful profile response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub from: Position,
    pub to: Position,
    /// Number of samples.
    pub samples: usize,
    /// Great-circle distance between the end points.
    pub distance_km: f64,
    /// Lowest sample in meters.
    pub min_elevation: Option<f32>,
    /// Highest sample in meters.
    pub max_elevation: Option<f32>,
    /// Elevations in meters, index 0 at `from`.
    pub elevations: Vec<f32>,
}

/// Height field request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HeightFieldRequest {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    /// Cells per side (default: tile resolution).
    pub resolution: Option<usize>,
    /// Vertical exaggeration (default from `RELIEF_EXAGGERATION`).
    pub exaggeration: Option<f32>,
}

/// Successful height field response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeightFieldResponse {
    /// Cells per side.
    pub resolution: usize,
    /// Scaled heights, row-major, row 0 north.
    pub heights: Vec<f32>,
    /// Slopes, same layout as `heights`.
    pub slopes: Vec<f32>,
}

/// A GeoJSON geometry.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct GeometryBody(pub geojson::Geometry);

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of tiles in cache.
    pub cached_tiles: usize,
    /// Cached tile addresses as `z/x/y`.
    pub tiles: Vec<String>,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
    /// Tile fetches issued.
    pub fetches: u64,
    /// Tiles that failed and were replaced by 0 m.
    pub failures: u64,
    /// Tile source description.
    pub source: String,
}

/// Cache clear response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResponse {
    /// Number of tiles dropped.
    pub cleared: usize,
}

/// Get elevation for given coordinates.
///
/// # Returns
///
/// - `200 OK` with elevation data (0 m where the tile is unavailable)
/// - `400 Bad Request` if the latitude cannot be projected
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation at the point", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse)
    )
)]
#[axum::debug_handler]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> impl IntoResponse {
    tracing::debug!(lat = query.lat, lon = query.lon, "Elevation query");

    let point = GeoPoint::new(query.lon, query.lat);
    let location = match state.engine.locate(point) {
        Ok(location) => location,
        Err(e) => return error_response(e),
    };

    match state.engine.elevation_at(point).await {
        Ok(elevation) => {
            tracing::info!(
                lat = query.lat,
                lon = query.lon,
                elevation = elevation,
                "Elevation found"
            );
            (
                StatusCode::OK,
                Json(ElevationResponse {
                    elevation,
                    lat: query.lat,
                    lon: query.lon,
                    terrain: TerrainClass::classify(elevation).to_string(),
                    tile: location.address.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Add elevations to every coordinate of a GeoJSON geometry.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "elevation",
    request_body = GeometryBody,
    responses(
        (status = 200, description = "Geometry with elevation as Z", body = GeometryBody),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse)
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Json(GeometryBody(geometry)): Json<GeometryBody>,
) -> impl IntoResponse {
    match relief::geojson::add_elevations_to_geometry(&state.engine, geometry).await {
        Ok(enriched) => (StatusCode::OK, Json(GeometryBody(enriched))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Sample an elevation profile between two points.
#[utoipa::path(
    get,
    path = "/profile",
    tag = "elevation",
    params(ProfileQuery),
    responses(
        (status = 200, description = "Elevation profile", body = ProfileResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProfileQuery>,
) -> impl IntoResponse {
    let samples = query
        .samples
        .unwrap_or(state.engine.config().profile_samples);
    if samples > MAX_PROFILE_SAMPLES {
        return bad_request(format!(
            "Too many samples: {} (maximum {})",
            samples, MAX_PROFILE_SAMPLES
        ));
    }

    let request = ProfileRequest::new(
        GeoPoint::new(query.from_lon, query.from_lat),
        GeoPoint::new(query.to_lon, query.to_lat),
        samples,
    );

    match state.engine.profile(request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ProfileResponse {
                from: result.a.into(),
                to: result.b.into(),
                samples: result.elevations.len(),
                distance_km: result.distance_km(),
                min_elevation: result.min(),
                max_elevation: result.max(),
                elevations: result.elevations,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Build a height field over a geographic region.
#[utoipa::path(
    post,
    path = "/heightfield",
    tag = "elevation",
    request_body = HeightFieldRequest,
    responses(
        (status = 200, description = "Height and slope grids", body = HeightFieldResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn post_heightfield(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeightFieldRequest>,
) -> impl IntoResponse {
    let config = state.engine.config();
    let resolution = request.resolution.unwrap_or(config.tile_res as usize);
    let exaggeration = request.exaggeration.unwrap_or(config.exaggeration);

    if resolution > MAX_HEIGHTFIELD_RESOLUTION {
        return bad_request(format!(
            "Resolution too large: {} (maximum {})",
            resolution, MAX_HEIGHTFIELD_RESOLUTION
        ));
    }

    let bounds = RegionBounds {
        min_lon: request.min_lon,
        max_lon: request.max_lon,
        min_lat: request.min_lat,
        max_lat: request.max_lat,
    };

    match tiles_covering(&bounds, config.dem_zoom, config.tile_res) {
        Ok(tiles) if tiles.len() > MAX_HEIGHTFIELD_TILES => {
            return bad_request(format!(
                "Region too large: covers {} tiles (maximum {})",
                tiles.len(),
                MAX_HEIGHTFIELD_TILES
            ));
        }
        Ok(_) => {}
        Err(e) => return error_response(e),
    }

    match state
        .engine
        .build_height_field(Region::Bounds(bounds), resolution, exaggeration)
        .await
    {
        Ok(field) => (
            StatusCode::OK,
            Json(HeightFieldResponse {
                resolution: field.resolution(),
                heights: field.heights().to_vec(),
                slopes: field.slopes().to_vec(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Create an error response from a library error.
fn error_response(e: ReliefError) -> axum::response::Response {
    let status = match &e {
        ReliefError::ProjectionSingularity { .. } => StatusCode::BAD_REQUEST,
        e if e.is_invalid_request() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::warn!(error = %e, status = %status, "Request failed");

    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

fn bad_request(message: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
///
/// Returns information about the tile cache.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let store = state.engine.store();
    let stats = store.stats();

    Json(StatsResponse {
        cached_tiles: stats.count,
        tiles: stats.keys.iter().map(ToString::to_string).collect(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
        fetches: stats.fetch_count,
        failures: stats.failure_count,
        source: store.source_description(),
    })
}

/// Drop every cached tile and reset the counters.
#[utoipa::path(
    delete,
    path = "/cache",
    tag = "system",
    responses((status = 200, description = "Cache cleared", body = ClearResponse))
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let store = state.engine.store();
    let cleared = store.stats().count;
    store.clear().await;

    tracing::info!(cleared, "Tile cache cleared");

    Json(ClearResponse { cleared })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_query_deserialize() {
        let json = r#"{"lat": 35.5, "lon": 138.7}"#;
        let query: ElevationQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.lat, 35.5);
        assert_eq!(query.lon, 138.7);
    }

    #[test]
    fn test_heightfield_request_defaults() {
        let json = r#"{"min_lon": 138.0, "max_lon": 139.0, "min_lat": 35.0, "max_lat": 36.0}"#;
        let request: HeightFieldRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.resolution, None);
        assert_eq!(request.exaggeration, None);
    }

    #[test]
    fn test_elevation_response_serialize() {
        let response = ElevationResponse {
            elevation: 1234.5,
            lat: 35.5,
            lon: 138.7,
            terrain: "mountain".to_string(),
            tile: "7/113/50".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("1234.5"));
        assert!(json.contains("35.5"));
        assert!(json.contains("7/113/50"));
    }

    #[test]
    fn test_geometry_body_is_transparent() {
        let json = r#"{"type": "Point", "coordinates": [138.5, 35.5]}"#;
        let body: GeometryBody = serde_json::from_str(json).unwrap();
        let out = serde_json::to_value(&body).unwrap();
        assert_eq!(out["type"], "Point");
    }

    #[test]
    fn test_health_response_serialize() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }
}

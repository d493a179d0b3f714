//! Relief Service - HTTP microservice for Terrarium elevation queries.
//!
//! A REST API for point elevations, profiles and height fields over
//! Web-Mercator DEM tiles.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RELIEF_TILE_SERVER` | Tile server base URL or local tile directory | AWS Terrarium |
//! | `RELIEF_DEM_ZOOM` | Zoom level of the DEM tiles | 7 |
//! | `RELIEF_CACHE_CAPACITY` | Maximum tiles in cache | unbounded |
//! | `RELIEF_FAILURE_POLICY` | `cache` or `retry` for failed tiles | cache |
//! | `RELIEF_PORT` | HTTP server port | 8080 |
//! | `RELIEF_PRELOAD` | Bounds to warm at startup (`min_lon,min_lat,max_lon,max_lat;...`) | None |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! The remaining `RELIEF_*` variables are described in `relief::config`.
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Get elevation at coordinates
//! - `POST /elevation` - Add elevations to a GeoJSON geometry
//! - `GET /profile?from_lat&from_lon&to_lat&to_lon[&samples]` - Elevation profile
//! - `POST /heightfield` - Height and slope grids over a region
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `DELETE /cache` - Clear the tile cache
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use relief::{ElevationEngine, RegionBounds, TerrainConfig};
use relief_service::{router, AppState};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relief_service=info,relief=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("RELIEF_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles every other RELIEF_* variable
    let config = TerrainConfig::from_env()?;
    let engine = ElevationEngine::new(config)?;

    tracing::info!(
        source = %engine.store().source_description(),
        dem_zoom = engine.config().dem_zoom,
        cache_capacity = ?engine.store().cache_capacity(),
        failure_policy = %engine.store().failure_policy(),
        port = port,
        "Starting relief service"
    );

    // Handle RELIEF_PRELOAD environment variable
    if let Ok(preload_val) = std::env::var("RELIEF_PRELOAD") {
        let zoom = engine.config().dem_zoom;
        for bounds in parse_preload_bounds(&preload_val) {
            tracing::info!(?bounds, "Preloading tiles into cache");
            match engine.store().preload(&bounds, zoom).await {
                Ok(stats) => tracing::info!(
                    tiles_loaded = stats.tiles_loaded,
                    tiles_already_cached = stats.tiles_already_cached,
                    tiles_matched = stats.tiles_matched,
                    elapsed_ms = stats.elapsed_ms,
                    "Preload complete"
                ),
                Err(e) => tracing::warn!(error = %e, "Preload failed"),
            }
        }
    }

    let state = Arc::new(AppState { engine });

    // Build router
    let app = router(state).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse the `RELIEF_PRELOAD` environment variable value into bounds.
///
/// Format: `min_lon,min_lat,max_lon,max_lat`, several separated by `;`.
/// Malformed entries are logged and skipped.
fn parse_preload_bounds(value: &str) -> Vec<RegionBounds> {
    value
        .trim()
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|bbox_str| {
            let parts: Vec<f64> = bbox_str
                .split(',')
                .filter_map(|s| s.trim().parse::<f64>().ok())
                .collect();
            let parsed = match parts[..] {
                [min_lon, min_lat, max_lon, max_lat] => {
                    RegionBounds::new(min_lon, max_lon, min_lat, max_lat).ok()
                }
                _ => None,
            };
            if parsed.is_none() {
                tracing::warn!(
                    bbox = bbox_str,
                    "Invalid bounding box format, expected min_lon,min_lat,max_lon,max_lat"
                );
            }
            parsed
        })
        .collect()
}

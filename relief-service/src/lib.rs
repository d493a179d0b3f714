//! Relief Service Library
//!
//! HTTP handlers, OpenAPI description and router for the elevation service.
//! This library is used by both the relief-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use relief::ElevationEngine;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Elevation engine (owns the tile cache).
    pub engine: ElevationEngine,
}

/// OpenAPI documentation for the relief service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relief Elevation Service",
        version = "0.1.0",
        description = "REST API for elevation queries, profiles and height fields \
                       over Terrarium DEM tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "Pedro Sanz Martinez", url = "https://github.com/pedrosanzmtz/relief")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::get_profile,
        handlers::post_heightfield,
        handlers::health_check,
        handlers::get_stats,
        handlers::clear_cache,
    ),
    components(
        schemas(
            handlers::ElevationQuery,
            handlers::ElevationResponse,
            handlers::ProfileQuery,
            handlers::ProfileResponse,
            handlers::Position,
            handlers::HeightFieldRequest,
            handlers::HeightFieldResponse,
            handlers::GeometryBody,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
            handlers::ClearResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router with all routes and the Swagger UI.
///
/// Middleware (tracing, CORS) is left to the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/profile", get(handlers::get_profile))
        .route("/heightfield", post(handlers::post_heightfield))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/cache", delete(handlers::clear_cache))
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    ElevationQuery, ElevationResponse, ErrorResponse, HealthResponse, HeightFieldRequest,
    HeightFieldResponse, ProfileQuery, ProfileResponse, StatsResponse,
};

//! Constellation SDN control plane
//!
//! Turns position snapshots of an emulated satellite constellation into a link topology and a
//! next-hop route table, pushes both into Kubernetes as Topology and Route objects, and reconciles
//! those objects against the per-node network agents.

pub mod api;
pub mod config;
pub mod control;
pub mod crd;
pub mod error;
pub mod k8s;
pub mod models;
pub mod network;
pub mod orbit;
pub mod partition;
pub mod reconcile;
pub mod retry;

use axum::http::{header, Method};
use axum::{routing::get, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::AppState;

/// Create the application router with the given state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health_check))
        .route("/metrics", get(api::metrics::metrics_handler))
        // Queries
        .route("/getTopologyGraph", get(api::query::topology_graph))
        .route("/getRoute", get(api::query::route))
        .route("/getConnection", get(api::query::connection))
        .route("/getDistance", get(api::query::distance))
        .route("/getRouteHops", get(api::query::route_hops))
        .route("/getSpreadArray", get(api::query::spread))
        .route("/api/summary", get(api::query::summary))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Create CORS layer; origins come from `CORS_ALLOWED_ORIGINS`
fn cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

//! OpenAPI documentation for the constellation SDN query API

use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

/// API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Constellation SDN API",
        version = "1.0.0",
        description = "Read-only queries over an emulated satellite constellation.\n\nEvery query answers `{\"result\": ...}` and refers to nodes by UUID.",
        license(name = "MIT"),
        contact(name = "Constellation SDN Team")
    ),
    servers(
        (url = "http://localhost:30101", description = "Local control plane")
    ),
    tags(
        (name = "query", description = "Topology, route and distance queries"),
        (name = "health", description = "Liveness and metrics")
    ),
    paths(
        crate::api::query::topology_graph,
        crate::api::query::route,
        crate::api::query::connection,
        crate::api::query::distance,
        crate::api::query::route_hops,
        crate::api::query::spread,
        crate::api::query::summary,
        crate::api::health::health_check,
        crate::api::metrics::metrics_handler,
    ),
    components(
        schemas(
            crate::api::response::ErrorBody,
            crate::api::response::ApiError,
            crate::api::health::HealthResponse,
            crate::control::SpreadLink,
            crate::control::StateSummary,
            crate::models::PositionSnapshot,
            crate::models::SatelliteRecord,
            crate::models::SiteRecord,
            crate::models::NodeType,
            EdgesResultSchema,
            RouteResultSchema,
            ConnectionResultSchema,
            DistanceResultSchema,
            HopsResultSchema,
            SpreadResultSchema,
        )
    )
)]
pub struct ApiDoc;

// --- Query result schemas ---

/// Topology edges
#[derive(Serialize, Deserialize, ToSchema)]
pub struct EdgesResultSchema {
    /// UUID pairs in ascending index order
    #[schema(example = json!([["sat-0", "sat-1"], ["sat-0", "gs-0"]]))]
    pub result: Vec<Vec<String>>,
}

/// Route between two nodes
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RouteResultSchema {
    /// UUIDs from source to destination, null when unreachable
    pub result: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ConnectionResultSchema {
    pub result: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DistanceResultSchema {
    /// Distance in km
    #[schema(example = 1043.7)]
    pub result: f64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HopsResultSchema {
    /// Route length in nodes, one entry per target
    pub result: Vec<Option<usize>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SpreadResultSchema {
    pub result: Vec<crate::control::SpreadLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_query_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/getTopologyGraph",
            "/getRoute",
            "/getConnection",
            "/getDistance",
            "/getRouteHops",
            "/getSpreadArray",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}

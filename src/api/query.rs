//! Read-only query endpoints over the installed orbit model and network
//!
//! UUIDs are translated to indices by the control client. Unknown UUIDs are 404 and missing
//! parameters are 400.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::response::QueryResult;
use crate::api::AppState;
use crate::control::{SpreadLink, StateSummary};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PairQuery {
    /// Source node UUID
    pub src: Option<String>,
    /// Destination node UUID
    pub dst: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct HopsQuery {
    /// Source node UUID
    pub pre_id: Option<String>,
    /// Comma-separated target UUIDs
    pub sa_id_list: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SpreadQuery {
    /// Source node UUID
    pub src: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AppResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("missing query parameter '{}'", name)))
}

impl PairQuery {
    fn pair(&self) -> AppResult<(&str, &str)> {
        Ok((required(&self.src, "src")?, required(&self.dst, "dst")?))
    }
}

/// Undirected topology edges as UUID pairs
#[utoipa::path(
    get,
    path = "/getTopologyGraph",
    tag = "query",
    responses(
        (status = 200, description = "Edges in ascending index order", body = super::openapi::EdgesResultSchema),
    )
)]
pub async fn topology_graph(State(state): State<AppState>) -> Json<QueryResult<Vec<[String; 2]>>> {
    Json(QueryResult::new(state.control.topology_graph().await))
}

/// Route from `src` to `dst`, both endpoints included; `null` when unreachable
#[utoipa::path(
    get,
    path = "/getRoute",
    tag = "query",
    params(PairQuery),
    responses(
        (status = 200, description = "Node UUIDs along the route", body = super::openapi::RouteResultSchema),
        (status = 400, description = "Missing parameter", body = super::response::ErrorBody),
        (status = 404, description = "Unknown UUID", body = super::response::ErrorBody),
        (status = 500, description = "Routing loop", body = super::response::ErrorBody),
    )
)]
pub async fn route(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> AppResult<Json<QueryResult<Option<Vec<String>>>>> {
    let (src, dst) = query.pair()?;
    Ok(Json(QueryResult::new(state.control.route(src, dst).await?)))
}

/// Whether `src` and `dst` share a direct link
#[utoipa::path(
    get,
    path = "/getConnection",
    tag = "query",
    params(PairQuery),
    responses(
        (status = 200, description = "Direct link exists", body = super::openapi::ConnectionResultSchema),
        (status = 400, description = "Missing parameter", body = super::response::ErrorBody),
        (status = 404, description = "Unknown UUID", body = super::response::ErrorBody),
    )
)]
pub async fn connection(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> AppResult<Json<QueryResult<bool>>> {
    let (src, dst) = query.pair()?;
    Ok(Json(QueryResult::new(state.control.connection(src, dst).await?)))
}

/// Straight-line distance in km between `src` and `dst`
#[utoipa::path(
    get,
    path = "/getDistance",
    tag = "query",
    params(PairQuery),
    responses(
        (status = 200, description = "Distance in km", body = super::openapi::DistanceResultSchema),
        (status = 400, description = "Missing parameter", body = super::response::ErrorBody),
        (status = 404, description = "Unknown UUID", body = super::response::ErrorBody),
    )
)]
pub async fn distance(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> AppResult<Json<QueryResult<f64>>> {
    let (src, dst) = query.pair()?;
    Ok(Json(QueryResult::new(state.control.distance(src, dst).await?)))
}

/// Route length in nodes from `preId` to each UUID of `saIdList`
#[utoipa::path(
    get,
    path = "/getRouteHops",
    tag = "query",
    params(HopsQuery),
    responses(
        (status = 200, description = "One entry per target, null when unreachable", body = super::openapi::HopsResultSchema),
        (status = 400, description = "Missing parameter", body = super::response::ErrorBody),
        (status = 404, description = "Unknown UUID", body = super::response::ErrorBody),
    )
)]
pub async fn route_hops(
    State(state): State<AppState>,
    Query(query): Query<HopsQuery>,
) -> AppResult<Json<QueryResult<Vec<Option<usize>>>>> {
    let src = required(&query.pre_id, "preId")?;
    let targets: Vec<String> = required(&query.sa_id_list, "saIdList")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Json(QueryResult::new(
        state.control.route_hops(src, &targets).await?,
    )))
}

/// Breadth-first fan-out from `src` over low-orbit satellites
#[utoipa::path(
    get,
    path = "/getSpreadArray",
    tag = "query",
    params(SpreadQuery),
    responses(
        (status = 200, description = "Discovery links by hop level", body = super::openapi::SpreadResultSchema),
        (status = 400, description = "Missing parameter", body = super::response::ErrorBody),
        (status = 404, description = "Unknown UUID", body = super::response::ErrorBody),
    )
)]
pub async fn spread(
    State(state): State<AppState>,
    Query(query): Query<SpreadQuery>,
) -> AppResult<Json<QueryResult<Vec<SpreadLink>>>> {
    let src = required(&query.src, "src")?;
    Ok(Json(QueryResult::new(state.control.spread(src).await?)))
}

/// Snapshot timestamp and node counts
#[utoipa::path(
    get,
    path = "/api/summary",
    tag = "query",
    responses(
        (status = 200, description = "Installed state", body = StateSummary),
    )
)]
pub async fn summary(State(state): State<AppState>) -> Json<StateSummary> {
    Json(state.control.summary().await)
}

// HTTP request handlers
use crate::application::fleet_repository::StationQuery;
use crate::domain::cluster::ClusterId;
use crate::domain::error::EngineError;
use crate::domain::geo::{BoundingBox, Coordinate};
use crate::domain::view_mode::ViewMode;
use crate::infrastructure::event_stream::notification_stream_response;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_NEAREST: usize = 3;

/// Engine failures as HTTP responses.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::TransientFetch { .. } => StatusCode::BAD_GATEWAY,
            EngineError::NoEligibleCandidate | EngineError::NoServiceCenter => {
                return StatusCode::NO_CONTENT.into_response();
            }
            EngineError::UnknownStation(_) | EngineError::StaleClusterReference(_) => {
                StatusCode::NOT_FOUND
            }
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn reply<T: Serialize>(data: &T, headers: &HeaderMap) -> Response {
    match json_response(data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

fn origin(lon: f64, lat: f64) -> Result<Coordinate, Response> {
    Coordinate::checked(lon, lat)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "invalid coordinate").into_response())
}

#[derive(Deserialize)]
pub struct RefreshParams {
    pub timeframe: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct ViewportParams {
    pub west: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub north: Option<f64>,
    pub zoom: f64,
}

#[derive(Deserialize)]
pub struct ZoomParams {
    pub zoom: f64,
}

#[derive(Deserialize)]
pub struct NearestParams {
    pub lon: f64,
    pub lat: f64,
    pub n: Option<usize>,
}

#[derive(Deserialize)]
pub struct OriginBody {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Serialize)]
pub struct ExpansionZoom {
    pub cluster_id: ClusterId,
    pub zoom: f64,
}

#[derive(Serialize)]
pub struct CommandResult {
    pub message: String,
    pub generation: u64,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current station snapshot
pub async fn list_stations(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.fleet.stations();
    reply(snapshot.as_ref(), &headers).await
}

/// Explicit (possibly historical) station fetch
pub async fn refresh_stations(
    Query(params): Query<RefreshParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let query = StationQuery {
        timeframe: params.timeframe.unwrap_or_else(|| StationQuery::live().timeframe),
        start_date: params.start_date,
        end_date: params.end_date,
    };
    let snapshot = state.fleet.refresh_stations(query).await?;
    Ok(reply(snapshot.as_ref(), &headers).await)
}

/// Cluster nodes for a viewport; missing bounds mean the whole world
pub async fn list_clusters(
    Query(params): Query<ViewportParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let world = BoundingBox::world();
    let bounds = BoundingBox::new(
        params.west.unwrap_or(world.west),
        params.south.unwrap_or(world.south),
        params.east.unwrap_or(world.east),
        params.north.unwrap_or(world.north),
    );
    let nodes = state.fleet.clusters(bounds, params.zoom);
    reply(&nodes, &headers).await
}

pub async fn expansion_zoom(
    Path(id): Path<u64>,
    Query(params): Query<ZoomParams>,
    State(state): State<Arc<AppState>>,
) -> Json<ExpansionZoom> {
    let cluster_id = ClusterId(id);
    let zoom = state.fleet.expansion_zoom(cluster_id, params.zoom);
    Json(ExpansionZoom { cluster_id, zoom })
}

pub async fn cluster_children(
    Path(id): Path<u64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let nodes = state.fleet.cluster_children(ClusterId(id))?;
    Ok(reply(&nodes, &headers).await)
}

pub async fn cluster_leaves(
    Path(id): Path<u64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let stations = state.fleet.cluster_leaves(ClusterId(id))?;
    Ok(reply(&stations, &headers).await)
}

pub async fn nearest_stations(
    Query(params): Query<NearestParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = match origin(params.lon, params.lat) {
        Ok(origin) => origin,
        Err(response) => return response,
    };
    let nearest = state
        .fleet
        .nearest(origin, params.n.unwrap_or(DEFAULT_NEAREST));
    reply(&nearest, &headers).await
}

pub async fn best_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OriginBody>,
) -> Result<Response, ApiError> {
    let origin = match origin(body.lon, body.lat) {
        Ok(origin) => origin,
        Err(response) => return Ok(response),
    };
    let planned = state.fleet.request_best_route(origin).await?;
    Ok(Json(planned).into_response())
}

pub async fn dispatch_technician(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let planned = state.fleet.request_dispatch(&id).await?;
    Ok(Json(planned).into_response())
}

pub async fn list_routes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.fleet.routes())
}

pub async fn heal_station(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandResult>, ApiError> {
    let snapshot = state.fleet.trigger_heal(&id).await?;
    Ok(Json(CommandResult {
        message: format!("Self-healing applied for {}", id),
        generation: snapshot.generation,
    }))
}

pub async fn stress_station(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandResult>, ApiError> {
    let snapshot = state.fleet.trigger_stress(&id).await?;
    Ok(Json(CommandResult {
        message: format!("Stress simulated for {}", id),
        generation: snapshot.generation,
    }))
}

pub async fn retrain_model(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let message = state.fleet.retrain_model().await?;
    Ok(Json(serde_json::json!({ "message": message })))
}

pub async fn list_service_centers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.fleet.service_centers())
}

pub async fn maintenance_queue(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    reply(&state.fleet.maintenance_queue(), &headers).await
}

pub async fn fleet_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.fleet.summary())
}

pub async fn list_events(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let events = state.fleet.events();
    reply(events.as_ref(), &headers).await
}

pub async fn list_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.fleet.notifications())
}

/// Live notification feed as NDJSON, starting with the recent history
pub async fn stream_alerts(State(state): State<Arc<AppState>>) -> Response {
    let rx = state.fleet.subscribe();
    notification_stream_response(state.fleet.notifications(), rx)
}

pub async fn get_mode(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "mode": state.fleet.mode(),
        "polling": state.fleet.status(),
    }))
}

pub async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(mode): Json<ViewMode>,
) -> Json<serde_json::Value> {
    let status = state.fleet.set_mode(mode).await;
    Json(serde_json::json!({ "mode": mode, "polling": status }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (
                EngineError::TransientFetch {
                    operation: "fetch stations",
                    reason: "timeout".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (EngineError::NoEligibleCandidate, StatusCode::NO_CONTENT),
            (EngineError::NoServiceCenter, StatusCode::NO_CONTENT),
            (EngineError::UnknownStation("x".to_string()), StatusCode::NOT_FOUND),
            (EngineError::StaleClusterReference(ClusterId(7)), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_origin_validation() {
        assert!(origin(-97.7, 30.3).is_ok());
        let rejected = origin(f64::NAN, 30.3).unwrap_err();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }
}

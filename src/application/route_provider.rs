// Routing trait for the turn-by-turn routing service
use crate::domain::geo::Coordinate;
use async_trait::async_trait;
use serde::Serialize;

/// Path geometry as returned by the router, `(lon, lat)` pairs. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePath {
    pub coordinates: Vec<[f64; 2]>,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, from: Coordinate, to: Coordinate) -> anyhow::Result<RoutePath>;
}

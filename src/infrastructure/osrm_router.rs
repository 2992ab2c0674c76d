// OSRM route provider - turn-by-turn geometry from an OSRM-compatible server
use crate::application::route_provider::{RoutePath, RouteProvider};
use crate::domain::geo::Coordinate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    base_url: String,
    profile: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl OsrmRouter {
    pub fn new(base_url: &str, profile: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build routing client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
            client,
        })
    }

    fn route_url(&self, from: Coordinate, to: Coordinate) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?geometries=geojson&overview=full",
            self.base_url,
            urlencoding::encode(&self.profile),
            from.longitude,
            from.latitude,
            to.longitude,
            to.latitude
        )
    }
}

/// First route's geometry, or an error when the router found none.
fn first_path(response: OsrmResponse) -> Result<RoutePath> {
    let code = response.code.unwrap_or_default();
    match response.routes.into_iter().next() {
        Some(route) => Ok(RoutePath {
            coordinates: route.geometry.coordinates,
        }),
        None => anyhow::bail!("Router returned no route (code {:?})", code),
    }
}

#[async_trait]
impl RouteProvider for OsrmRouter {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<RoutePath> {
        let url = self.route_url(from, to);
        tracing::debug!("Requesting route: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to router")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Route request failed with status {}: {}", status, body);
        }

        let data = response
            .json::<OsrmResponse>()
            .await
            .context("Failed to parse router response")?;
        first_path(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_url_is_lon_lat_ordered() {
        let router =
            OsrmRouter::new("https://router.project-osrm.org/", "driving", Duration::from_secs(1)).unwrap();
        let url = router.route_url(Coordinate::new(-97.74, 30.27), Coordinate::new(-97.7, 30.3));
        assert_eq!(
            url,
            "https://router.project-osrm.org/route/v1/driving/-97.74,30.27;-97.7,30.3?geometries=geojson&overview=full"
        );
    }

    #[test]
    fn test_first_route_geometry() {
        let ok: OsrmResponse = serde_json::from_str(
            r#"{"code":"Ok","routes":[{"geometry":{"type":"LineString","coordinates":[[-97.74,30.27],[-97.7,30.3]]},"distance":5012.3}]}"#,
        )
        .unwrap();
        assert_eq!(first_path(ok).unwrap().coordinates.len(), 2);

        let none: OsrmResponse = serde_json::from_str(r#"{"code":"NoRoute","routes":[]}"#).unwrap();
        assert!(first_path(none).is_err());
    }
}

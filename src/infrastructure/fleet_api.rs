// Fleet API repository implementation - JSON over HTTP to the operations backend
use crate::application::fleet_repository::{FleetRepository, StationQuery, StationsPage};
use crate::domain::event_log::EventLogEntry;
use crate::domain::station::{Station, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FleetApiRepository {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    timeframes: Vec<Timeframe>,
    stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
struct TickResponse {
    stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<EventLogEntry>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct TickRequest {
    timestamp: String,
}

impl FleetApiRepository {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build fleet API client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn stations_url(&self, query: &StationQuery) -> String {
        let mut url = format!(
            "{}/api/stations?timeframe={}",
            self.base_url,
            urlencoding::encode(&query.timeframe)
        );
        if let Some(start) = &query.start_date {
            url.push_str(&format!("&start_date={}", urlencoding::encode(start)));
        }
        if let Some(end) = &query.end_date {
            url.push_str(&format!("&end_date={}", urlencoding::encode(end)));
        }
        url
    }

    fn station_command_url(&self, command: &str, station_id: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url,
            command,
            urlencoding::encode(station_id)
        )
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} failed with status {}: {}", what, status, body);
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        Self::read_json(response, what).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<&B>,
        what: &str,
    ) -> Result<T> {
        tracing::debug!("POST {}", url);
        let mut request = self.client.post(url).header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        Self::read_json(response, what).await
    }
}

#[async_trait]
impl FleetRepository for FleetApiRepository {
    async fn fetch_stations(&self, query: &StationQuery) -> Result<StationsPage> {
        let url = self.stations_url(query);
        let data: StationsResponse = self.get(&url, "stations").await?;
        Ok(StationsPage {
            stations: data.stations,
            timeframes: data.timeframes,
        })
    }

    async fn simulation_tick(&self, timestamp: DateTime<Utc>) -> Result<Vec<Station>> {
        let url = format!("{}/api/simulation/tick", self.base_url);
        let body = TickRequest {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let data: TickResponse = self.post(&url, Some(&body), "simulation tick").await?;
        Ok(data.stations)
    }

    async fn fetch_logs(&self) -> Result<Vec<EventLogEntry>> {
        let url = format!("{}/api/logs", self.base_url);
        let data: LogsResponse = self.get(&url, "logs").await?;
        Ok(data.logs)
    }

    async fn heal(&self, station_id: &str) -> Result<()> {
        let url = self.station_command_url("heal", station_id);
        let data: MessageResponse = self.post::<(), _>(&url, None, "heal").await?;
        tracing::info!("{}", data.message);
        Ok(())
    }

    async fn simulate_stress(&self, station_id: &str) -> Result<()> {
        let url = self.station_command_url("simulate", station_id);
        let data: MessageResponse = self.post::<(), _>(&url, None, "simulate stress").await?;
        tracing::info!("{}", data.message);
        Ok(())
    }

    async fn retrain_model(&self) -> Result<String> {
        let url = format!("{}/api/train", self.base_url);
        let data: MessageResponse = self.post::<(), _>(&url, None, "retrain").await?;
        Ok(data.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> FleetApiRepository {
        FleetApiRepository::new("http://localhost:8000/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_urls() {
        let repo = repository();
        assert_eq!(
            repo.stations_url(&StationQuery::live()),
            "http://localhost:8000/api/stations?timeframe=0"
        );

        let historical = StationQuery {
            timeframe: "custom".to_string(),
            start_date: Some("2025-01-01".to_string()),
            end_date: Some("2025-01-31".to_string()),
        };
        assert_eq!(
            repo.stations_url(&historical),
            "http://localhost:8000/api/stations?timeframe=custom&start_date=2025-01-01&end_date=2025-01-31"
        );
        assert_eq!(
            repo.station_command_url("heal", "EV Austin/02"),
            "http://localhost:8000/api/heal/EV%20Austin%2F02"
        );
    }

    #[test]
    fn test_stations_payload() {
        let json = r#"{
            "timeframes": [{"id": "0", "label": "Live"}],
            "stations": [{
                "station_id": "ST-1", "station_name": "EV-Austin-01", "city": "Austin",
                "longitude": -97.74, "latitude": 30.27, "risk_score": 0.82,
                "utilization_rate": 0.5, "current_price": null, "needs_maintenance": false
            }, {
                "station_id": "ST-2", "station_name": "EV-Austin-02"
            }]
        }"#;
        let data: StationsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(data.timeframes[0].label, "Live");
        assert_eq!(data.stations[0].current_price, None);
        assert!(data.stations[0].coordinate().is_some());
        assert!(data.stations[1].coordinate().is_none());
    }

    #[test]
    fn test_null_cells_parse_without_losing_the_page() {
        let json = r#"{
            "message": "Tick processed",
            "stations": [{
                "station_id": "ST-1", "station_name": "EV-Austin-01", "city": "Austin",
                "network": null, "longitude": null, "latitude": 30.27, "risk_score": 0.4,
                "utilization_rate": null, "historical_utilization_avg": null,
                "current_price": null, "temperature_f": null, "needs_maintenance": false,
                "revenue_at_risk_daily": null, "root_cause_diagnosis": null
            }, {
                "station_id": "ST-2", "station_name": "EV-Austin-02", "city": "Austin",
                "network": "Tesla", "longitude": -97.70, "latitude": 30.30, "risk_score": 0.1,
                "utilization_rate": 0.35, "historical_utilization_avg": 0.5,
                "current_price": 0.42, "temperature_f": 71.0, "needs_maintenance": false,
                "revenue_at_risk_daily": 0.0, "root_cause_diagnosis": "Healthy"
            }]
        }"#;
        let tick: TickResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tick.stations.len(), 2);
        assert!(tick.stations[0].coordinate().is_none());
        assert!(tick.stations[0].network.is_empty());
        assert_eq!(tick.stations[0].revenue_at_risk_daily, 0.0);
        assert_eq!(tick.stations[1].current_price, Some(0.42));
        assert!(tick.stations[1].coordinate().is_some());
    }

    #[test]
    fn test_tick_without_stations_is_an_error() {
        assert!(serde_json::from_str::<TickResponse>(r#"{"message": "Tick processed"}"#).is_err());
        let logs: LogsResponse = serde_json::from_str("{}").unwrap();
        assert!(logs.logs.is_empty());
    }
}

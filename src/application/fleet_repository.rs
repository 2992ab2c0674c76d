// Repository trait for the fleet/operations service
use crate::domain::event_log::EventLogEntry;
use crate::domain::station::{Station, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which slice of history a station fetch asks for. `timeframe = "0"` is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationQuery {
    pub timeframe: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl StationQuery {
    pub fn live() -> Self {
        Self {
            timeframe: "0".to_string(),
            start_date: None,
            end_date: None,
        }
    }
}

impl Default for StationQuery {
    fn default() -> Self {
        Self::live()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StationsPage {
    pub stations: Vec<Station>,
    pub timeframes: Vec<Timeframe>,
}

#[async_trait]
pub trait FleetRepository: Send + Sync {
    /// Current (or historical) station states plus the selectable timeframes
    async fn fetch_stations(&self, query: &StationQuery) -> anyhow::Result<StationsPage>;

    /// Advance the live simulation to `timestamp` and return the new station states
    async fn simulation_tick(&self, timestamp: DateTime<Utc>) -> anyhow::Result<Vec<Station>>;

    /// Full system event log, oldest first
    async fn fetch_logs(&self) -> anyhow::Result<Vec<EventLogEntry>>;

    async fn heal(&self, station_id: &str) -> anyhow::Result<()>;

    async fn simulate_stress(&self, station_id: &str) -> anyhow::Result<()>;

    /// Retrain the risk model; returns the service's status message
    async fn retrain_model(&self) -> anyhow::Result<String>;
}

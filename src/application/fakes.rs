// In-memory collaborators for tests
use crate::application::fleet_repository::{FleetRepository, StationQuery, StationsPage};
use crate::application::route_provider::{RoutePath, RouteProvider};
use crate::domain::event_log::EventLogEntry;
use crate::domain::geo::Coordinate;
use crate::domain::station::{Station, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
pub struct FakeFleet {
    pub stations: Mutex<Vec<Station>>,
    pub timeframes: Mutex<Vec<Timeframe>>,
    pub logs: Mutex<Vec<EventLogEntry>>,
    pub fail: Mutex<bool>,
    /// Fails only `fetch_logs`.
    pub fail_logs: Mutex<bool>,
    /// When set, `simulation_tick` parks until notified.
    pub gate: Option<Arc<Notify>>,
    pub ticks: AtomicU64,
    pub queries: Mutex<Vec<StationQuery>>,
    pub commands: Mutex<Vec<String>>,
}

impl FakeFleet {
    pub fn with_stations(stations: Vec<Station>) -> Self {
        let fleet = Self::default();
        *fleet.stations.lock() = stations;
        fleet
    }

    pub fn log_entry(action: &str, details: serde_json::Value) -> EventLogEntry {
        serde_json::from_value(serde_json::json!({
            "timestamp": "2025-03-01T10:00:00",
            "action": action,
            "details": details,
        }))
        .unwrap()
    }

    fn check(&self) -> anyhow::Result<()> {
        if *self.fail.lock() {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl FleetRepository for FakeFleet {
    async fn fetch_stations(&self, query: &StationQuery) -> anyhow::Result<StationsPage> {
        self.check()?;
        self.queries.lock().push(query.clone());
        Ok(StationsPage {
            stations: self.stations.lock().clone(),
            timeframes: self.timeframes.lock().clone(),
        })
    }

    async fn simulation_tick(&self, _timestamp: DateTime<Utc>) -> anyhow::Result<Vec<Station>> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.check()?;
        Ok(self.stations.lock().clone())
    }

    async fn fetch_logs(&self) -> anyhow::Result<Vec<EventLogEntry>> {
        self.check()?;
        if *self.fail_logs.lock() {
            anyhow::bail!("logs unavailable");
        }
        Ok(self.logs.lock().clone())
    }

    async fn heal(&self, station_id: &str) -> anyhow::Result<()> {
        self.check()?;
        self.commands.lock().push(format!("heal:{}", station_id));
        Ok(())
    }

    async fn simulate_stress(&self, station_id: &str) -> anyhow::Result<()> {
        self.check()?;
        self.commands.lock().push(format!("stress:{}", station_id));
        Ok(())
    }

    async fn retrain_model(&self) -> anyhow::Result<String> {
        self.check()?;
        self.commands.lock().push("train".to_string());
        Ok("Model retrained successfully".to_string())
    }
}

/// Straight-line router; records every request.
#[derive(Default)]
pub struct FakeRouter {
    pub fail: Mutex<bool>,
    pub requests: Mutex<Vec<(Coordinate, Coordinate)>>,
}

#[async_trait]
impl RouteProvider for FakeRouter {
    async fn route(&self, from: Coordinate, to: Coordinate) -> anyhow::Result<RoutePath> {
        if *self.fail.lock() {
            anyhow::bail!("router timed out");
        }
        self.requests.lock().push((from, to));
        Ok(RoutePath {
            coordinates: vec![from.lon_lat(), to.lon_lat()],
        })
    }
}

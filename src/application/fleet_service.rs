// Fleet service - the exposed surface of the live engine for the rendering layer
use crate::application::cluster_index::{fly_to_zoom, ClusterIndex, ClusterOptions};
use crate::application::fleet_repository::{FleetRepository, StationQuery};
use crate::application::fleet_state::{FleetSnapshot, FleetState};
use crate::application::live_merger::{LiveSnapshotMerger, MergerStatus, PollingSupervisor};
use crate::application::ranking::{self, Located};
use crate::application::route_provider::{RoutePath, RouteProvider};
use crate::application::service_centers::ServiceCenterRegistry;
use crate::domain::cluster::{ClusterId, ClusterNode, ClusterPoint};
use crate::domain::dashboard::FleetSummary;
use crate::domain::error::EngineError;
use crate::domain::event_log::EventLogEntry;
use crate::domain::geo::{BoundingBox, Coordinate};
use crate::domain::notification::Notification;
use crate::domain::service_center::ServiceCenter;
use crate::domain::station::Station;
use crate::domain::view_mode::ViewMode;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
pub struct StationDistance {
    #[serde(flatten)]
    pub station: Station,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedRoute {
    pub station_id: String,
    pub station_name: String,
    /// Depot the technician leaves from; `None` for a driver route.
    pub service_center_id: Option<String>,
    pub distance_km: f64,
    /// Best-value score of the destination; only set for driver routes.
    pub score: Option<f64>,
    pub path: RoutePath,
    pub planned_at: DateTime<Utc>,
}

/// Last known good routes. A failed request never clears an entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteBook {
    pub best: Option<PlannedRoute>,
    pub technician: Option<PlannedRoute>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenancePlan {
    pub stations: Vec<Station>,
    /// `(lon, lat)` path through the queue in priority order.
    pub polyline: Vec<[f64; 2]>,
}

/// Index built for one snapshot; reused until the generation moves on.
struct IndexedSnapshot {
    snapshot: Arc<FleetSnapshot>,
    index: Arc<ClusterIndex>,
}

pub struct FleetService {
    repository: Arc<dyn FleetRepository>,
    router: Arc<dyn RouteProvider>,
    state: Arc<FleetState>,
    service_centers: Arc<ServiceCenterRegistry>,
    polling: PollingSupervisor,
    cluster_options: ClusterOptions,
    indexed: RwLock<Option<Arc<IndexedSnapshot>>>,
    routes: RwLock<RouteBook>,
    last_query: RwLock<StationQuery>,
    mode: RwLock<ViewMode>,
    mode_switch: tokio::sync::Mutex<()>,
}

impl FleetService {
    pub fn new(
        repository: Arc<dyn FleetRepository>,
        router: Arc<dyn RouteProvider>,
        cluster_options: ClusterOptions,
        poll_interval: Duration,
    ) -> Self {
        let state = Arc::new(FleetState::new());
        let service_centers = Arc::new(ServiceCenterRegistry::new());
        let merger = Arc::new(LiveSnapshotMerger::new(
            repository.clone(),
            state.clone(),
            service_centers.clone(),
            poll_interval,
        ));

        Self {
            repository,
            router,
            state,
            service_centers,
            polling: PollingSupervisor::new(merger),
            cluster_options,
            indexed: RwLock::new(None),
            routes: RwLock::new(RouteBook::default()),
            last_query: RwLock::new(StationQuery::live()),
            mode: RwLock::new(ViewMode::default()),
            mode_switch: tokio::sync::Mutex::new(()),
        }
    }

    pub fn stations(&self) -> Arc<FleetSnapshot> {
        self.state.snapshot()
    }

    /// Fetches stations for `query`, installs them and remembers the query.
    pub async fn refresh_stations(&self, query: StationQuery) -> Result<Arc<FleetSnapshot>, EngineError> {
        let page = self.repository.fetch_stations(&query).await.map_err(|e| {
            tracing::warn!("station fetch failed, keeping previous snapshot: {:#}", e);
            EngineError::transient("fetch stations", &e)
        })?;

        self.service_centers.ensure_for(&page.stations);
        let snapshot = self
            .state
            .install_stations(page.stations, Some(page.timeframes));
        tracing::info!(
            generation = snapshot.generation,
            stations = snapshot.stations.len(),
            timeframe = %query.timeframe,
            "station snapshot refreshed"
        );
        *self.last_query.write() = query;
        Ok(snapshot)
    }

    /// Re-issues the last station query.
    pub async fn refresh(&self) -> Result<Arc<FleetSnapshot>, EngineError> {
        let query = self.last_query.read().clone();
        self.refresh_stations(query).await
    }

    fn indexed(&self) -> Arc<IndexedSnapshot> {
        let snapshot = self.state.snapshot();
        if let Some(current) = self.indexed.read().as_ref() {
            if current.index.generation() == snapshot.generation {
                return current.clone();
            }
        }

        let points: Vec<ClusterPoint> = snapshot
            .stations
            .iter()
            .filter_map(ClusterPoint::from_station)
            .collect();
        let index = ClusterIndex::build(points, self.cluster_options.clone(), snapshot.generation);
        let excluded = snapshot.stations.len() - index.point_count();
        if excluded > 0 {
            tracing::warn!(excluded, "stations with corrupt coordinates left out of clustering");
        }

        let built = Arc::new(IndexedSnapshot {
            snapshot,
            index: Arc::new(index),
        });

        let mut slot = self.indexed.write();
        // Another reader may have built a newer one meanwhile.
        if let Some(existing) = slot
            .as_ref()
            .filter(|e| e.index.generation() >= built.index.generation())
        {
            return existing.clone();
        }
        *slot = Some(built.clone());
        built
    }

    pub fn cluster_index(&self) -> Arc<ClusterIndex> {
        self.indexed().index.clone()
    }

    pub fn clusters(&self, bounds: BoundingBox, zoom: f64) -> Vec<ClusterNode> {
        self.indexed().index.clusters(bounds, zoom)
    }

    /// Zoom to fly to when `cluster_id` is clicked at `current_zoom`. Never fails.
    pub fn expansion_zoom(&self, cluster_id: ClusterId, current_zoom: f64) -> f64 {
        fly_to_zoom(self.indexed().index.expansion_zoom(cluster_id), current_zoom)
    }

    /// Nodes one zoom level finer than `cluster_id`.
    pub fn cluster_children(&self, cluster_id: ClusterId) -> Result<Vec<ClusterNode>, EngineError> {
        self.indexed().index.children(cluster_id)
    }

    /// Stations inside an aggregate, from the snapshot the index was built on.
    pub fn cluster_leaves(&self, cluster_id: ClusterId) -> Result<Vec<Station>, EngineError> {
        let indexed = self.indexed();
        let by_id: HashMap<&str, &Station> = indexed
            .snapshot
            .stations
            .iter()
            .map(|s| (s.station_id.as_str(), s))
            .collect();

        Ok(indexed
            .index
            .leaves(cluster_id)?
            .into_iter()
            .filter_map(|p| by_id.get(p.station_id.as_str()).map(|s| (*s).clone()))
            .collect())
    }

    pub fn nearest(&self, origin: Coordinate, n: usize) -> Vec<StationDistance> {
        let snapshot = self.state.snapshot();
        ranking::nearest(origin, &snapshot.stations, n)
            .into_iter()
            .map(|r| StationDistance {
                station: r.item.clone(),
                distance_km: r.distance_km,
            })
            .collect()
    }

    /// Picks the best-value station for `origin` and routes to it.
    pub async fn request_best_route(&self, origin: Coordinate) -> Result<PlannedRoute, EngineError> {
        let snapshot = self.state.snapshot();
        let candidate =
            ranking::best_route_candidate(origin, &snapshot.stations).ok_or(EngineError::NoEligibleCandidate)?;
        let destination = candidate
            .station
            .location()
            .ok_or_else(|| EngineError::UnknownStation(candidate.station.station_id.clone()))?;

        let path = self.route("best route", origin, destination).await?;
        let planned = PlannedRoute {
            station_id: candidate.station.station_id.clone(),
            station_name: candidate.station.station_name.clone(),
            service_center_id: None,
            distance_km: candidate.distance_km,
            score: Some(candidate.score),
            path,
            planned_at: Utc::now(),
        };
        self.routes.write().best = Some(planned.clone());
        Ok(planned)
    }

    /// Routes a technician from the closest service center to `station_id`.
    pub async fn request_dispatch(&self, station_id: &str) -> Result<PlannedRoute, EngineError> {
        let snapshot = self.state.snapshot();
        let unknown = || EngineError::UnknownStation(station_id.to_string());
        let station = snapshot.station(station_id).ok_or_else(unknown)?;
        let target = station.location().ok_or_else(unknown)?;

        let centers = self.service_centers.centers();
        let depot = ranking::nearest_facility(target, &centers).ok_or(EngineError::NoServiceCenter)?;
        let from = depot.item.location().ok_or(EngineError::NoServiceCenter)?;

        let path = self.route("technician route", from, target).await?;
        let planned = PlannedRoute {
            station_id: station.station_id.clone(),
            station_name: station.station_name.clone(),
            service_center_id: Some(depot.item.id.clone()),
            distance_km: depot.distance_km,
            score: None,
            path,
            planned_at: Utc::now(),
        };
        self.routes.write().technician = Some(planned.clone());
        Ok(planned)
    }

    async fn route(&self, operation: &'static str, from: Coordinate, to: Coordinate) -> Result<RoutePath, EngineError> {
        self.router.route(from, to).await.map_err(|e| {
            tracing::warn!("{} failed, keeping previous route: {:#}", operation, e);
            EngineError::transient(operation, &e)
        })
    }

    pub fn routes(&self) -> RouteBook {
        self.routes.read().clone()
    }

    pub async fn trigger_heal(&self, station_id: &str) -> Result<Arc<FleetSnapshot>, EngineError> {
        self.repository
            .heal(station_id)
            .await
            .map_err(|e| self.command_failed("heal", e))?;
        self.refresh().await
    }

    pub async fn trigger_stress(&self, station_id: &str) -> Result<Arc<FleetSnapshot>, EngineError> {
        self.repository
            .simulate_stress(station_id)
            .await
            .map_err(|e| self.command_failed("simulate stress", e))?;
        self.refresh().await
    }

    /// Retrains the risk model and returns the service's message.
    pub async fn retrain_model(&self) -> Result<String, EngineError> {
        let message = self
            .repository
            .retrain_model()
            .await
            .map_err(|e| self.command_failed("retrain model", e))?;
        tracing::info!("{}", message);
        self.refresh().await?;
        Ok(message)
    }

    fn command_failed(&self, operation: &'static str, err: anyhow::Error) -> EngineError {
        tracing::warn!("{} failed: {:#}", operation, err);
        EngineError::transient(operation, &err)
    }

    pub fn service_centers(&self) -> Vec<ServiceCenter> {
        self.service_centers.centers()
    }

    pub fn maintenance_queue(&self) -> MaintenancePlan {
        let snapshot = self.state.snapshot();
        let queue = ranking::maintenance_queue(&snapshot.stations);
        let polyline = queue
            .iter()
            .filter_map(|s| s.location())
            .map(|c| c.lon_lat())
            .collect();
        MaintenancePlan {
            stations: queue.into_iter().cloned().collect(),
            polyline,
        }
    }

    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_stations(&self.state.snapshot().stations)
    }

    pub fn events(&self) -> Arc<Vec<EventLogEntry>> {
        self.state.event_log()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.recent_notifications()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.state.subscribe()
    }

    pub fn mode(&self) -> ViewMode {
        *self.mode.read()
    }

    /// Switches role/view and starts or stops live polling to match.
    pub async fn set_mode(&self, mode: ViewMode) -> MergerStatus {
        let _switching = self.mode_switch.lock().await;
        *self.mode.write() = mode;
        self.polling.set_active(mode.polls_live()).await;
        tracing::info!(?mode, polling = mode.polls_live(), "view mode changed");
        self.polling.status()
    }

    pub fn status(&self) -> MergerStatus {
        self.polling.status()
    }

    /// Session teardown: stop polling, then drop alert state.
    pub async fn shutdown(&self) {
        let _switching = self.mode_switch.lock().await;
        self.polling.set_active(false).await;
        self.state.end_session();
        tracing::info!("fleet session closed");
    }
}

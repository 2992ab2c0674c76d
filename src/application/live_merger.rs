// Live snapshot merger - cancellable polling loop that swaps in fresh fleet state
use crate::application::fleet_repository::FleetRepository;
use crate::application::fleet_state::FleetState;
use crate::application::service_centers::ServiceCenterRegistry;
use crate::domain::event_log::{newly_appended, EventLogEntry, LogEvent};
use crate::domain::notification::Notification;
use crate::domain::station::Station;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Idle,
    Polling,
    Merging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Committed { generation: u64 },
    /// A collaborator call failed; nothing was touched.
    Failed,
    /// The loop was cancelled while the fetch was in flight.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergerStatus {
    pub active: bool,
    pub phase: PollPhase,
    pub interval_secs: u64,
    pub cycles_committed: u64,
    pub cycles_failed: u64,
    pub cycles_discarded: u64,
    pub open_alerts: usize,
}

pub struct LiveSnapshotMerger {
    repository: Arc<dyn FleetRepository>,
    state: Arc<FleetState>,
    service_centers: Arc<ServiceCenterRegistry>,
    period: Duration,
    phase: Mutex<PollPhase>,
    committed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl LiveSnapshotMerger {
    pub fn new(
        repository: Arc<dyn FleetRepository>,
        state: Arc<FleetState>,
        service_centers: Arc<ServiceCenterRegistry>,
        period: Duration,
    ) -> Self {
        Self {
            repository,
            state,
            service_centers,
            period,
            phase: Mutex::new(PollPhase::Idle),
            committed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> PollPhase {
        *self.phase.lock()
    }

    pub fn status(&self, active: bool) -> MergerStatus {
        MergerStatus {
            active,
            phase: self.phase(),
            interval_secs: self.period.as_secs(),
            cycles_committed: self.committed.load(Ordering::Relaxed),
            cycles_failed: self.failed.load(Ordering::Relaxed),
            cycles_discarded: self.discarded.load(Ordering::Relaxed),
            open_alerts: self.state.alerts().open_alerts(),
        }
    }

    fn set_phase(&self, phase: PollPhase) {
        *self.phase.lock() = phase;
    }

    /// Advances the simulation and reads the event log. No state is touched.
    // Both reads must succeed: a tick without its log is dropped, not half-installed.
    async fn fetch(&self) -> anyhow::Result<(Vec<Station>, Vec<EventLogEntry>)> {
        let stations = self.repository.simulation_tick(Utc::now()).await?;
        let log = self.repository.fetch_logs().await?;
        Ok((stations, log))
    }

    /// Installs one cycle's results.
    ///
    /// Station replacement, then event-log comparison, then alert evaluation, so
    /// alerts always see the snapshot they arrived with.
    fn commit(&self, stations: Vec<Station>, log: Vec<EventLogEntry>) -> u64 {
        let _writer = self.state.writer();
        self.service_centers.ensure_for(&stations);
        let snapshot = self.state.replace_stations(stations, None);

        let previous_len = self.state.replace_event_log(log);
        let log = self.state.event_log();
        if let Some(entry) = newly_appended(previous_len, &log) {
            if let LogEvent::TrafficSurgeDetected { station, warning } = &entry.event {
                let station = station.as_deref().unwrap_or("unknown station");
                self.state
                    .publish(Notification::traffic_surge(station, warning.clone()));
            }
        }

        self.state.evaluate_alerts(&snapshot);
        snapshot.generation
    }

    /// One Idle -> Polling -> Merging -> Idle pass.
    ///
    /// A fetch already in flight when `stop` flips is allowed to finish, but its
    /// result is dropped.
    pub async fn run_cycle(&self, stop: &watch::Receiver<bool>) -> CycleOutcome {
        self.set_phase(PollPhase::Polling);
        let fetched = self.fetch().await;

        let outcome = if *stop.borrow() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("polling cancelled mid-cycle, discarding result");
            CycleOutcome::Discarded
        } else {
            match fetched {
                Ok((stations, log)) => {
                    self.set_phase(PollPhase::Merging);
                    let generation = self.commit(stations, log);
                    self.committed.fetch_add(1, Ordering::Relaxed);
                    CycleOutcome::Committed { generation }
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("live poll failed, keeping previous state: {:#}", e);
                    CycleOutcome::Failed
                }
            }
        };

        self.set_phase(PollPhase::Idle);
        outcome
    }

    /// Spawns the polling loop. The first cycle runs one period after start.
    pub fn start(self: &Arc<Self>) -> PollingHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let merger = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + merger.period, merger.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("live polling started (every {:?})", merger.period);

            loop {
                let ticked = tokio::select! {
                    _ = ticker.tick() => true,
                    changed = stop_rx.changed() => {
                        // Handle dropped without an explicit stop.
                        if changed.is_err() {
                            break;
                        }
                        false
                    }
                };
                if *stop_rx.borrow() {
                    break;
                }
                if !ticked {
                    continue;
                }
                if let CycleOutcome::Committed { generation } = merger.run_cycle(&stop_rx).await {
                    tracing::debug!(generation, "merged live snapshot");
                }
            }

            tracing::info!("live polling stopped");
        });

        PollingHandle { stop_tx, task }
    }
}

/// Owner's handle on a running polling loop.
pub struct PollingHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollingHandle {
    /// Signals the loop and waits for it to exit. After this returns no cycle
    /// from this loop can commit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("polling task ended abnormally: {}", e);
        }
    }
}

/// Starts and stops the merger as the live mode is entered and left.
pub struct PollingSupervisor {
    merger: Arc<LiveSnapshotMerger>,
    running: Mutex<Option<PollingHandle>>,
}

impl PollingSupervisor {
    pub fn new(merger: Arc<LiveSnapshotMerger>) -> Self {
        Self {
            merger,
            running: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn status(&self) -> MergerStatus {
        self.merger.status(self.is_active())
    }

    pub async fn set_active(&self, active: bool) {
        if active {
            let mut running = self.running.lock();
            if running.is_none() {
                *running = Some(self.merger.start());
            }
            return;
        }

        // Taken out first so the lock is not held across the await.
        let handle = self.running.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::FakeFleet;
    use crate::domain::station::station_at;
    use tokio::sync::Notify;

    fn merger_for(fleet: Arc<FakeFleet>, period: Duration) -> (Arc<LiveSnapshotMerger>, Arc<FleetState>) {
        let state = Arc::new(FleetState::new());
        let merger = Arc::new(LiveSnapshotMerger::new(
            fleet,
            state.clone(),
            Arc::new(ServiceCenterRegistry::new()),
            period,
        ));
        (merger, state)
    }

    #[tokio::test]
    async fn test_successful_cycle_commits_and_alerts() {
        let fleet = Arc::new(FakeFleet::default());
        let mut hot = station_at("hot", "Austin", -97.7, 30.3);
        hot.risk_score = 0.92;
        *fleet.stations.lock() = vec![hot, station_at("calm", "Austin", -97.6, 30.2)];
        let (merger, state) = merger_for(fleet, Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        let outcome = merger.run_cycle(&rx).await;
        assert!(matches!(outcome, CycleOutcome::Committed { .. }));
        assert_eq!(state.snapshot().stations.len(), 2);
        assert_eq!(state.alerts().open_alerts(), 1);
        assert_eq!(merger.phase(), PollPhase::Idle);
        assert_eq!(merger.status(false).cycles_committed, 1);
    }

    #[tokio::test]
    async fn test_one_corrupt_station_does_not_sink_the_cycle() {
        // Shaped like the feed: NaN cells arrive as null.
        let stations: Vec<Station> = serde_json::from_value(serde_json::json!([
            {"station_id": "bad", "station_name": "EV-Austin-01", "city": "Austin",
             "longitude": null, "latitude": null, "risk_score": 0.95,
             "historical_utilization_avg": null, "current_price": null},
            {"station_id": "hot", "station_name": "EV-Austin-02", "city": "Austin",
             "longitude": -97.7, "latitude": 30.3, "risk_score": 0.91,
             "historical_utilization_avg": null},
            {"station_id": "calm", "station_name": "EV-Denver-01", "city": "Denver",
             "longitude": -104.99, "latitude": 39.74, "risk_score": 0.2,
             "historical_utilization_avg": 0.4}
        ]))
        .unwrap();
        let fleet = Arc::new(FakeFleet::with_stations(stations));
        let state = Arc::new(FleetState::new());
        let registry = Arc::new(ServiceCenterRegistry::new());
        let merger = LiveSnapshotMerger::new(fleet, state.clone(), registry.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        assert!(matches!(merger.run_cycle(&rx).await, CycleOutcome::Committed { .. }));
        assert_eq!(state.snapshot().stations.len(), 3);
        // The corrupt record still carries its risk, so it is alerted on too.
        assert_eq!(state.alerts().open_alerts(), 2);
        let centers = registry.centers();
        assert_eq!(centers.len(), 4);
        assert!(centers.iter().all(|c| c.coordinate().is_some()));
    }

    #[tokio::test]
    async fn test_tick_without_log_is_not_installed() {
        let fleet = Arc::new(FakeFleet::with_stations(vec![station_at("a", "Austin", -97.7, 30.3)]));
        let (merger, state) = merger_for(fleet.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);
        merger.run_cycle(&rx).await;
        let before = state.snapshot();

        *fleet.fail_logs.lock() = true;
        fleet.stations.lock().push(station_at("b", "Austin", -97.6, 30.2));
        assert_eq!(merger.run_cycle(&rx).await, CycleOutcome::Failed);
        assert_eq!(fleet.ticks.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&before, &state.snapshot()));
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_state() {
        let fleet = Arc::new(FakeFleet::default());
        *fleet.stations.lock() = vec![station_at("a", "Austin", -97.7, 30.3)];
        let (merger, state) = merger_for(fleet.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        merger.run_cycle(&rx).await;
        let before = state.snapshot();

        *fleet.fail.lock() = true;
        *fleet.stations.lock() = Vec::new();
        assert_eq!(merger.run_cycle(&rx).await, CycleOutcome::Failed);
        assert!(Arc::ptr_eq(&before, &state.snapshot()));
        assert_eq!(merger.status(false).cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_is_discarded() {
        let gate = Arc::new(Notify::new());
        let fleet = Arc::new(FakeFleet {
            gate: Some(gate.clone()),
            ..FakeFleet::default()
        });
        *fleet.stations.lock() = vec![station_at("a", "Austin", -97.7, 30.3)];
        let (merger, state) = merger_for(fleet.clone(), Duration::from_secs(10));
        let (tx, rx) = watch::channel(false);

        let cycle = {
            let merger = merger.clone();
            tokio::spawn(async move { merger.run_cycle(&rx).await })
        };
        while fleet.ticks.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        gate.notify_one();

        assert_eq!(cycle.await.unwrap(), CycleOutcome::Discarded);
        assert!(state.snapshot().stations.is_empty());
        assert_eq!(state.snapshot().generation, 0);
    }

    #[tokio::test]
    async fn test_surge_entry_raises_notification_after_first_load() {
        let fleet = Arc::new(FakeFleet::default());
        *fleet.logs.lock() = vec![FakeFleet::log_entry("MODEL_RETRAINED", serde_json::json!({}))];
        let (merger, state) = merger_for(fleet.clone(), Duration::from_secs(10));
        let (_tx, rx) = watch::channel(false);

        merger.run_cycle(&rx).await;
        assert!(state.recent_notifications().is_empty());

        fleet.logs.lock().push(FakeFleet::log_entry(
            "TRAFFIC_SURGE_DETECTED",
            serde_json::json!({"station": "EV-Denver-04", "warning": "spike"}),
        ));
        merger.run_cycle(&rx).await;

        let recent = state.recent_notifications();
        assert_eq!(recent.len(), 1);
        assert_eq!(
            recent[0].message(),
            "Traffic Surge Detected: Denver! Auto-Heal engaging..."
        );

        // Same log again: nothing new.
        merger.run_cycle(&rx).await;
        assert_eq!(state.recent_notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_supervisor_starts_and_stops_loop() {
        let fleet = Arc::new(FakeFleet::default());
        *fleet.stations.lock() = vec![station_at("a", "Austin", -97.7, 30.3)];
        let (merger, state) = merger_for(fleet, Duration::from_millis(20));
        let supervisor = PollingSupervisor::new(merger);

        supervisor.set_active(true).await;
        supervisor.set_active(true).await;
        assert!(supervisor.is_active());
        tokio::time::sleep(Duration::from_millis(150)).await;

        supervisor.set_active(false).await;
        assert!(!supervisor.is_active());
        let generation = state.snapshot().generation;
        assert!(generation >= 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(state.snapshot().generation, generation);
        assert_eq!(supervisor.status().phase, PollPhase::Idle);
    }
}

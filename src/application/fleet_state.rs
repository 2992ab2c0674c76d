// Fleet state - copy-on-write station snapshot, event log and notification feed
use crate::application::alert_state::AlertState;
use crate::domain::event_log::EventLogEntry;
use crate::domain::notification::Notification;
use crate::domain::station::{Station, Timeframe};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

const RECENT_NOTIFICATIONS: usize = 50;
const FEED_CAPACITY: usize = 64;

/// One immutable station snapshot. Replaced wholesale, never edited.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub generation: u64,
    pub stations: Vec<Station>,
    pub timeframes: Vec<Timeframe>,
    pub installed_at: DateTime<Utc>,
}

impl FleetSnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            stations: Vec::new(),
            timeframes: Vec::new(),
            installed_at: Utc::now(),
        }
    }

    pub fn station(&self, station_id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.station_id == station_id)
    }
}

/// Single-writer, many-reader live state.
///
/// Readers clone the current `Arc` and keep a consistent view even if a new
/// snapshot is swapped in meanwhile. Writers (the polling loop and explicit
/// refreshes) take [`FleetState::writer`] for a whole install sequence, so
/// generations only grow and alerts are evaluated in install order.
#[derive(Debug)]
pub struct FleetState {
    snapshot: RwLock<Arc<FleetSnapshot>>,
    event_log: RwLock<Arc<Vec<EventLogEntry>>>,
    alerts: AlertState,
    feed: broadcast::Sender<Notification>,
    recent: Mutex<VecDeque<Notification>>,
    writer: Mutex<()>,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetState {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            snapshot: RwLock::new(Arc::new(FleetSnapshot::empty())),
            event_log: RwLock::new(Arc::new(Vec::new())),
            alerts: AlertState::new(),
            feed,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_NOTIFICATIONS)),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn event_log(&self) -> Arc<Vec<EventLogEntry>> {
        self.event_log.read().clone()
    }

    pub fn alerts(&self) -> &AlertState {
        &self.alerts
    }

    /// Exclusive right to install. Held across replace, log compare and alert
    /// evaluation, never across a network call.
    pub fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Swaps in a new station snapshot. `None` keeps the previous timeframes.
    pub fn replace_stations(
        &self,
        stations: Vec<Station>,
        timeframes: Option<Vec<Timeframe>>,
    ) -> Arc<FleetSnapshot> {
        let mut slot = self.snapshot.write();
        let generation = slot.generation + 1;
        let timeframes = timeframes.unwrap_or_else(|| slot.timeframes.clone());
        let next = Arc::new(FleetSnapshot {
            generation,
            stations,
            timeframes,
            installed_at: Utc::now(),
        });
        *slot = next.clone();
        drop(slot);
        tracing::debug!(generation, stations = next.stations.len(), "installed station snapshot");
        next
    }

    /// Swaps in a new event log and returns the length of the one it replaced.
    pub fn replace_event_log(&self, entries: Vec<EventLogEntry>) -> usize {
        let mut log = self.event_log.write();
        let previous_len = log.len();
        *log = Arc::new(entries);
        previous_len
    }

    /// Runs alert deduplication against `snapshot` and publishes what it opens.
    pub fn evaluate_alerts(&self, snapshot: &FleetSnapshot) -> Vec<Notification> {
        let raised = self.alerts.evaluate(&snapshot.stations);
        for notification in &raised {
            self.publish(notification.clone());
        }
        raised
    }

    /// Replace-then-evaluate, for snapshots installed outside the polling loop.
    pub fn install_stations(
        &self,
        stations: Vec<Station>,
        timeframes: Option<Vec<Timeframe>>,
    ) -> Arc<FleetSnapshot> {
        let _writer = self.writer();
        let snapshot = self.replace_stations(stations, timeframes);
        self.evaluate_alerts(&snapshot);
        snapshot
    }

    pub fn publish(&self, notification: Notification) {
        tracing::info!("{}", notification.message());
        {
            let mut recent = self.recent.lock();
            if recent.len() == RECENT_NOTIFICATIONS {
                recent.pop_front();
            }
            recent.push_back(notification.clone());
        }
        // No subscribers is fine; the recent list still has it.
        let _ = self.feed.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.feed.subscribe()
    }

    pub fn recent_notifications(&self) -> Vec<Notification> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Session teardown: forget open alerts and the notification history.
    pub fn end_session(&self) {
        self.alerts.clear();
        self.recent.lock().clear();
    }
}

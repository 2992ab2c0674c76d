// Alert deduplication state - which stations currently have an open high-risk alert
use crate::domain::notification::{Notification, HIGH_RISK_THRESHOLD};
use crate::domain::station::Station;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Session-scoped notified set.
///
/// A station is alerted once when its risk rises above the threshold and re-armed
/// only after a snapshot shows it back at or below the threshold.
#[derive(Debug, Default)]
pub struct AlertState {
    notified: Mutex<HashSet<String>>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one snapshot and returns the alerts it opens, in station order.
    pub fn evaluate(&self, stations: &[Station]) -> Vec<Notification> {
        let mut notified = self.notified.lock();
        let mut raised = Vec::new();

        for station in stations {
            if station.risk_score > HIGH_RISK_THRESHOLD {
                if notified.insert(station.station_id.clone()) {
                    raised.push(Notification::high_risk(station));
                }
            } else {
                notified.remove(&station.station_id);
            }
        }

        raised
    }

    pub fn open_alerts(&self) -> usize {
        self.notified.lock().len()
    }

    /// Session teardown.
    pub fn clear(&self) {
        self.notified.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::station::station_at;

    #[test]
    fn test_one_alert_per_excursion() {
        let state = AlertState::new();
        let mut station = station_at("ST-7", "Tucson", -110.9, 32.2);

        let raised: Vec<usize> = [0.9, 0.9, 0.9, 0.5, 0.9]
            .iter()
            .enumerate()
            .filter_map(|(i, &risk)| {
                station.risk_score = risk;
                let alerts = state.evaluate(std::slice::from_ref(&station));
                (!alerts.is_empty()).then_some(i)
            })
            .collect();

        assert_eq!(raised, vec![0, 4]);
        assert!(state.notified.lock().contains("ST-7"));
    }

    #[test]
    fn test_threshold_is_exclusive_and_clear_rearms() {
        let state = AlertState::new();
        let mut station = station_at("ST-8", "Tucson", -110.9, 32.2);

        station.risk_score = 0.80;
        assert!(state.evaluate(std::slice::from_ref(&station)).is_empty());

        station.risk_score = 0.81;
        assert_eq!(state.evaluate(std::slice::from_ref(&station)).len(), 1);
        assert_eq!(state.open_alerts(), 1);

        state.clear();
        assert_eq!(state.evaluate(std::slice::from_ref(&station)).len(), 1);
    }

    #[test]
    fn test_stations_missing_from_snapshot_stay_notified() {
        let state = AlertState::new();
        let mut hot = station_at("hot", "Tucson", -110.9, 32.2);
        hot.risk_score = 0.95;
        state.evaluate(std::slice::from_ref(&hot));

        let other = station_at("other", "Tucson", -110.8, 32.3);
        state.evaluate(std::slice::from_ref(&other));
        assert!(state.notified.lock().contains("hot"));
    }
}

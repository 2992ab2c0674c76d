// Notification domain model - user-facing alerts raised by the live engine
use crate::domain::station::{short_display_name, Station};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stations above this risk raise a high-risk alert.
pub const HIGH_RISK_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    HighRisk {
        station_id: String,
        station_name: String,
        risk_score: f64,
        raised_at: DateTime<Utc>,
    },
    TrafficSurge {
        station: String,
        warning: Option<String>,
        raised_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn high_risk(station: &Station) -> Self {
        Notification::HighRisk {
            station_id: station.station_id.clone(),
            station_name: station.short_name().to_string(),
            risk_score: station.risk_score,
            raised_at: Utc::now(),
        }
    }

    pub fn traffic_surge(station: &str, warning: Option<String>) -> Self {
        Notification::TrafficSurge {
            station: short_display_name(station).to_string(),
            warning,
            raised_at: Utc::now(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::HighRisk {
                station_name,
                risk_score,
                ..
            } => format!(
                "High Risk Alert: {} hit {:.0}% risk!",
                station_name,
                risk_score * 100.0
            ),
            Notification::TrafficSurge { station, .. } => {
                format!("Traffic Surge Detected: {}! Auto-Heal engaging...", station)
            }
        }
    }
}

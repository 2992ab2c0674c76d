// Station domain model - one charging/service station as reported by the fleet feed
use crate::domain::geo::Coordinate;
use serde::{Deserialize, Deserializer, Serialize};

/// Risk above this is rendered critical.
pub const CRITICAL_RISK: f64 = 0.6;
/// Risk above this (and not critical) is rendered as a warning.
pub const WARNING_RISK: f64 = 0.4;

fn missing_coordinate() -> f64 {
    f64::NAN
}

// The feed sends `null` for NaN cells, which `#[serde(default)]` alone rejects.
fn null_coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_else(missing_coordinate))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String,
    pub station_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub network: String,
    #[serde(default = "missing_coordinate", deserialize_with = "null_coordinate")]
    pub longitude: f64,
    #[serde(default = "missing_coordinate", deserialize_with = "null_coordinate")]
    pub latitude: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risk_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub utilization_rate: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub historical_utilization_avg: f64,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub temperature_f: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub needs_maintenance: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub revenue_at_risk_daily: f64,
    #[serde(default)]
    pub root_cause_diagnosis: Option<String>,
}

impl Station {
    /// The station position, or `None` for a corrupt record.
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::checked(self.longitude, self.latitude)
    }

    pub fn category(&self) -> HealthCategory {
        HealthCategory::from_risk(self.risk_score)
    }

    /// Display name used in alerts: "EV-Downtown-04" becomes "Downtown".
    pub fn short_name(&self) -> &str {
        short_display_name(&self.station_name)
    }
}

/// Second `-`-separated segment of a station name, or the whole name.
pub fn short_display_name(name: &str) -> &str {
    name.split('-')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCategory {
    Healthy,
    Warning,
    Critical,
}

impl HealthCategory {
    pub fn from_risk(risk_score: f64) -> Self {
        if risk_score > CRITICAL_RISK {
            HealthCategory::Critical
        } else if risk_score > WARNING_RISK {
            HealthCategory::Warning
        } else {
            HealthCategory::Healthy
        }
    }
}

/// A selectable historical window offered by the fleet service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub id: String,
    pub label: String,
}

#[cfg(test)]
pub(crate) fn station_at(id: &str, city: &str, longitude: f64, latitude: f64) -> Station {
    Station {
        station_id: id.to_string(),
        station_name: format!("EV-{}-{}", city, id),
        city: city.to_string(),
        network: "ChargePoint".to_string(),
        longitude,
        latitude,
        risk_score: 0.1,
        utilization_rate: 0.5,
        historical_utilization_avg: 0.5,
        current_price: Some(0.40),
        temperature_f: 70.0,
        needs_maintenance: false,
        revenue_at_risk_daily: 0.0,
        root_cause_diagnosis: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        let station = station_at("ST-1", "Austin", -97.7, 30.2);
        assert_eq!(station.short_name(), "Austin");

        let mut plain = station.clone();
        plain.station_name = "Riverside".to_string();
        assert_eq!(plain.short_name(), "Riverside");
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(HealthCategory::from_risk(0.61), HealthCategory::Critical);
        assert_eq!(HealthCategory::from_risk(0.6), HealthCategory::Warning);
        assert_eq!(HealthCategory::from_risk(0.41), HealthCategory::Warning);
        assert_eq!(HealthCategory::from_risk(0.4), HealthCategory::Healthy);
    }

    #[test]
    fn test_deserialize_tolerates_missing_fields() {
        let json = r#"{
            "station_id": "ST-9",
            "station_name": "EV-Denver-09",
            "city": "Denver",
            "latitude": 39.7,
            "risk_score": 0.72,
            "utilization_rate": 0.4,
            "avg_session_duration_mins": 35
        }"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.category(), HealthCategory::Critical);
        assert!(station.current_price.is_none());
        assert!(station.coordinate().is_none());
    }

    #[test]
    fn test_null_fields_keep_the_rest_of_the_page() {
        let json = r#"[{
            "station_id": "ST-1", "station_name": "EV-Austin-01", "city": "Austin",
            "longitude": null, "latitude": 30.27, "risk_score": 0.3,
            "historical_utilization_avg": null, "current_price": null,
            "needs_maintenance": null, "root_cause_diagnosis": null
        }, {
            "station_id": "ST-2", "station_name": "EV-Austin-02", "city": "Austin",
            "longitude": -97.70, "latitude": 30.30, "historical_utilization_avg": 0.55
        }]"#;
        let stations: Vec<Station> = serde_json::from_str(json).unwrap();
        assert_eq!(stations.len(), 2);
        assert!(stations[0].longitude.is_nan());
        assert!(stations[0].coordinate().is_none());
        assert_eq!(stations[0].historical_utilization_avg, 0.0);
        assert!(!stations[0].needs_maintenance);
        assert!(stations[1].coordinate().is_some());
        assert_eq!(stations[1].historical_utilization_avg, 0.55);
    }
}

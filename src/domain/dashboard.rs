// Dashboard domain model - fleet-wide KPIs shown next to the map
use super::station::{Station, CRITICAL_RISK};
use serde::Serialize;

const TOP_RISK_BARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub station_count: usize,
    pub high_risk_count: usize,
    pub revenue_at_risk_daily: f64,
    pub average_utilization: f64,
    pub top_risk: Vec<RiskBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBar {
    pub station_id: String,
    pub name: String,
    pub risk_percent: u32,
}

impl FleetSummary {
    pub fn from_stations(stations: &[Station]) -> Self {
        let high_risk_count = stations
            .iter()
            .filter(|s| s.risk_score > CRITICAL_RISK)
            .count();

        let revenue_at_risk_daily = stations
            .iter()
            .filter(|s| s.needs_maintenance)
            .map(|s| s.revenue_at_risk_daily)
            .sum();

        let average_utilization = if stations.is_empty() {
            0.0
        } else {
            stations.iter().map(|s| s.utilization_rate).sum::<f64>() / stations.len() as f64
        };

        let mut by_risk: Vec<&Station> = stations.iter().collect();
        by_risk.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        let top_risk = by_risk
            .into_iter()
            .take(TOP_RISK_BARS)
            .map(|s| RiskBar {
                station_id: s.station_id.clone(),
                name: s.short_name().to_string(),
                risk_percent: (s.risk_score * 100.0).round().clamp(0.0, 100.0) as u32,
            })
            .collect();

        Self {
            station_count: stations.len(),
            high_risk_count,
            revenue_at_risk_daily,
            average_utilization,
            top_risk,
        }
    }
}

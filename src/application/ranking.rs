// Ranking engine - nearest-N, best-value routing and nearest-facility selection
use crate::domain::geo::{checked_distance_km, Coordinate};
use crate::domain::service_center::ServiceCenter;
use crate::domain::station::Station;

/// Stations at or above this utilization are not routed to.
pub const UTILIZATION_CUTOFF: f64 = 0.90;
/// Price assumed when a station does not report one (currency/kWh).
pub const DEFAULT_PRICE_PER_KWH: f64 = 0.45;
/// Driving distance worth one currency unit in the route score.
pub const KM_PER_PRICE_UNIT: f64 = 10.0;
/// Risk above which a station joins the maintenance queue even when not flagged.
pub const MAINTENANCE_RISK: f64 = 0.45;

/// Anything the engine can measure distances to.
pub trait Located {
    fn location(&self) -> Option<Coordinate>;
}

impl Located for Station {
    fn location(&self) -> Option<Coordinate> {
        self.coordinate()
    }
}

impl Located for ServiceCenter {
    fn location(&self) -> Option<Coordinate> {
        self.coordinate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked<'a, T> {
    pub item: &'a T,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteCandidate<'a> {
    pub station: &'a Station,
    pub distance_km: f64,
    pub score: f64,
}

/// The `n` items closest to `origin`, nearest first.
///
/// Ties keep input order. Items with corrupt coordinates are left out, so the
/// result has `min(n, valid items)` entries.
pub fn nearest<T: Located>(origin: Coordinate, items: &[T], n: usize) -> Vec<Ranked<'_, T>> {
    let mut ranked: Vec<Ranked<'_, T>> = items
        .iter()
        .filter_map(|item| {
            let distance_km = checked_distance_km(&origin, &item.location()?)?;
            Some(Ranked { item, distance_km })
        })
        .collect();
    // `sort_by` is stable.
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(n);
    ranked
}

pub fn is_route_eligible(station: &Station) -> bool {
    !station.needs_maintenance && station.utilization_rate < UTILIZATION_CUTOFF
}

/// Lower is better: ten kilometres of driving weigh as much as one unit of price.
///
/// A zero or negative price is treated as unknown, like a missing one.
pub fn route_score(distance_km: f64, price: Option<f64>) -> f64 {
    let price = price
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(DEFAULT_PRICE_PER_KWH);
    distance_km / KM_PER_PRICE_UNIT + price
}

/// Best-value station for a driver at `origin`, or `None` when nothing is eligible.
///
/// Ineligible stations are skipped outright. The first station seen with the
/// strictly lowest score wins.
pub fn best_route_candidate(origin: Coordinate, stations: &[Station]) -> Option<RouteCandidate<'_>> {
    let mut best: Option<RouteCandidate<'_>> = None;
    for station in stations.iter().filter(|s| is_route_eligible(s)) {
        let Some(distance_km) = station
            .location()
            .and_then(|location| checked_distance_km(&origin, &location))
        else {
            continue;
        };
        let score = route_score(distance_km, station.current_price);
        if best.is_none_or(|b| score < b.score) {
            best = Some(RouteCandidate {
                station,
                distance_km,
                score,
            });
        }
    }
    best
}

/// Closest service center to `target`; every center is a candidate.
pub fn nearest_facility(target: Coordinate, centers: &[ServiceCenter]) -> Option<Ranked<'_, ServiceCenter>> {
    nearest(target, centers, 1).into_iter().next()
}

/// Stations needing attention, highest daily revenue at risk first (stable on ties).
pub fn maintenance_queue(stations: &[Station]) -> Vec<&Station> {
    let mut queue: Vec<&Station> = stations
        .iter()
        .filter(|s| s.needs_maintenance || s.risk_score > MAINTENANCE_RISK)
        .collect();
    queue.sort_by(|a, b| b.revenue_at_risk_daily.total_cmp(&a.revenue_at_risk_daily));
    queue
}

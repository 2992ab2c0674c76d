// Service center domain model - technician depots derived from the station feed
use crate::domain::geo::Coordinate;
use crate::domain::station::Station;
use serde::{Deserialize, Serialize};

/// Depot offset from its reference station, in degrees on both axes.
const DEPOT_OFFSET_DEG: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCenter {
    pub id: String,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl ServiceCenter {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::checked(self.longitude, self.latitude)
    }

    /// Two depots per city: "A" north-east of the first station seen in that city and
    /// "B" south-west of the last one (the same station when the city has only one).
    pub fn pair_for_city(city: &str, first: &Station, last: &Station) -> [ServiceCenter; 2] {
        [
            ServiceCenter {
                id: format!("sc-{}-1", city),
                name: format!("{} Service Center A", city),
                longitude: first.longitude + DEPOT_OFFSET_DEG,
                latitude: first.latitude + DEPOT_OFFSET_DEG,
            },
            ServiceCenter {
                id: format!("sc-{}-2", city),
                name: format!("{} Service Center B", city),
                longitude: last.longitude - DEPOT_OFFSET_DEG,
                latitude: last.latitude - DEPOT_OFFSET_DEG,
            },
        ]
    }
}

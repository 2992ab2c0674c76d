// Service center registry - depots derived once per city seen in the station feed
use crate::domain::service_center::ServiceCenter;
use crate::domain::station::Station;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ServiceCenterRegistry {
    inner: RwLock<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    seen_cities: HashSet<String>,
    centers: Vec<ServiceCenter>,
}

impl ServiceCenterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates depots for cities not seen before and returns how many were added.
    ///
    /// Cities that already have depots are never regenerated, even if their
    /// stations moved in a later snapshot. Stations with corrupt coordinates are
    /// ignored, so a city with none usable waits for a later snapshot.
    pub fn ensure_for(&self, stations: &[Station]) -> usize {
        // Cities in first-seen order with the first and last station of each.
        let mut groups: Vec<(&str, &Station, &Station)> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        let usable = stations
            .iter()
            .filter(|s| !s.city.is_empty() && s.coordinate().is_some());
        for station in usable {
            match slot.get(station.city.as_str()) {
                Some(&i) => groups[i].2 = station,
                None => {
                    slot.insert(station.city.as_str(), groups.len());
                    groups.push((station.city.as_str(), station, station));
                }
            }
        }

        {
            let inner = self.inner.read();
            if groups.iter().all(|(city, _, _)| inner.seen_cities.contains(*city)) {
                return 0;
            }
        }

        let mut inner = self.inner.write();
        let mut added = 0;
        for (city, first, last) in groups {
            if !inner.seen_cities.insert(city.to_string()) {
                continue;
            }
            inner
                .centers
                .extend(ServiceCenter::pair_for_city(city, first, last));
            added += 2;
        }

        if added > 0 {
            tracing::info!(added, total = inner.centers.len(), "generated service centers");
        }
        added
    }

    pub fn centers(&self) -> Vec<ServiceCenter> {
        self.inner.read().centers.clone()
    }
}

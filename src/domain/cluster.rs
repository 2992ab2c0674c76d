// Cluster domain model - points fed into the clustering index and the nodes it returns
use super::geo::Coordinate;
use super::station::{HealthCategory, Station};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an aggregate node.
///
/// Encodes the index of the seed node in the level it was built from and that
/// level's zoom (`seed << 5 | origin_zoom`), so a lookup never needs a side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl ClusterId {
    pub fn new(seed_index: usize, origin_zoom: u8) -> Self {
        ClusterId(((seed_index as u64) << 5) | u64::from(origin_zoom & 0x1f))
    }

    pub fn seed_index(self) -> usize {
        (self.0 >> 5) as usize
    }

    pub fn origin_zoom(self) -> u8 {
        (self.0 & 0x1f) as u8
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A station reduced to what the clustering index needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub coordinate: Coordinate,
    pub category: HealthCategory,
    /// Lookup key back into the snapshot the point was derived from.
    pub station_id: String,
}

impl ClusterPoint {
    /// `None` when the station carries corrupt coordinates.
    pub fn from_station(station: &Station) -> Option<Self> {
        Some(Self {
            coordinate: station.coordinate()?,
            category: station.category(),
            station_id: station.station_id.clone(),
        })
    }
}

/// Per-point partial aggregate and how two partials combine.
pub trait PointAggregate: Clone + fmt::Debug + Send + Sync {
    fn map(point: &ClusterPoint) -> Self;
    fn reduce(&mut self, other: &Self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

impl CategoryCounts {
    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical
    }
}

impl PointAggregate for CategoryCounts {
    fn map(point: &ClusterPoint) -> Self {
        let mut counts = CategoryCounts::default();
        match point.category {
            HealthCategory::Healthy => counts.healthy = 1,
            HealthCategory::Warning => counts.warning = 1,
            HealthCategory::Critical => counts.critical = 1,
        }
        counts
    }

    fn reduce(&mut self, other: &Self) {
        self.healthy += other.healthy;
        self.warning += other.warning;
        self.critical += other.critical;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Leaf { station_id: String },
    Aggregate { cluster_id: ClusterId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNode<A = CategoryCounts> {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub coordinate: Coordinate,
    pub member_count: usize,
    pub counts: A,
}

impl<A> ClusterNode<A> {
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self.kind {
            NodeKind::Aggregate { cluster_id } => Some(cluster_id),
            NodeKind::Leaf { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_id_encoding() {
        let id = ClusterId::new(1234, 7);
        assert_eq!(id.seed_index(), 1234);
        assert_eq!(id.origin_zoom(), 7);
    }

    #[test]
    fn test_counts_reduce() {
        let point = |category| ClusterPoint {
            coordinate: Coordinate::new(0.0, 0.0),
            category,
            station_id: "s".to_string(),
        };
        let mut acc = CategoryCounts::map(&point(HealthCategory::Healthy));
        acc.reduce(&CategoryCounts::map(&point(HealthCategory::Critical)));
        acc.reduce(&CategoryCounts::map(&point(HealthCategory::Critical)));
        assert_eq!(
            acc,
            CategoryCounts {
                healthy: 1,
                warning: 0,
                critical: 2
            }
        );
        assert_eq!(acc.total(), 3);
    }
}

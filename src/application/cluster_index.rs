// Clustering index - hierarchical greedy point clustering over web-mercator zoom levels
use crate::application::kdtree::KdTree;
use crate::domain::cluster::{
    CategoryCounts, ClusterId, ClusterNode, ClusterPoint, NodeKind, PointAggregate,
};
use crate::domain::error::EngineError;
use crate::domain::geo::{BoundingBox, Coordinate};
use serde::Deserialize;
use std::f64::consts::PI;

/// Highest zoom the map surface accepts; expansion targets are capped here.
pub const MAP_ZOOM_LIMIT: f64 = 50.0;
/// Added to the current zoom when the expansion zoom cannot be computed.
pub const STALE_EXPANSION_STEP: f64 = 3.0;
/// Added to the current zoom when the computed expansion would not zoom in.
pub const MIN_EXPANSION_STEP: f64 = 2.5;

/// Largest zoom that still fits the 5-bit zoom field of a `ClusterId`.
const MAX_SUPPORTED_ZOOM: u8 = 30;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Merge distance in screen pixels.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Tile extent the radius is measured against.
    #[serde(default = "default_extent")]
    pub extent: f64,
    #[serde(default)]
    pub min_zoom: u8,
    /// No merging happens above this zoom.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    #[serde(default = "default_node_size")]
    pub node_size: usize,
}

fn default_radius() -> f64 {
    50.0
}

fn default_extent() -> f64 {
    512.0
}

fn default_max_zoom() -> u8 {
    6
}

fn default_min_points() -> usize {
    2
}

fn default_node_size() -> usize {
    64
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            extent: default_extent(),
            min_zoom: 0,
            max_zoom: default_max_zoom(),
            min_points: default_min_points(),
            node_size: default_node_size(),
        }
    }
}

impl ClusterOptions {
    fn normalized(mut self) -> Self {
        self.max_zoom = self.max_zoom.min(MAX_SUPPORTED_ZOOM - 1);
        self.min_zoom = self.min_zoom.min(self.max_zoom);
        self.min_points = self.min_points.max(2);
        self
    }

    /// Merge radius in projected units at `zoom`.
    fn radius_at(&self, zoom: u8) -> f64 {
        self.radius / (self.extent * 2f64.powi(i32::from(zoom)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Point(usize),
    Cluster(ClusterId),
}

#[derive(Debug, Clone)]
struct LevelNode<A> {
    x: f64,
    y: f64,
    /// Lowest zoom this node has been considered at while building.
    visited_at: u8,
    parent: Option<ClusterId>,
    num_points: usize,
    aggregate: A,
    source: Source,
}

#[derive(Debug, Clone)]
struct Level<A> {
    nodes: Vec<LevelNode<A>>,
    tree: KdTree,
}

impl<A> Level<A> {
    fn new(nodes: Vec<LevelNode<A>>, node_size: usize) -> Self {
        let tree = KdTree::build(nodes.iter().map(|n| [n.x, n.y]), node_size);
        Self { nodes, tree }
    }
}

/// Persistent clustering index over one immutable set of points.
///
/// Built once per station snapshot (`generation`); viewport and zoom queries are
/// answered from the prebuilt levels without re-clustering.
#[derive(Debug, Clone)]
pub struct ClusterIndex<A = CategoryCounts> {
    options: ClusterOptions,
    points: Vec<ClusterPoint>,
    /// `levels[i]` holds zoom `options.min_zoom + i`, up to `max_zoom + 1` (the raw points).
    levels: Vec<Level<A>>,
    generation: u64,
}

impl<A: PointAggregate> ClusterIndex<A> {
    pub fn build(points: Vec<ClusterPoint>, options: ClusterOptions, generation: u64) -> Self {
        let options = options.normalized();
        let leaf_zoom = options.max_zoom + 1;

        let leaves: Vec<LevelNode<A>> = points
            .iter()
            .enumerate()
            .map(|(i, p)| LevelNode {
                x: lng_x(p.coordinate.longitude),
                y: lat_y(p.coordinate.latitude),
                visited_at: u8::MAX,
                parent: None,
                num_points: 1,
                aggregate: A::map(p),
                source: Source::Point(i),
            })
            .collect();

        let mut levels = Vec::with_capacity(usize::from(leaf_zoom - options.min_zoom) + 1);
        let mut finer = Level::new(leaves, options.node_size);

        // Built from the leaves down; reversed at the end so index == zoom - min_zoom.
        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let coarser = Level::new(cluster_level(&mut finer, zoom, &options), options.node_size);
            levels.push(std::mem::replace(&mut finer, coarser));
        }
        levels.push(finer);
        levels.reverse();

        tracing::debug!(
            points = points.len(),
            levels = levels.len(),
            generation,
            "built cluster index"
        );

        Self {
            options,
            points,
            levels,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn point_count(&self) -> usize {
        self.levels
            .last()
            .map(|leaf_level| leaf_level.tree.len())
            .unwrap_or(0)
    }

    /// Nodes visible in `bounds` at (fractional) `zoom`.
    pub fn clusters(&self, bounds: BoundingBox, zoom: f64) -> Vec<ClusterNode<A>> {
        let mut min_lng = wrap_longitude(bounds.west);
        let min_lat = bounds.south.clamp(-90.0, 90.0);
        let mut max_lng = if bounds.east == 180.0 {
            180.0
        } else {
            wrap_longitude(bounds.east)
        };
        let max_lat = bounds.north.clamp(-90.0, 90.0);

        if bounds.east - bounds.west >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut eastern =
                self.clusters(BoundingBox::new(min_lng, min_lat, 180.0, max_lat), zoom);
            let western =
                self.clusters(BoundingBox::new(-180.0, min_lat, max_lng, max_lat), zoom);
            eastern.extend(western);
            return eastern;
        }

        let Some(level) = self.level(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        let ids = level.tree.range(
            [lng_x(min_lng), lat_y(max_lat)],
            [lng_x(max_lng), lat_y(min_lat)],
        );
        ids.into_iter()
            .map(|i| self.to_node(&level.nodes[i]))
            .collect()
    }

    /// Direct children of an aggregate, one zoom level finer than where it appears.
    pub fn children(&self, cluster_id: ClusterId) -> Result<Vec<ClusterNode<A>>, EngineError> {
        Ok(self
            .child_nodes(cluster_id)?
            .into_iter()
            .map(|n| self.to_node(n))
            .collect())
    }

    /// Every point contained in an aggregate.
    pub fn leaves(&self, cluster_id: ClusterId) -> Result<Vec<&ClusterPoint>, EngineError> {
        let mut out = Vec::new();
        self.collect_leaves(cluster_id, &mut out)?;
        Ok(out)
    }

    fn collect_leaves<'a>(
        &'a self,
        cluster_id: ClusterId,
        out: &mut Vec<&'a ClusterPoint>,
    ) -> Result<(), EngineError> {
        for child in self.child_nodes(cluster_id)? {
            match child.source {
                Source::Cluster(inner) => self.collect_leaves(inner, out)?,
                Source::Point(i) => out.push(&self.points[i]),
            }
        }
        Ok(())
    }

    fn child_nodes(&self, cluster_id: ClusterId) -> Result<Vec<&LevelNode<A>>, EngineError> {
        let stale = EngineError::StaleClusterReference(cluster_id);
        let origin_zoom = cluster_id.origin_zoom();
        if origin_zoom <= self.options.min_zoom || origin_zoom > self.options.max_zoom + 1 {
            return Err(stale);
        }
        let Some(level) = self.level(origin_zoom) else {
            return Err(stale);
        };
        let Some(origin) = level.nodes.get(cluster_id.seed_index()) else {
            return Err(stale);
        };

        let radius = self.options.radius_at(origin_zoom - 1);
        let mut ids = level.tree.within([origin.x, origin.y], radius);
        ids.sort_unstable();

        let children: Vec<&LevelNode<A>> = ids
            .into_iter()
            .map(|i| &level.nodes[i])
            .filter(|n| n.parent == Some(cluster_id))
            .collect();

        if children.is_empty() {
            Err(stale)
        } else {
            Ok(children)
        }
    }

    /// Smallest zoom at which `cluster_id` splits into more than one node.
    pub fn expansion_zoom(&self, cluster_id: ClusterId) -> Result<u8, EngineError> {
        let mut current = cluster_id;
        let mut zoom = cluster_id.origin_zoom().saturating_sub(1);
        while zoom <= self.options.max_zoom {
            let children = self.child_nodes(current)?;
            zoom += 1;
            if children.len() != 1 {
                break;
            }
            match children[0].source {
                Source::Cluster(inner) => current = inner,
                Source::Point(_) => break,
            }
        }
        Ok(zoom)
    }

    fn limit_zoom(&self, zoom: f64) -> u8 {
        let zoom = if zoom.is_finite() { zoom.floor() } else { 0.0 };
        zoom.clamp(
            f64::from(self.options.min_zoom),
            f64::from(self.options.max_zoom + 1),
        ) as u8
    }

    fn level(&self, zoom: u8) -> Option<&Level<A>> {
        let offset = zoom.checked_sub(self.options.min_zoom)?;
        self.levels.get(usize::from(offset))
    }

    fn to_node(&self, node: &LevelNode<A>) -> ClusterNode<A> {
        let kind = match node.source {
            Source::Cluster(cluster_id) => NodeKind::Aggregate { cluster_id },
            Source::Point(i) => NodeKind::Leaf {
                station_id: self.points[i].station_id.clone(),
            },
        };
        let coordinate = match node.source {
            Source::Point(i) => self.points[i].coordinate,
            Source::Cluster(_) => Coordinate::new(x_lng(node.x), y_lat(node.y)),
        };
        ClusterNode {
            kind,
            coordinate,
            member_count: node.num_points,
            counts: node.aggregate.clone(),
        }
    }
}

/// Clusters the nodes of `finer` (zoom + 1) into the nodes of `zoom`.
///
/// Nodes are visited in index order; each unvisited node absorbs every unvisited
/// neighbour within the zoom's radius. Absorbed nodes record the new id as their
/// parent, which is what `children` later matches on.
fn cluster_level<A: PointAggregate>(
    finer: &mut Level<A>,
    zoom: u8,
    options: &ClusterOptions,
) -> Vec<LevelNode<A>> {
    let radius = options.radius_at(zoom);
    let Level { nodes, tree } = finer;
    let mut next = Vec::new();

    for i in 0..nodes.len() {
        if nodes[i].visited_at <= zoom {
            continue;
        }
        nodes[i].visited_at = zoom;

        let (x, y) = (nodes[i].x, nodes[i].y);
        let neighbors = tree.within([x, y], radius);

        let origin_points = nodes[i].num_points;
        let total_points = origin_points
            + neighbors
                .iter()
                .filter(|&&n| nodes[n].visited_at > zoom)
                .map(|&n| nodes[n].num_points)
                .sum::<usize>();

        if total_points > origin_points && total_points >= options.min_points {
            let id = ClusterId::new(i, zoom + 1);
            let mut wx = x * origin_points as f64;
            let mut wy = y * origin_points as f64;
            let mut aggregate = nodes[i].aggregate.clone();

            for &n in &neighbors {
                let neighbor = &mut nodes[n];
                if neighbor.visited_at <= zoom {
                    continue;
                }
                neighbor.visited_at = zoom;
                neighbor.parent = Some(id);
                wx += neighbor.x * neighbor.num_points as f64;
                wy += neighbor.y * neighbor.num_points as f64;
                aggregate.reduce(&neighbor.aggregate);
            }
            nodes[i].parent = Some(id);

            next.push(LevelNode {
                x: wx / total_points as f64,
                y: wy / total_points as f64,
                visited_at: u8::MAX,
                parent: None,
                num_points: total_points,
                aggregate,
                source: Source::Cluster(id),
            });
        } else {
            next.push(carry(&nodes[i]));
            if total_points > 1 {
                for &n in &neighbors {
                    if nodes[n].visited_at <= zoom {
                        continue;
                    }
                    nodes[n].visited_at = zoom;
                    next.push(carry(&nodes[n]));
                }
            }
        }
    }

    next
}

/// Copy of an unmerged node for the next coarser level.
fn carry<A: Clone>(node: &LevelNode<A>) -> LevelNode<A> {
    LevelNode {
        visited_at: u8::MAX,
        parent: None,
        ..node.clone()
    }
}

/// Guarded fly-to zoom for a cluster click.
///
/// An unknown or stale id falls back to `current_zoom + 3`; a computed value that
/// would not zoom in is replaced by `current_zoom + 2.5`, so a click always moves.
pub fn fly_to_zoom(computed: Result<u8, EngineError>, current_zoom: f64) -> f64 {
    let target = match computed {
        Ok(zoom) => f64::from(zoom).min(MAP_ZOOM_LIMIT),
        Err(err) => {
            tracing::debug!("expansion zoom unavailable: {}", err);
            current_zoom + STALE_EXPANSION_STEP
        }
    };
    if target <= current_zoom {
        current_zoom + MIN_EXPANSION_STEP
    } else {
        target
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
}

fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

fn lat_y(lat: f64) -> f64 {
    let sin = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

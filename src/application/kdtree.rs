// Static 2-D KD-tree over projected points - backs every zoom level of the clustering index

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: u32,
    xy: [f64; 2],
}

/// Immutable KD-tree built once per zoom level.
///
/// Leaves hold up to `node_size` points unsorted; above that the slice is split at
/// its median on alternating axes. Queries walk the same split points, so results
/// are deterministic for a given input order.
#[derive(Debug, Clone)]
pub struct KdTree {
    entries: Vec<Entry>,
    node_size: usize,
}

impl KdTree {
    pub fn build<I>(points: I, node_size: usize) -> Self
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut entries: Vec<Entry> = points
            .into_iter()
            .enumerate()
            .map(|(id, xy)| Entry { id: id as u32, xy })
            .collect();
        let node_size = node_size.max(1);
        split(&mut entries, node_size, 0);
        Self { entries, node_size }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Ids of points inside the axis-aligned box `[min, max]`.
    pub fn range(&self, min: [f64; 2], max: [f64; 2]) -> Vec<usize> {
        let mut out = Vec::new();
        range_in(&self.entries, self.node_size, 0, min, max, &mut out);
        out
    }

    /// Ids of points within euclidean distance `radius` of `center`.
    pub fn within(&self, center: [f64; 2], radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        within_in(
            &self.entries,
            self.node_size,
            0,
            center,
            radius,
            radius * radius,
            &mut out,
        );
        out
    }
}

fn split(entries: &mut [Entry], node_size: usize, axis: usize) {
    if entries.len() <= node_size {
        return;
    }
    let mid = entries.len() / 2;
    entries.select_nth_unstable_by(mid, |a, b| {
        a.xy[axis].total_cmp(&b.xy[axis]).then(a.id.cmp(&b.id))
    });
    let (left, right) = entries.split_at_mut(mid);
    split(left, node_size, 1 - axis);
    split(&mut right[1..], node_size, 1 - axis);
}

fn range_in(
    entries: &[Entry],
    node_size: usize,
    axis: usize,
    min: [f64; 2],
    max: [f64; 2],
    out: &mut Vec<usize>,
) {
    if entries.len() <= node_size {
        for e in entries {
            if inside(e.xy, min, max) {
                out.push(e.id as usize);
            }
        }
        return;
    }

    let mid = entries.len() / 2;
    let pivot = entries[mid];
    if inside(pivot.xy, min, max) {
        out.push(pivot.id as usize);
    }
    if min[axis] <= pivot.xy[axis] {
        range_in(&entries[..mid], node_size, 1 - axis, min, max, out);
    }
    if max[axis] >= pivot.xy[axis] {
        range_in(&entries[mid + 1..], node_size, 1 - axis, min, max, out);
    }
}

fn within_in(
    entries: &[Entry],
    node_size: usize,
    axis: usize,
    center: [f64; 2],
    radius: f64,
    radius_sq: f64,
    out: &mut Vec<usize>,
) {
    if entries.len() <= node_size {
        for e in entries {
            if dist_sq(e.xy, center) <= radius_sq {
                out.push(e.id as usize);
            }
        }
        return;
    }

    let mid = entries.len() / 2;
    let pivot = entries[mid];
    if dist_sq(pivot.xy, center) <= radius_sq {
        out.push(pivot.id as usize);
    }
    if center[axis] - radius <= pivot.xy[axis] {
        within_in(&entries[..mid], node_size, 1 - axis, center, radius, radius_sq, out);
    }
    if center[axis] + radius >= pivot.xy[axis] {
        within_in(&entries[mid + 1..], node_size, 1 - axis, center, radius, radius_sq, out);
    }
}

#[inline]
fn inside(xy: [f64; 2], min: [f64; 2], max: [f64; 2]) -> bool {
    xy[0] >= min[0] && xy[0] <= max[0] && xy[1] >= min[1] && xy[1] <= max[1]
}

#[inline]
fn dist_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<[f64; 2]> {
        let mut points = Vec::new();
        for i in 0..40 {
            for j in 0..25 {
                // Deterministic jitter so the median split sees ties and gaps.
                let jitter = ((i * 7 + j * 13) % 10) as f64 / 100.0;
                points.push([i as f64 + jitter, j as f64 - jitter]);
            }
        }
        points
    }

    #[test]
    fn test_range_matches_linear_scan() {
        let points = grid_points();
        let tree = KdTree::build(points.iter().copied(), 8);
        let (min, max) = ([3.5, 2.0], [17.2, 11.9]);

        let mut got = tree.range(min, max);
        got.sort_unstable();
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| inside(**p, min, max))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_within_matches_linear_scan() {
        let points = grid_points();
        let tree = KdTree::build(points.iter().copied(), 4);
        let center = [20.3, 12.1];

        let mut got = tree.within(center, 5.5);
        got.sort_unstable();
        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| dist_sq(**p, center) <= 5.5 * 5.5)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(got, expected);
        assert_eq!(tree.len(), 1000);
        assert_eq!(tree.range([-1.0, -1.0], [101.0, 101.0]).len(), tree.len());
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(Vec::new(), 16);
        assert_eq!(tree.len(), 0);
        assert!(tree.range([0.0, 0.0], [1.0, 1.0]).is_empty());
        assert!(tree.within([0.0, 0.0], 1.0).is_empty());
    }
}

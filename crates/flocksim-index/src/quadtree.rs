//! Point quadtree rebuilt from scratch every step.

use rand::RngCore;

use crate::{IndexError, IndexPoint, IndexStats, NeighborhoodIndex, Rect};

/// A stored point plus its opaque payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadEntry<T> {
    pub x: f32,
    pub y: f32,
    pub payload: T,
}

impl<T> QuadEntry<T> {
    #[must_use]
    pub const fn new(x: f32, y: f32, payload: T) -> Self {
        Self { x, y, payload }
    }
}

/// Quadtree node exclusively owning its four children.
///
/// Children are created on the first insert that overflows `capacity` and
/// dropped by [`Quadtree::clear`]. Nodes at `max_depth` stop subdividing and
/// keep accepting entries, which bounds recursion when many entries coincide.
#[derive(Debug, Clone)]
pub struct Quadtree<T> {
    bounds: Rect,
    capacity: usize,
    max_depth: usize,
    depth: usize,
    entries: Vec<QuadEntry<T>>,
    children: Option<Box<[Quadtree<T>; 4]>>,
}

impl<T: Copy> Quadtree<T> {
    /// Create an empty root covering `bounds`.
    pub fn new(bounds: Rect, capacity: usize, max_depth: usize) -> Result<Self, IndexError> {
        if !bounds.is_well_formed() {
            return Err(IndexError::InvalidConfig(
                "quadtree bounds must be finite with positive extent",
            ));
        }
        if capacity == 0 {
            return Err(IndexError::InvalidConfig("quadtree capacity must be positive"));
        }
        if max_depth == 0 {
            return Err(IndexError::InvalidConfig("quadtree max_depth must be positive"));
        }
        Ok(Self::node(bounds, capacity, max_depth, 1))
    }

    fn node(bounds: Rect, capacity: usize, max_depth: usize, depth: usize) -> Self {
        Self {
            bounds,
            capacity,
            max_depth,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether this node has been subdivided.
    #[must_use]
    pub fn is_divided(&self) -> bool {
        self.children.is_some()
    }

    /// Insert an entry, returning `false` when it lies outside this node.
    pub fn insert(&mut self, entry: QuadEntry<T>) -> bool {
        if !self.bounds.contains(entry.x, entry.y) {
            return false;
        }
        if self.entries.len() < self.capacity || self.depth >= self.max_depth {
            self.entries.push(entry);
            return true;
        }
        if self.children.is_none() {
            self.subdivide();
        }
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.insert(entry) {
                    return true;
                }
            }
        }
        // Rounding at quadrant seams can leave a point inside the parent but
        // outside every child.
        self.entries.push(entry);
        true
    }

    fn subdivide(&mut self) {
        let capacity = self.capacity;
        let max_depth = self.max_depth;
        let depth = self.depth + 1;
        let quadrants = self
            .bounds
            .quadrants()
            .map(|bounds| Self::node(bounds, capacity, max_depth, depth));
        self.children = Some(Box::new(quadrants));
    }

    /// Append payloads of entries inside `range` to `out`.
    pub fn query(&self, range: &Rect, out: &mut Vec<T>) {
        if !self.bounds.intersects(range) {
            return;
        }
        out.extend(
            self.entries
                .iter()
                .filter(|entry| range.contains(entry.x, entry.y))
                .map(|entry| entry.payload),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(range, out);
            }
        }
    }

    /// Collect payloads of entries inside `range`.
    #[must_use]
    pub fn query_range(&self, range: &Rect) -> Vec<T> {
        let mut found = Vec::new();
        self.query(range, &mut found);
        found
    }

    /// Drop every entry and child, leaving an empty leaf.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.children = None;
    }

    /// Total entries held by this node and its descendants.
    #[must_use]
    pub fn len(&self) -> usize {
        let nested: usize = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(Quadtree::len).sum());
        self.entries.len() + nested
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of allocated nodes, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }

    /// Number of levels below and including this node.
    #[must_use]
    pub fn height(&self) -> usize {
        1 + self.children.as_ref().map_or(0, |children| {
            children.iter().map(Quadtree::height).max().unwrap_or(0)
        })
    }

    /// Occupancy diagnostics over the whole subtree.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut counts = Vec::new();
        self.visit(&mut |node| counts.push(node.entries.len()));
        IndexStats::from_occupancy(counts.len(), self.height(), counts.into_iter())
    }

    fn visit(&self, f: &mut dyn FnMut(&Self)) {
        f(self);
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.visit(f);
            }
        }
    }
}

/// [`NeighborhoodIndex`] backed by a quadtree spanning the whole world.
#[derive(Debug, Clone)]
pub struct QuadtreeIndex {
    tree: Quadtree<usize>,
    points: Vec<IndexPoint>,
}

impl QuadtreeIndex {
    /// Build an empty index over `[0, world_width) x [0, world_height)`.
    pub fn new(
        world_width: f32,
        world_height: f32,
        capacity: usize,
        max_depth: usize,
    ) -> Result<Self, IndexError> {
        let bounds = Rect::new(0.0, 0.0, world_width, world_height);
        Ok(Self {
            tree: Quadtree::new(bounds, capacity, max_depth)?,
            points: Vec::new(),
        })
    }

    /// Read-only access to the underlying tree.
    #[must_use]
    pub fn tree(&self) -> &Quadtree<usize> {
        &self.tree
    }

    /// Agent indices whose positions fall inside `range`.
    #[must_use]
    pub fn query(&self, range: &Rect) -> Vec<usize> {
        self.tree.query_range(range)
    }
}

impl NeighborhoodIndex for QuadtreeIndex {
    fn name(&self) -> &'static str {
        "quadtree"
    }

    fn rebuild(&mut self, points: &[IndexPoint]) -> Result<(), IndexError> {
        self.tree.clear();
        self.points.clear();
        self.points.extend_from_slice(points);
        for (idx, point) in points.iter().enumerate() {
            self.tree.insert(QuadEntry::new(point.x, point.y, idx));
        }
        Ok(())
    }

    fn neighbors_of(&self, agent_idx: usize, _rng: &mut dyn RngCore, out: &mut Vec<usize>) {
        out.clear();
        let Some(point) = self.points.get(agent_idx) else {
            return;
        };
        let range = Rect::around(point.x, point.y, point.radius);
        self.tree.query(&range, out);
    }

    fn stats(&self) -> IndexStats {
        self.tree.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn world() -> Rect {
        Rect::new(0.0, 0.0, 400.0, 300.0)
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(Quadtree::<u32>::new(world(), 0, 8).is_err());
        assert!(Quadtree::<u32>::new(world(), 4, 0).is_err());
        assert!(Quadtree::<u32>::new(Rect::new(0.0, 0.0, 0.0, 10.0), 4, 8).is_err());
        assert!(Quadtree::<u32>::new(Rect::new(0.0, 0.0, -5.0, 10.0), 4, 8).is_err());
        assert!(Quadtree::<u32>::new(Rect::new(0.0, 0.0, f32::NAN, 10.0), 4, 8).is_err());
        assert_eq!(
            QuadtreeIndex::new(0.0, 10.0, 4, 8).unwrap_err(),
            IndexError::InvalidConfig("quadtree bounds must be finite with positive extent")
        );
    }

    #[test]
    fn insert_rejects_points_outside_half_open_bounds() {
        let mut tree = Quadtree::new(world(), 4, 8).expect("tree");
        assert!(tree.insert(QuadEntry::new(0.0, 0.0, 1)));
        assert!(!tree.insert(QuadEntry::new(400.0, 10.0, 2)));
        assert!(!tree.insert(QuadEntry::new(10.0, 300.0, 3)));
        assert!(!tree.insert(QuadEntry::new(-0.5, 10.0, 4)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn subdivides_once_capacity_is_exceeded() {
        let mut tree = Quadtree::new(world(), 2, 8).expect("tree");
        tree.insert(QuadEntry::new(10.0, 10.0, 0));
        tree.insert(QuadEntry::new(350.0, 10.0, 1));
        assert!(!tree.is_divided());
        tree.insert(QuadEntry::new(10.0, 250.0, 2));
        assert!(tree.is_divided());
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn full_range_query_returns_every_point_once() {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        let mut tree = Quadtree::new(world(), 4, 16).expect("tree");
        let count = 1_000;
        for idx in 0..count {
            let x = rng.random_range(0.0..400.0);
            let y = rng.random_range(0.0..300.0);
            assert!(tree.insert(QuadEntry::new(x, y, idx)));
        }
        let found = tree.query_range(&world());
        assert_eq!(found.len(), count);
        let unique: HashSet<usize> = found.iter().copied().collect();
        assert_eq!(unique.len(), count);
        assert!(tree.height() > 1);
    }

    #[test]
    fn disjoint_range_is_empty() {
        let mut tree = Quadtree::new(world(), 4, 8).expect("tree");
        for idx in 0..20 {
            tree.insert(QuadEntry::new(idx as f32 * 10.0, idx as f32 * 5.0, idx));
        }
        assert!(tree.query_range(&Rect::new(500.0, 500.0, 50.0, 50.0)).is_empty());
        assert!(tree.query_range(&Rect::new(-60.0, 0.0, 60.0, 300.0)).is_empty());
    }

    #[test]
    fn query_filters_entries_by_range() {
        let mut tree = Quadtree::new(world(), 8, 8).expect("tree");
        tree.insert(QuadEntry::new(10.0, 10.0, 'a'));
        tree.insert(QuadEntry::new(20.0, 20.0, 'b'));
        tree.insert(QuadEntry::new(200.0, 200.0, 'c'));
        let mut found = tree.query_range(&Rect::new(0.0, 0.0, 25.0, 25.0));
        found.sort_unstable();
        assert_eq!(found, vec!['a', 'b']);
    }

    #[test]
    fn coincident_points_stop_at_depth_cap() {
        let mut tree = Quadtree::new(world(), 1, 6).expect("tree");
        for idx in 0..50 {
            assert!(tree.insert(QuadEntry::new(123.0, 45.0, idx)));
        }
        assert_eq!(tree.len(), 50);
        assert!(tree.height() <= 6);
        let stats = tree.stats();
        assert_eq!(stats.max_occupancy, 45);
        assert_eq!(tree.query_range(&Rect::around(123.0, 45.0, 1.0)).len(), 50);
    }

    #[test]
    fn clear_returns_to_empty_leaf() {
        let mut tree = Quadtree::new(world(), 1, 8).expect("tree");
        for idx in 0..10 {
            tree.insert(QuadEntry::new(idx as f32 * 30.0, idx as f32 * 20.0, idx));
        }
        assert!(tree.is_divided());
        tree.clear();
        assert!(!tree.is_divided());
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn index_candidates_cover_agents_within_radius() {
        let mut rng = SmallRng::seed_from_u64(7);
        let points: Vec<IndexPoint> = (0..300)
            .map(|_| {
                IndexPoint::new(
                    rng.random_range(0.0..400.0),
                    rng.random_range(0.0..300.0),
                    rng.random_range(20.0..80.0),
                )
            })
            .collect();
        let mut index = QuadtreeIndex::new(400.0, 300.0, 4, 12).expect("index");
        index.rebuild(&points).expect("rebuild");

        let mut candidates = Vec::new();
        for (idx, point) in points.iter().enumerate() {
            index.neighbors_of(idx, &mut rng, &mut candidates);
            let candidate_set: HashSet<usize> = candidates.iter().copied().collect();
            assert!(candidate_set.contains(&idx));
            for (other, p) in points.iter().enumerate() {
                let dist = ((p.x - point.x).powi(2) + (p.y - point.y).powi(2)).sqrt();
                if dist <= point.radius {
                    assert!(candidate_set.contains(&other), "missing {other} near {idx}");
                }
            }
        }
        assert_eq!(index.stats().occupied, index.tree().stats().occupied);
    }

    #[test]
    fn unknown_agent_yields_no_candidates() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut index = QuadtreeIndex::new(100.0, 100.0, 4, 8).expect("index");
        index
            .rebuild(&[IndexPoint::new(5.0, 5.0, 10.0)])
            .expect("rebuild");
        let mut out = vec![99];
        index.neighbors_of(3, &mut rng, &mut out);
        assert!(out.is_empty());
    }
}

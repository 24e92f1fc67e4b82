//! Uniform bin grid with a per-step cell size.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{IndexError, IndexPoint, IndexStats, NeighborhoodIndex};

/// Upper bound on allocated bins; tiny cells over a large world fail fast instead.
const MAX_BINS: usize = 1 << 22;

/// Bin counts along each axis for `cell_size`, refusing grids above [`MAX_BINS`].
fn bin_dimensions(
    world_width: f32,
    world_height: f32,
    cell_size: f32,
) -> Result<(usize, usize), IndexError> {
    let width = (world_width / cell_size).ceil().max(1.0);
    let height = (world_height / cell_size).ceil().max(1.0);
    if width * height > MAX_BINS as f32 {
        return Err(IndexError::InvalidConfig(
            "cell size too small for world extent",
        ));
    }
    Ok((width as usize, height as usize))
}

/// How the grid derives its cell edge length on each rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSizePolicy {
    /// Largest perception radius in the population. Keeps the 3x3 block a
    /// superset of every agent's true neighbourhood.
    #[default]
    MaxPerception,
    /// Mean perception radius; smaller cells, but agents with above-average
    /// reach can miss neighbours two cells away.
    MeanPerception,
    /// Fixed edge length in world units.
    Fixed(f32),
}

impl CellSizePolicy {
    fn resolve(self, points: &[IndexPoint]) -> Result<f32, IndexError> {
        let size = match self {
            Self::Fixed(size) => size,
            Self::MaxPerception => points.iter().map(|p| p.radius).fold(0.0_f32, f32::max),
            Self::MeanPerception => {
                let sum: f32 = points.iter().map(|p| p.radius).sum();
                sum / points.len().max(1) as f32
            }
        };
        if !size.is_finite() || size <= 0.0 {
            return Err(IndexError::InvalidConfig("cell size must be positive"));
        }
        Ok(size)
    }
}

/// Fixed-extent grid of bins, rebuilt every step.
///
/// Neighbour lookups concatenate the 3x3 block of bins around an agent. When
/// that block holds more than `neighbor_cap` agents a uniform random subsample
/// of `neighbor_cap` is returned instead: an intentional approximation that
/// bounds per-agent cost in dense clusters.
#[derive(Debug, Clone)]
pub struct UniformGridIndex {
    world_width: f32,
    world_height: f32,
    cell_policy: CellSizePolicy,
    neighbor_cap: usize,
    cell_size: f32,
    width: usize,
    height: usize,
    bins: Vec<Vec<usize>>,
    agent_cells: Vec<(usize, usize)>,
}

impl UniformGridIndex {
    /// Create an empty grid over `[0, world_width) x [0, world_height)`.
    pub fn new(
        world_width: f32,
        world_height: f32,
        cell_policy: CellSizePolicy,
        neighbor_cap: usize,
    ) -> Result<Self, IndexError> {
        if !(world_width.is_finite() && world_height.is_finite())
            || world_width <= 0.0
            || world_height <= 0.0
        {
            return Err(IndexError::InvalidConfig(
                "world dimensions must be finite and positive",
            ));
        }
        if let CellSizePolicy::Fixed(size) = cell_policy {
            if !size.is_finite() || size <= 0.0 {
                return Err(IndexError::InvalidConfig("cell size must be positive"));
            }
            bin_dimensions(world_width, world_height, size)?;
        }
        if neighbor_cap == 0 {
            return Err(IndexError::InvalidConfig("neighbor_cap must be positive"));
        }
        Ok(Self {
            world_width,
            world_height,
            cell_policy,
            neighbor_cap,
            cell_size: 0.0,
            width: 0,
            height: 0,
            bins: Vec::new(),
            agent_cells: Vec::new(),
        })
    }

    /// Cell edge length chosen by the last rebuild (0 before the first).
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Grid dimensions `(width, height)` in bins.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[must_use]
    pub const fn neighbor_cap(&self) -> usize {
        self.neighbor_cap
    }

    /// Agents stored in bin `(cx, cy)`; empty when out of range.
    #[must_use]
    pub fn bin(&self, cx: usize, cy: usize) -> &[usize] {
        if cx >= self.width || cy >= self.height {
            return &[];
        }
        &self.bins[cy * self.width + cx]
    }

    /// Bin coordinates assigned to `agent_idx` by the last rebuild.
    #[must_use]
    pub fn cell_of_agent(&self, agent_idx: usize) -> Option<(usize, usize)> {
        self.agent_cells.get(agent_idx).copied()
    }

    /// Empty every bin while keeping the allocation.
    pub fn clear(&mut self) {
        for bin in &mut self.bins {
            bin.clear();
        }
        self.agent_cells.clear();
    }

    fn cell_coords(&self, x: f32, y: f32) -> (usize, usize) {
        let clamp_axis = |value: f32, dim: usize| -> usize {
            let cell = (value / self.cell_size).floor();
            if cell.is_nan() || cell < 0.0 {
                0
            } else {
                (cell as usize).min(dim - 1)
            }
        };
        (clamp_axis(x, self.width), clamp_axis(y, self.height))
    }

    fn resize(&mut self, cell_size: f32) -> Result<(), IndexError> {
        let (width, height) = bin_dimensions(self.world_width, self.world_height, cell_size)?;
        self.cell_size = cell_size;
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.bins = vec![Vec::new(); width * height];
        }
        Ok(())
    }

    /// Every agent in the 3x3 block around `agent_idx`, before any cap.
    #[must_use]
    pub fn block_candidates(&self, agent_idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_block(agent_idx, &mut out);
        out
    }

    fn collect_block(&self, agent_idx: usize, out: &mut Vec<usize>) {
        let Some((cx, cy)) = self.cell_of_agent(agent_idx) else {
            return;
        };
        for nx in cx.saturating_sub(1)..=(cx + 1).min(self.width - 1) {
            for ny in cy.saturating_sub(1)..=(cy + 1).min(self.height - 1) {
                out.extend_from_slice(&self.bins[ny * self.width + nx]);
            }
        }
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn name(&self) -> &'static str {
        "uniform_grid"
    }

    fn rebuild(&mut self, points: &[IndexPoint]) -> Result<(), IndexError> {
        self.clear();
        if points.is_empty() {
            return Ok(());
        }
        let cell_size = self.cell_policy.resolve(points)?;
        self.resize(cell_size)?;
        self.agent_cells.reserve(points.len());
        for (idx, point) in points.iter().enumerate() {
            let (cx, cy) = self.cell_coords(point.x, point.y);
            self.bins[cy * self.width + cx].push(idx);
            self.agent_cells.push((cx, cy));
        }
        Ok(())
    }

    fn neighbors_of(&self, agent_idx: usize, rng: &mut dyn RngCore, out: &mut Vec<usize>) {
        out.clear();
        self.collect_block(agent_idx, out);
        if out.len() > self.neighbor_cap {
            let picked = rand::seq::index::sample(rng, out.len(), self.neighbor_cap);
            let sampled: Vec<usize> = picked.iter().map(|slot| out[slot]).collect();
            *out = sampled;
        }
    }

    fn stats(&self) -> IndexStats {
        IndexStats::from_occupancy(self.bins.len(), 1, self.bins.iter().map(Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn random_points(rng: &mut SmallRng, count: usize, w: f32, h: f32) -> Vec<IndexPoint> {
        (0..count)
            .map(|_| {
                IndexPoint::new(
                    rng.random_range(0.0..w),
                    rng.random_range(0.0..h),
                    rng.random_range(20.0..150.0),
                )
            })
            .collect()
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(UniformGridIndex::new(0.0, 100.0, CellSizePolicy::MaxPerception, 200).is_err());
        assert!(UniformGridIndex::new(100.0, -1.0, CellSizePolicy::MaxPerception, 200).is_err());
        assert!(UniformGridIndex::new(100.0, 100.0, CellSizePolicy::Fixed(0.0), 200).is_err());
        assert!(UniformGridIndex::new(100.0, 100.0, CellSizePolicy::Fixed(-3.0), 200).is_err());
        assert!(UniformGridIndex::new(100.0, 100.0, CellSizePolicy::MaxPerception, 0).is_err());
    }

    #[test]
    fn tiny_fixed_cells_fail_at_construction() {
        let err = UniformGridIndex::new(800.0, 600.0, CellSizePolicy::Fixed(0.01), 200)
            .expect_err("48M bins");
        assert_eq!(
            err,
            IndexError::InvalidConfig("cell size too small for world extent")
        );
        assert!(UniformGridIndex::new(800.0, 600.0, CellSizePolicy::Fixed(1.0), 200).is_ok());
    }

    #[test]
    fn tiny_derived_cells_fail_at_rebuild() {
        let mut grid =
            UniformGridIndex::new(1.0e6, 1.0e6, CellSizePolicy::MeanPerception, 200).expect("grid");
        let err = grid
            .rebuild(&[IndexPoint::new(1.0, 1.0, 0.5)])
            .expect_err("too many bins");
        assert_eq!(
            err,
            IndexError::InvalidConfig("cell size too small for world extent")
        );
    }

    #[test]
    fn zero_radius_population_cannot_size_cells() {
        let mut grid =
            UniformGridIndex::new(100.0, 100.0, CellSizePolicy::MeanPerception, 200).expect("grid");
        let err = grid
            .rebuild(&[IndexPoint::new(1.0, 1.0, 0.0)])
            .expect_err("zero radius");
        assert_eq!(err, IndexError::InvalidConfig("cell size must be positive"));
    }

    #[test]
    fn dimensions_follow_cell_size() {
        let mut grid =
            UniformGridIndex::new(800.0, 600.0, CellSizePolicy::MeanPerception, 200).expect("grid");
        grid.rebuild(&[
            IndexPoint::new(10.0, 10.0, 40.0),
            IndexPoint::new(20.0, 20.0, 60.0),
        ])
        .expect("rebuild");
        assert!((grid.cell_size() - 50.0).abs() < f32::EPSILON);
        assert_eq!(grid.dimensions(), (16, 12));

        grid.rebuild(&[IndexPoint::new(10.0, 10.0, 70.0)])
            .expect("rebuild");
        assert_eq!(grid.dimensions(), (12, 9));
    }

    #[test]
    fn every_agent_lands_in_exactly_one_bin() {
        let mut rng = SmallRng::seed_from_u64(11);
        let points = random_points(&mut rng, 500, 640.0, 480.0);
        let mut grid =
            UniformGridIndex::new(640.0, 480.0, CellSizePolicy::MaxPerception, 200).expect("grid");
        grid.rebuild(&points).expect("rebuild");

        let (w, h) = grid.dimensions();
        let mut seen = vec![0usize; points.len()];
        for cx in 0..w {
            for cy in 0..h {
                for &idx in grid.bin(cx, cy) {
                    seen[idx] += 1;
                    let expected_x = ((points[idx].x / grid.cell_size()).floor() as usize).min(w - 1);
                    let expected_y = ((points[idx].y / grid.cell_size()).floor() as usize).min(h - 1);
                    assert_eq!((cx, cy), (expected_x, expected_y));
                }
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
        assert_eq!(grid.stats().buckets, w * h);
    }

    #[test]
    fn block_is_superset_of_true_neighbours() {
        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
        let points = random_points(&mut rng, 400, 1000.0, 700.0);
        let mut grid =
            UniformGridIndex::new(1000.0, 700.0, CellSizePolicy::MaxPerception, 200).expect("grid");
        grid.rebuild(&points).expect("rebuild");

        for (idx, point) in points.iter().enumerate() {
            let block: HashSet<usize> = grid.block_candidates(idx).into_iter().collect();
            for (other, p) in points.iter().enumerate() {
                let dist = ((p.x - point.x).powi(2) + (p.y - point.y).powi(2)).sqrt();
                if dist <= point.radius {
                    assert!(block.contains(&other), "agent {other} missing from block of {idx}");
                }
            }
        }
    }

    #[test]
    fn dense_block_is_subsampled_to_cap() {
        let mut rng = SmallRng::seed_from_u64(3);
        let points: Vec<IndexPoint> = (0..450)
            .map(|i| IndexPoint::new(50.0 + (i % 10) as f32, 50.0 + (i / 10) as f32 * 0.1, 40.0))
            .collect();
        let mut grid =
            UniformGridIndex::new(400.0, 400.0, CellSizePolicy::MaxPerception, 200).expect("grid");
        grid.rebuild(&points).expect("rebuild");

        assert_eq!(grid.block_candidates(0).len(), 450);
        let mut out = Vec::new();
        grid.neighbors_of(0, &mut rng, &mut out);
        assert_eq!(out.len(), 200);
        let unique: HashSet<usize> = out.iter().copied().collect();
        assert_eq!(unique.len(), 200);
        assert!(out.iter().all(|&idx| idx < points.len()));
    }

    #[test]
    fn sparse_block_is_returned_whole() {
        let mut rng = SmallRng::seed_from_u64(5);
        let points = vec![
            IndexPoint::new(10.0, 10.0, 50.0),
            IndexPoint::new(60.0, 10.0, 50.0),
            IndexPoint::new(390.0, 390.0, 50.0),
        ];
        let mut grid =
            UniformGridIndex::new(400.0, 400.0, CellSizePolicy::Fixed(50.0), 200).expect("grid");
        grid.rebuild(&points).expect("rebuild");
        let mut out = Vec::new();
        grid.neighbors_of(0, &mut rng, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);

        let stats = grid.stats();
        assert_eq!(stats.buckets, 64);
        assert_eq!(stats.occupied, 3);
        assert_eq!(stats.max_occupancy, 1);
    }

    #[test]
    fn out_of_range_positions_clamp_to_edge_bins() {
        let mut grid =
            UniformGridIndex::new(100.0, 100.0, CellSizePolicy::Fixed(30.0), 200).expect("grid");
        grid.rebuild(&[
            IndexPoint::new(-5.0, 50.0, 10.0),
            IndexPoint::new(150.0, 99.9, 10.0),
        ])
        .expect("rebuild");
        assert_eq!(grid.dimensions(), (4, 4));
        assert_eq!(grid.cell_of_agent(0), Some((0, 1)));
        assert_eq!(grid.cell_of_agent(1), Some((3, 3)));
    }

    #[test]
    fn empty_rebuild_clears_bins() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut grid =
            UniformGridIndex::new(100.0, 100.0, CellSizePolicy::Fixed(25.0), 200).expect("grid");
        grid.rebuild(&[IndexPoint::new(5.0, 5.0, 10.0)]).expect("rebuild");
        grid.rebuild(&[]).expect("rebuild");
        assert_eq!(grid.stats().occupied, 0);
        let mut out = vec![1, 2, 3];
        grid.neighbors_of(0, &mut rng, &mut out);
        assert!(out.is_empty());
    }
}

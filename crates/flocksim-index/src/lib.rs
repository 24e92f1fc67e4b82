//! Spatial indexing abstractions for flock neighborhood queries.
//!
//! Two strategies sit behind [`NeighborhoodIndex`]: a [`QuadtreeIndex`] that
//! answers rectangle queries sized to each agent's perception radius, and a
//! [`UniformGridIndex`] that gathers the 3x3 block of bins around an agent.
//! Both return candidate supersets; exact radius filtering is the caller's job.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod grid;
pub mod quadtree;

pub use grid::{CellSizePolicy, UniformGridIndex};
pub use quadtree::{QuadEntry, Quadtree, QuadtreeIndex};

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Position and perception reach of one agent, as seen by an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub x: f32,
    pub y: f32,
    /// Perception radius of the agent; used to size queries and grid cells.
    pub radius: f32,
}

impl IndexPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius }
    }
}

/// Axis-aligned rectangle with half-open extents: `[x, x + w) x [y, y + h)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Slack added to radius queries so points exactly `radius` away survive the
/// half-open containment test.
const QUERY_MARGIN: f32 = 1.0e-3;

impl Rect {
    #[must_use]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Square covering every point within `radius` of `(cx, cy)`.
    #[must_use]
    pub fn around(cx: f32, cy: f32, radius: f32) -> Self {
        let reach = radius.max(0.0) + QUERY_MARGIN;
        Self {
            x: cx - reach,
            y: cy - reach,
            w: reach * 2.0,
            h: reach * 2.0,
        }
    }

    /// Half-open point containment.
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }

    /// Half-open overlap test; rectangles that merely touch do not intersect.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x + self.w <= other.x
            || self.x >= other.x + other.w
            || self.y + self.h <= other.y
            || self.y >= other.y + other.h)
    }

    /// Splits into equal quadrants ordered NW, NE, SW, SE (y grows upward).
    #[must_use]
    pub fn quadrants(&self) -> [Rect; 4] {
        let hw = self.w * 0.5;
        let hh = self.h * 0.5;
        [
            Rect::new(self.x, self.y + hh, hw, hh),
            Rect::new(self.x + hw, self.y + hh, hw, hh),
            Rect::new(self.x, self.y, hw, hh),
            Rect::new(self.x + hw, self.y, hw, hh),
        ]
    }

    fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.w > 0.0
            && self.h > 0.0
    }
}

/// Occupancy diagnostics reported by an index after a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Grid bins or quadtree nodes currently allocated.
    pub buckets: usize,
    /// Buckets holding at least one entry.
    pub occupied: usize,
    /// Largest number of entries held by a single bucket.
    pub max_occupancy: usize,
    /// Mean entries per occupied bucket.
    pub mean_occupancy: f32,
    /// Quadtree levels in use; always 1 for a grid.
    pub depth: usize,
}

impl IndexStats {
    fn from_occupancy(buckets: usize, depth: usize, counts: impl Iterator<Item = usize>) -> Self {
        let mut occupied = 0usize;
        let mut total = 0usize;
        let mut max_occupancy = 0usize;
        for count in counts.filter(|&count| count > 0) {
            occupied += 1;
            total += count;
            max_occupancy = max_occupancy.max(count);
        }
        let mean_occupancy = if occupied == 0 {
            0.0
        } else {
            total as f32 / occupied as f32
        };
        Self {
            buckets,
            occupied,
            max_occupancy,
            mean_occupancy,
            depth,
        }
    }
}

/// Common behaviour exposed by neighborhood indices.
///
/// Implementations are rebuilt from scratch once per step and are then only
/// read until the next rebuild, so every query in a step observes the same
/// snapshot of positions.
pub trait NeighborhoodIndex: Send {
    /// Short identifier for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Rebuild internal structures from agent positions.
    fn rebuild(&mut self, points: &[IndexPoint]) -> Result<(), IndexError>;

    /// Replace `out` with candidate neighbours of `agent_idx`.
    ///
    /// The result is a superset of the agents within the query radius and may
    /// include `agent_idx` itself. Strategies that bound their output draw any
    /// sampling randomness from `rng`.
    fn neighbors_of(&self, agent_idx: usize, rng: &mut dyn RngCore, out: &mut Vec<usize>);

    /// Occupancy diagnostics for the current build.
    fn stats(&self) -> IndexStats;
}

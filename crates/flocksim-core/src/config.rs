//! Static world configuration.

use flocksim_index::{
    CellSizePolicy, IndexError, NeighborhoodIndex, QuadtreeIndex, UniformGridIndex,
};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::{FlockRules, WorldBounds, WorldStateError};

/// Which spatial index backs neighbour lookups, with its tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexStrategy {
    Quadtree {
        /// Entries a node holds before subdividing.
        capacity: usize,
        /// Nodes at this depth stop subdividing and grow instead.
        max_depth: usize,
    },
    UniformGrid {
        cell_size: CellSizePolicy,
        /// Candidate sets larger than this are randomly subsampled.
        neighbor_cap: usize,
    },
}

impl IndexStrategy {
    pub const DEFAULT_QUADTREE: Self = Self::Quadtree {
        capacity: 4,
        max_depth: 16,
    };
    pub const DEFAULT_GRID: Self = Self::UniformGrid {
        cell_size: CellSizePolicy::MaxPerception,
        neighbor_cap: 200,
    };

    /// Short identifier matching [`NeighborhoodIndex::name`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Quadtree { .. } => "quadtree",
            Self::UniformGrid { .. } => "uniform_grid",
        }
    }

    /// Instantiate the index over `bounds`.
    pub fn build(&self, bounds: WorldBounds) -> Result<Box<dyn NeighborhoodIndex>, IndexError> {
        Ok(match *self {
            Self::Quadtree {
                capacity,
                max_depth,
            } => Box::new(QuadtreeIndex::new(
                bounds.width,
                bounds.height,
                capacity,
                max_depth,
            )?),
            Self::UniformGrid {
                cell_size,
                neighbor_cap,
            } => Box::new(UniformGridIndex::new(
                bounds.width,
                bounds.height,
                cell_size,
                neighbor_cap,
            )?),
        })
    }
}

impl Default for IndexStrategy {
    fn default() -> Self {
        Self::DEFAULT_QUADTREE
    }
}

/// Static configuration for a flock world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    /// Width of the world in world units.
    pub world_width: f32,
    /// Height of the world in world units.
    pub world_height: f32,
    /// Agents spawned at construction.
    pub initial_population: usize,
    /// Capacity enforced by oldest-first eviction.
    pub max_population: usize,
    /// Ticks between reproduction events; 0 disables reproduction.
    pub spawn_interval: u64,
    /// Age in ticks after which an agent is flagged expired; 0 means agents never expire on their own.
    pub lifespan: u64,
    /// Speed of freshly spawned agents.
    pub initial_speed: f32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    pub index: IndexStrategy,
    pub rules: FlockRules,
    /// Number of tick summaries retained.
    pub history_capacity: usize,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            world_width: 1280.0,
            world_height: 720.0,
            initial_population: 100,
            max_population: 500,
            spawn_interval: 300,
            lifespan: 0,
            initial_speed: 2.0,
            rng_seed: None,
            index: IndexStrategy::default(),
            rules: FlockRules::default(),
            history_capacity: 256,
        }
    }
}

impl FlockConfig {
    /// World extent as a toroidal bounds value.
    #[must_use]
    pub const fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.world_width, self.world_height)
    }

    /// Check every field that would otherwise fail later or produce nonsense.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !(self.world_width.is_finite() && self.world_height.is_finite())
            || self.world_width <= 0.0
            || self.world_height <= 0.0
        {
            return Err(WorldStateError::InvalidConfig(
                "world dimensions must be finite and positive",
            ));
        }
        if self.max_population == 0 {
            return Err(WorldStateError::InvalidConfig(
                "max_population must be at least 1",
            ));
        }
        if self.initial_population > self.max_population {
            return Err(WorldStateError::InvalidConfig(
                "initial_population cannot exceed max_population",
            ));
        }
        if !(self.initial_speed.is_finite() && self.initial_speed > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "initial_speed must be positive",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldStateError::InvalidConfig(
                "history_capacity must be at least 1",
            ));
        }
        self.index.build(self.bounds())?;
        self.rules.validate()
    }

    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

impl FlockRules {
    /// Reject rule constants that break the speed and force bounds.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !(self.min_speed.is_finite() && self.min_speed > 0.0) {
            return Err(WorldStateError::InvalidConfig("min_speed must be positive"));
        }
        if !(self.max_force.is_finite() && self.max_force > 0.0) {
            return Err(WorldStateError::InvalidConfig("max_force must be positive"));
        }
        if !(self.separation_distance.is_finite() && self.separation_distance >= 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "separation_distance must be non-negative",
            ));
        }
        if !(self.cohesion_factor.is_finite() && self.cohesion_factor >= 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "cohesion_factor must be non-negative",
            ));
        }
        if !(self.separation_epsilon.is_finite() && self.separation_epsilon > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "separation_epsilon must be positive",
            ));
        }
        Ok(())
    }
}

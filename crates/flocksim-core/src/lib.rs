//! Core types shared across the flocksim workspace.
//!
//! A [`SimulationWorld`] owns an ordered population of [`Boid`]s. Each call
//! to [`SimulationWorld::step`] rebuilds the configured spatial index, moves
//! every agent with the flocking rules in [`flock`], then applies reproduction
//! and the eviction policies. Genomes and their mutation rules live in
//! [`genome`]; static settings in [`config`].

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod config;
pub mod flock;
pub mod genome;
pub mod world;

pub use config::{FlockConfig, IndexStrategy};
pub use flock::{FlockRules, Motion, Steering, flock_update, steering};
pub use flocksim_index::{CellSizePolicy, IndexError, IndexStats};
pub use genome::Genome;
pub use world::SimulationWorld;

/// High level simulation clock (steps processed since construction).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of reproduction events since construction.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Generation(pub u32);

impl Generation {
    /// Advances to the next generation, saturating at `u32::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Stable agent handle. Allocated monotonically and never reused.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// World-space displacement per step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    /// Velocity of magnitude `speed` pointing along `angle` radians.
    #[must_use]
    pub fn from_angle(angle: f32, speed: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos * speed, sin * speed)
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.vx.is_finite() && self.vy.is_finite()
    }

    #[must_use]
    pub fn speed(self) -> f32 {
        self.vx.hypot(self.vy)
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let speed = self.speed();
        if speed > 0.0 {
            self.scaled(1.0 / speed)
        } else {
            self
        }
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.vx * factor, self.vy * factor)
    }
}

/// Toroidal world extent `[0, width) x [0, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
}

impl WorldBounds {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Wrap `position` onto the torus.
    #[must_use]
    pub fn wrap(&self, position: Position) -> Position {
        Position::new(
            wrap_axis(position.x, self.width),
            wrap_axis(position.y, self.height),
        )
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        (0.0..self.width).contains(&position.x) && (0.0..self.height).contains(&position.y)
    }

    /// Uniformly distributed position inside the world.
    pub fn random_position(&self, rng: &mut dyn RngCore) -> Position {
        Position::new(
            rng.random::<f32>() * self.width,
            rng.random::<f32>() * self.height,
        )
    }
}

fn wrap_axis(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // A tiny negative value can round up to exactly `extent`.
    if wrapped >= extent { 0.0 } else { wrapped }
}

/// A single flocking agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boid {
    pub id: AgentId,
    pub position: Position,
    pub velocity: Velocity,
    pub genome: Genome,
}

impl Boid {
    #[must_use]
    pub const fn new(id: AgentId, position: Position, velocity: Velocity, genome: Genome) -> Self {
        Self {
            id,
            position,
            velocity,
            genome,
        }
    }

    /// Ticks since this agent was born.
    #[must_use]
    pub const fn age(&self, now: Tick) -> u64 {
        self.genome.age(now)
    }
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The spatial index rejected its configuration.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A host-supplied agent failed validation and was not spawned.
    #[error("invalid agent: {0}")]
    InvalidAgent(&'static str),
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Offspring appended by reproduction this tick.
    pub births: usize,
    /// Agents removed because their expiry flag was set.
    pub expired: usize,
    /// Oldest agents removed to bring the population back under capacity.
    pub evicted: usize,
    /// Set when the spatial index failed to rebuild and motion was skipped.
    pub motion_skipped: bool,
}

impl TickEvents {
    /// Total removals across both eviction policies.
    #[must_use]
    pub const fn deaths(&self) -> usize {
        self.expired + self.evicted
    }
}

/// Summary recorded in the world's history after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub population: usize,
    pub generation: Generation,
    pub births: usize,
    pub deaths: usize,
    pub mean_speed: f32,
    pub max_speed: f32,
    pub mean_perception: f32,
}

/// Mean heritable traits across the current population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub count: usize,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub separation_weight: f32,
    pub perception_radius: f32,
    pub max_speed: f32,
    pub size_w: f32,
    pub size_h: f32,
    /// Mean colour per channel.
    pub color: [f32; 3],
}

impl PopulationStats {
    /// Average the genomes of `agents`; an empty slice yields all zeroes.
    #[must_use]
    pub fn from_agents(agents: &[Boid]) -> Self {
        if agents.is_empty() {
            return Self::default();
        }
        let mut stats = Self {
            count: agents.len(),
            ..Self::default()
        };
        for genome in agents.iter().map(|agent| &agent.genome) {
            stats.alignment_weight += genome.alignment_weight;
            stats.cohesion_weight += genome.cohesion_weight;
            stats.separation_weight += genome.separation_weight;
            stats.perception_radius += genome.perception_radius;
            stats.max_speed += genome.max_speed;
            stats.size_w += genome.size_w;
            stats.size_h += genome.size_h;
            for (sum, channel) in stats.color.iter_mut().zip(genome.color) {
                *sum += f32::from(channel);
            }
        }
        let n = agents.len() as f32;
        stats.alignment_weight /= n;
        stats.cohesion_weight /= n;
        stats.separation_weight /= n;
        stats.perception_radius /= n;
        stats.max_speed /= n;
        stats.size_w /= n;
        stats.size_h /= n;
        for sum in &mut stats.color {
            *sum /= n;
        }
        stats
    }
}

//! Per-agent steering and motion integration.
//!
//! Everything here is pure: an update reads an immutable snapshot of the
//! flock and returns the agent's next state without consuming randomness.

use serde::{Deserialize, Serialize};

use crate::{Boid, Position, Velocity, WorldBounds};

/// Tunable constants shared by every agent's update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockRules {
    /// Neighbours closer than this contribute to separation.
    pub separation_distance: f32,
    /// Added to the distance before dividing so coincident agents stay finite.
    pub separation_epsilon: f32,
    /// Gain applied to the vector toward the local centre of mass.
    pub cohesion_factor: f32,
    /// Upper bound on the combined steering magnitude.
    pub max_force: f32,
    /// Floor on speed after steering; the genome supplies the ceiling.
    pub min_speed: f32,
}

impl Default for FlockRules {
    fn default() -> Self {
        Self {
            separation_distance: 25.0,
            separation_epsilon: 0.01,
            cohesion_factor: 0.05,
            max_force: 0.5,
            min_speed: 0.5,
        }
    }
}

/// Weighted per-rule steering contributions, before the force cap.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Steering {
    pub alignment: Velocity,
    pub cohesion: Velocity,
    pub separation: Velocity,
    /// Neighbours that passed the perception filter.
    pub neighbors: usize,
}

impl Steering {
    /// Sum of the three rule vectors.
    #[must_use]
    pub fn combined(&self) -> Velocity {
        Velocity::new(
            self.alignment.vx + self.cohesion.vx + self.separation.vx,
            self.alignment.vy + self.cohesion.vy + self.separation.vy,
        )
    }
}

/// Result of one update: the agent's next state plus the capped steer applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Motion {
    pub position: Position,
    pub velocity: Velocity,
    pub steer: Velocity,
}

/// Accumulate alignment, cohesion and separation for `agent_index`.
///
/// `candidates` may be a superset of the true neighbourhood and may contain
/// `agent_index` itself; both are filtered here.
#[must_use]
pub fn steering(
    agent_index: usize,
    snapshot: &[Boid],
    candidates: &[usize],
    rules: &FlockRules,
) -> Steering {
    let Some(agent) = snapshot.get(agent_index) else {
        return Steering::default();
    };
    let genome = &agent.genome;
    let (x, y) = (agent.position.x, agent.position.y);
    let perception_sq = genome.perception_radius * genome.perception_radius;
    let separation_sq = rules.separation_distance * rules.separation_distance;

    let (mut align_x, mut align_y) = (0.0_f32, 0.0_f32);
    let (mut center_x, mut center_y) = (0.0_f32, 0.0_f32);
    let (mut sep_x, mut sep_y) = (0.0_f32, 0.0_f32);
    let mut total = 0usize;

    for &other_index in candidates {
        if other_index == agent_index {
            continue;
        }
        let Some(other) = snapshot.get(other_index) else {
            continue;
        };
        let dx = other.position.x - x;
        let dy = other.position.y - y;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq > perception_sq {
            continue;
        }

        align_x += other.velocity.vx;
        align_y += other.velocity.vy;
        center_x += other.position.x;
        center_y += other.position.y;

        if dist_sq < separation_sq {
            let factor = 1.0 / (dist_sq.sqrt() + rules.separation_epsilon);
            sep_x -= dx * factor;
            sep_y -= dy * factor;
        }
        total += 1;
    }

    if total == 0 {
        return Steering::default();
    }

    let count = total as f32;
    let alignment = Velocity::new(align_x / count, align_y / count)
        .normalized()
        .scaled(genome.alignment_weight);
    let cohesion_gain = rules.cohesion_factor * genome.cohesion_weight;
    let cohesion = Velocity::new(
        (center_x / count - x) * cohesion_gain,
        (center_y / count - y) * cohesion_gain,
    );
    let separation = Velocity::new(sep_x, sep_y).scaled(genome.separation_weight);

    Steering {
        alignment,
        cohesion,
        separation,
        neighbors: total,
    }
}

/// Scale `steer` down to `max_force` when it exceeds it, keeping direction.
#[must_use]
pub fn limit_force(steer: Velocity, max_force: f32) -> Velocity {
    let magnitude = steer.speed();
    if magnitude > max_force {
        steer.scaled(max_force / magnitude)
    } else {
        steer
    }
}

/// Rescale `velocity` into `[min_speed, max_speed]`. A zero vector has no
/// direction to preserve and is returned unchanged.
#[must_use]
pub fn clamp_speed(velocity: Velocity, min_speed: f32, max_speed: f32) -> Velocity {
    let speed = velocity.speed();
    if speed == 0.0 {
        return velocity;
    }
    if speed > max_speed {
        velocity.scaled(max_speed / speed)
    } else if speed < min_speed {
        velocity.scaled(min_speed / speed)
    } else {
        velocity
    }
}

/// Compute the next position and velocity of `agent_index`.
#[must_use]
pub fn flock_update(
    agent_index: usize,
    snapshot: &[Boid],
    candidates: &[usize],
    rules: &FlockRules,
    bounds: WorldBounds,
) -> Motion {
    let Some(agent) = snapshot.get(agent_index) else {
        return Motion::default();
    };
    let steer = limit_force(
        steering(agent_index, snapshot, candidates, rules).combined(),
        rules.max_force,
    );
    let velocity = clamp_speed(
        Velocity::new(agent.velocity.vx + steer.vx, agent.velocity.vy + steer.vy),
        rules.min_speed,
        agent.genome.max_speed,
    );
    let position = bounds.wrap(Position::new(
        agent.position.x + velocity.vx,
        agent.position.y + velocity.vy,
    ));
    Motion {
        position,
        velocity,
        steer,
    }
}

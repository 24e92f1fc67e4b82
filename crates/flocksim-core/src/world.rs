//! Population ownership and the per-tick pipeline.

use flocksim_index::{IndexPoint, IndexStats, NeighborhoodIndex};
use ordered_float::OrderedFloat;
use rand::seq::IteratorRandom;
use rand::{Rng, rngs::SmallRng};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::fmt;
use tracing::{debug, trace, warn};

use crate::flock::{clamp_speed, flock_update};
use crate::{
    AgentId, Boid, FlockConfig, Generation, Genome, IndexStrategy, Motion, PopulationStats,
    Position, Tick, TickEvents, TickSummary, Velocity, WorldBounds, WorldStateError,
};

/// Owns the flock, its spatial index and the random source.
///
/// Agents are kept in creation order, oldest first, so capacity eviction is a
/// drain from the front.
pub struct SimulationWorld {
    config: FlockConfig,
    bounds: WorldBounds,
    tick: Tick,
    generation: Generation,
    next_id: u64,
    rng: SmallRng,
    agents: Vec<Boid>,
    index: Box<dyn NeighborhoodIndex>,
    points: Vec<IndexPoint>,
    candidates: Vec<usize>,
    motions: Vec<Motion>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for SimulationWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationWorld")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("generation", &self.generation)
            .field("agent_count", &self.agents.len())
            .field("index", &self.index.name())
            .finish()
    }
}

impl SimulationWorld {
    /// Validate `config`, build its index and spawn the initial population.
    pub fn new(config: FlockConfig) -> Result<Self, WorldStateError> {
        config.validate()?;
        let bounds = config.bounds();
        let index = config.index.build(bounds)?;
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        let initial_population = config.initial_population;
        let mut world = Self {
            config,
            bounds,
            tick: Tick::zero(),
            generation: Generation::default(),
            next_id: 0,
            rng,
            agents: Vec::with_capacity(initial_population),
            index,
            points: Vec::new(),
            candidates: Vec::new(),
            motions: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        };
        for _ in 0..initial_population {
            world.spawn_random();
        }
        Ok(world)
    }

    fn allocate_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn random_heading(&mut self) -> Velocity {
        let angle = self.rng.random::<f32>() * TAU;
        Velocity::from_angle(angle, self.config.initial_speed)
    }

    fn push_agent(&mut self, position: Position, velocity: Velocity, genome: Genome) -> AgentId {
        let id = self.allocate_id();
        let position = self.bounds.wrap(position);
        self.agents.push(Boid::new(id, position, velocity, genome));
        id
    }

    /// Append a host-supplied agent. The position is wrapped onto the world
    /// and the genome's birth tick is left as supplied.
    ///
    /// Non-finite positions or velocities and genomes with any trait outside
    /// its clamp range are rejected without allocating an id.
    pub fn spawn_agent(
        &mut self,
        position: Position,
        velocity: Velocity,
        genome: Genome,
    ) -> Result<AgentId, WorldStateError> {
        if !position.is_finite() {
            return Err(WorldStateError::InvalidAgent("position must be finite"));
        }
        if !velocity.is_finite() {
            return Err(WorldStateError::InvalidAgent("velocity must be finite"));
        }
        if !genome.is_within_bounds() {
            return Err(WorldStateError::InvalidAgent(
                "genome traits must lie within their clamp ranges",
            ));
        }
        Ok(self.push_agent(position, velocity, genome))
    }

    /// Append a founder at a random position with a random heading and genome.
    pub fn spawn_random(&mut self) -> AgentId {
        let position = self.bounds.random_position(&mut self.rng);
        let velocity = self.random_heading();
        let genome = Genome::random(&mut self.rng, self.tick);
        self.push_agent(position, velocity, genome)
    }

    /// Flag an agent for removal during the next eviction stage. Returns
    /// `false` when no live agent carries `id`.
    pub fn mark_expired(&mut self, id: AgentId) -> bool {
        match self.agents.iter_mut().find(|agent| agent.id == id) {
            Some(agent) => {
                agent.genome.expired = true;
                true
            }
            None => false,
        }
    }

    /// Swap the spatial index. Takes effect from the next step.
    pub fn set_index_strategy(&mut self, strategy: IndexStrategy) -> Result<(), WorldStateError> {
        let index = strategy.build(self.bounds)?;
        debug!(from = self.index.name(), to = index.name(), "switching spatial index");
        self.index = index;
        self.config.index = strategy;
        Ok(())
    }

    fn stage_aging(&mut self, next_tick: Tick) {
        let lifespan = self.config.lifespan;
        if lifespan == 0 {
            return;
        }
        for agent in &mut self.agents {
            if agent.age(next_tick) >= lifespan {
                agent.genome.expired = true;
            }
        }
    }

    fn stage_index(&mut self) -> bool {
        self.points.clear();
        self.points.extend(self.agents.iter().map(|agent| {
            IndexPoint::new(
                agent.position.x,
                agent.position.y,
                agent.genome.perception_radius,
            )
        }));
        match self.index.rebuild(&self.points) {
            Ok(()) => {
                trace!(index = self.index.name(), agents = self.points.len(), "index rebuilt");
                true
            }
            Err(err) => {
                warn!(index = self.index.name(), %err, "index rebuild failed; skipping motion");
                false
            }
        }
    }

    fn stage_flock(&mut self) {
        let rules = self.config.rules;
        let bounds = self.bounds;
        self.motions.clear();
        for idx in 0..self.agents.len() {
            self.index.neighbors_of(idx, &mut self.rng, &mut self.candidates);
            self.motions.push(flock_update(
                idx,
                &self.agents,
                &self.candidates,
                &rules,
                bounds,
            ));
        }
        for (agent, motion) in self.agents.iter_mut().zip(&self.motions) {
            agent.position = motion.position;
            agent.velocity = motion.velocity;
        }
    }

    fn stage_reproduction(&mut self, next_tick: Tick) -> usize {
        let interval = self.config.spawn_interval;
        if interval == 0 || !next_tick.0.is_multiple_of(interval) {
            return 0;
        }
        // Agents flagged for expiry are removed this step and never breed.
        let Some(parent) = self
            .agents
            .iter()
            .filter(|agent| !agent.genome.expired)
            .choose(&mut self.rng)
            .copied()
        else {
            debug!(tick = %next_tick, "no parent available for reproduction");
            return 0;
        };
        let genome = parent.genome.mutate(&mut self.rng, next_tick);
        let velocity = clamp_speed(
            self.random_heading(),
            self.config.rules.min_speed,
            genome.max_speed,
        );
        let child = self.push_agent(parent.position, velocity, genome);
        self.generation = self.generation.next();
        debug!(
            tick = %next_tick,
            parent = %parent.id,
            %child,
            generation = self.generation.0,
            "offspring spawned"
        );
        1
    }

    fn stage_expiry(&mut self) -> usize {
        let before = self.agents.len();
        self.agents.retain(|agent| !agent.genome.expired);
        let removed = before - self.agents.len();
        if removed > 0 {
            debug!(removed, "expired agents evicted");
        }
        removed
    }

    fn stage_capacity(&mut self) -> usize {
        let excess = self.agents.len().saturating_sub(self.config.max_population);
        if excess > 0 {
            self.agents.drain(..excess);
            debug!(excess, max = self.config.max_population, "oldest agents evicted");
        }
        excess
    }

    fn stage_summary(&mut self, events: &TickEvents) {
        let population = self.agents.len();
        let (mean_speed, max_speed, mean_perception) = if population == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = population as f32;
            let speed_sum: f32 = self.agents.iter().map(|a| a.velocity.speed()).sum();
            let perception_sum: f32 = self
                .agents
                .iter()
                .map(|a| a.genome.perception_radius)
                .sum();
            let max_speed = self
                .agents
                .iter()
                .map(|a| OrderedFloat(a.velocity.speed()))
                .max()
                .map_or(0.0, OrderedFloat::into_inner);
            (speed_sum / n, max_speed, perception_sum / n)
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: events.tick,
            population,
            generation: self.generation,
            births: events.births,
            deaths: events.deaths(),
            mean_speed,
            max_speed,
            mean_perception,
        });
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();

        self.stage_aging(next_tick);
        let indexed = self.stage_index();
        if indexed {
            self.stage_flock();
        }
        let births = self.stage_reproduction(next_tick);
        let expired = self.stage_expiry();
        let evicted = self.stage_capacity();

        let events = TickEvents {
            tick: next_tick,
            births,
            expired,
            evicted,
            motion_skipped: !indexed,
        };
        self.stage_summary(&events);
        self.tick = next_tick;
        events
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Reproduction events so far.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Live agents, oldest first.
    #[must_use]
    pub fn agents(&self) -> &[Boid] {
        &self.agents
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Boid> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Recent tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    #[must_use]
    pub fn last_summary(&self) -> Option<&TickSummary> {
        self.history.back()
    }

    /// Name of the active spatial index.
    #[must_use]
    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    /// Occupancy of the index as of the last rebuild.
    #[must_use]
    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }

    #[must_use]
    pub fn population_stats(&self) -> PopulationStats {
        PopulationStats::from_agents(&self.agents)
    }
}

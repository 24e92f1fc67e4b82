//! Shared plumbing for the headless flocksim runner.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use flocksim_core::{
    FlockConfig, IndexStats, IndexStrategy, PopulationStats, SimulationWorld, TickSummary,
};
use serde::Serialize;
use tracing::{info, warn};

/// Index selection exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Quadtree,
    Grid,
}

impl StrategyArg {
    /// Default tuning for the chosen strategy.
    #[must_use]
    pub const fn strategy(self) -> IndexStrategy {
        match self {
            Self::Quadtree => IndexStrategy::DEFAULT_QUADTREE,
            Self::Grid => IndexStrategy::DEFAULT_GRID,
        }
    }
}

/// Command line values layered over a loaded configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub strategy: Option<StrategyArg>,
    pub population: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut FlockConfig) {
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(strategy) = self.strategy {
            config.index = strategy.strategy();
        }
        if let Some(population) = self.population {
            config.initial_population = population;
            config.max_population = config.max_population.max(population);
        }
    }
}

/// Read a JSON configuration; missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<FlockConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

/// Final state of a headless run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub strategy: &'static str,
    pub steps: u64,
    pub last: Option<TickSummary>,
    pub population: PopulationStats,
    pub index: IndexStats,
    pub total_births: usize,
    pub total_deaths: usize,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to encode run report")
    }
}

/// Build a world from `config` and advance it `steps` times, logging a
/// summary every `report_every` ticks (0 silences periodic reports).
pub fn run(config: FlockConfig, steps: u64, report_every: u64) -> Result<RunReport> {
    let mut world = SimulationWorld::new(config).context("failed to construct world")?;
    info!(
        agents = world.agent_count(),
        index = world.index_name(),
        width = world.bounds().width,
        height = world.bounds().height,
        "world ready"
    );

    let mut total_births = 0;
    let mut total_deaths = 0;
    let mut warned_empty = false;
    for _ in 0..steps {
        let events = world.step();
        total_births += events.births;
        total_deaths += events.deaths();
        if world.agent_count() == 0 && !warned_empty {
            warn!(tick = %events.tick, "population died out");
            warned_empty = true;
        }
        if report_every > 0
            && events.tick.0.is_multiple_of(report_every)
            && let Some(summary) = world.last_summary()
        {
            log_summary(summary, &world.index_stats());
        }
    }

    Ok(RunReport {
        strategy: world.index_name(),
        steps,
        last: world.last_summary().cloned(),
        population: world.population_stats(),
        index: world.index_stats(),
        total_births,
        total_deaths,
    })
}

fn log_summary(summary: &TickSummary, index: &IndexStats) {
    info!(
        tick = summary.tick.0,
        population = summary.population,
        generation = summary.generation.0,
        births = summary.births,
        deaths = summary.deaths,
        mean_speed = summary.mean_speed,
        max_speed = summary.max_speed,
        mean_perception = summary.mean_perception,
        buckets = index.buckets,
        max_occupancy = index.max_occupancy,
        mean_occupancy = index.mean_occupancy,
        "tick summary"
    );
}

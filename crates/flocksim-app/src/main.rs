use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use flocksim_app::{Overrides, StrategyArg, load_config, run};
use flocksim_core::FlockConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "flocksim", version, about = "Run a boid flock headlessly")]
struct Cli {
    /// JSON configuration file; omitted fields use defaults.
    #[arg(short, long, env = "FLOCKSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Number of ticks to simulate.
    #[arg(short, long, default_value_t = 1_000)]
    steps: u64,

    /// RNG seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Spatial index used for neighbour lookup.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Initial population (raises the capacity if needed).
    #[arg(short, long)]
    population: Option<usize>,

    /// Log a summary every N ticks; 0 disables.
    #[arg(long, default_value_t = 100)]
    report_every: u64,

    /// Print the final report as JSON on stdout.
    #[arg(long)]
    summary_json: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FlockConfig::default(),
    };
    Overrides {
        seed: cli.seed,
        strategy: cli.strategy,
        population: cli.population,
    }
    .apply(&mut config);

    info!(steps = cli.steps, "starting flocksim run");
    let report = run(config, cli.steps, cli.report_every)?;
    info!(
        strategy = report.strategy,
        births = report.total_births,
        deaths = report.total_deaths,
        population = report.population.count,
        "run finished"
    );
    if cli.summary_json {
        println!("{}", report.to_json()?);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

use flocksim_app::{Overrides, StrategyArg, load_config, run};
use flocksim_core::{FlockConfig, IndexStrategy};
use std::fs;
use std::path::PathBuf;

fn scratch_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("flocksim-{}-{name}", std::process::id()));
    fs::write(&path, contents).expect("write scratch config");
    path
}

#[test]
fn loads_partial_json_config() {
    let path = scratch_file(
        "partial.json",
        r#"{
            "world_width": 500.0,
            "spawn_interval": 10,
            "index": { "kind": "uniform_grid", "cell_size": { "fixed": 40.0 }, "neighbor_cap": 64 }
        }"#,
    );
    let config = load_config(&path).expect("config");
    fs::remove_file(&path).ok();
    assert_eq!(config.world_width, 500.0);
    assert_eq!(config.spawn_interval, 10);
    assert_eq!(config.initial_population, 100);
    assert_eq!(config.index.name(), "uniform_grid");
}

#[test]
fn malformed_config_reports_the_path() {
    let path = scratch_file("broken.json", "{ not json");
    let err = load_config(&path).expect_err("should fail");
    fs::remove_file(&path).ok();
    assert!(format!("{err:#}").contains("failed to parse config"));
}

#[test]
fn missing_config_is_an_error() {
    let path = std::env::temp_dir().join("flocksim-definitely-missing.json");
    assert!(load_config(&path).is_err());
}

#[test]
fn overrides_replace_loaded_values() {
    let mut config = FlockConfig {
        max_population: 50,
        ..FlockConfig::default()
    };
    Overrides {
        seed: Some(5),
        strategy: Some(StrategyArg::Grid),
        population: Some(80),
    }
    .apply(&mut config);
    assert_eq!(config.rng_seed, Some(5));
    assert_eq!(config.index, IndexStrategy::DEFAULT_GRID);
    assert_eq!(config.initial_population, 80);
    assert_eq!(config.max_population, 80);
    config.validate().expect("overridden config stays valid");
}

#[test]
fn headless_run_reports_final_state() {
    let config = FlockConfig {
        initial_population: 30,
        spawn_interval: 20,
        rng_seed: Some(17),
        ..FlockConfig::default()
    };
    let report = run(config, 100, 25).expect("run");
    assert_eq!(report.strategy, "quadtree");
    assert_eq!(report.steps, 100);
    assert_eq!(report.total_births, 5);
    assert_eq!(report.total_deaths, 0);
    assert_eq!(report.population.count, 35);
    let last = report.last.as_ref().expect("summary");
    assert_eq!(last.tick.0, 100);
    assert_eq!(last.generation.0, 5);

    let json = report.to_json().expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse report");
    assert_eq!(value["strategy"], "quadtree");
    assert_eq!(value["last"]["population"], 35);
}

#[test]
fn invalid_config_fails_the_run() {
    let config = FlockConfig {
        initial_population: 10,
        max_population: 5,
        ..FlockConfig::default()
    };
    let err = run(config, 10, 0).expect_err("should fail");
    assert!(format!("{err:#}").contains("initial_population"));
}

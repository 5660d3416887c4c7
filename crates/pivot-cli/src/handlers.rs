//! Subcommand handlers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use pivot_core::{BatchDescriptor, EngineConfig, Session, SystemMetrics};
use pivot_engine::{
    ExecutionController, HostMetricsProbe, MetricsProbe, StaticMetrics, StrategyFactory,
    StrategyRegistry,
};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::simulate::SimulatedBranch;

/// Reads a batch descriptor from a JSON file.
pub fn load_batch(path: &Path) -> Result<BatchDescriptor> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch {}", path.display()))?;
    let batch = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse batch {}", path.display()))?;
    Ok(batch)
}

/// Loads `path`, else the default config file if one exists, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        return Ok(EngineConfig::load_from_file(path)?);
    }
    let default_path = EngineConfig::config_path()?;
    if default_path.exists() {
        Ok(EngineConfig::load_from_file(&default_path)?)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Runs a batch against the simulated work primitive and reports the run.
pub async fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.forced_strategy = args.strategy.or(config.forced_strategy);
    let batch = load_batch(&args.batch)?;

    let mut failing = Vec::new();
    for &index in &args.fail {
        let Some(task) = batch.tasks.get(index) else {
            warn!("Ignoring --fail {index}: batch has {} tasks", batch.len());
            continue;
        };
        failing.push(task.id);
    }
    let branch =
        Arc::new(SimulatedBranch::new(Duration::from_millis(args.latency_ms)).failing(failing));

    let probe: Arc<dyn MetricsProbe> = if args.host_metrics {
        Arc::new(HostMetricsProbe::new())
    } else {
        Arc::new(StaticMetrics::default())
    };
    let mut controller = ExecutionController::with_probe(config, probe);
    let session = Session::new(args.session);

    let result = controller
        .execute_with_strategy(&batch, &session, branch, None, None)
        .await;

    if let Some(run) = controller.last_run() {
        let strategies: Vec<String> = run.strategies.iter().map(ToString::to_string).collect();
        info!("Run summary:");
        info!("  Strategies: {}", strategies.join(" -> "));
        info!("  Switches: {} ({} fallbacks)", run.switches, run.fallbacks);
        info!("  Completed: {}/{}", run.completed_items, run.total_steps);
        info!("  Failed: {}", run.failed_items);
        info!("  Executed steps: {}", run.executed_steps);
        info!("  Total latency: {:?}", run.total_latency);
    }

    let output = result?;
    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(&output)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write outcomes to {}", path.display()))?;
        info!("Wrote {} outcomes to {}", output.outcomes.len(), path.display());
    }
    Ok(())
}

/// Scores every default strategy for a batch under the given or sampled metrics.
pub fn handle_score(
    batch: &Path,
    config: Option<&Path>,
    load: Option<f64>,
    memory: Option<f64>,
) -> Result<()> {
    let config = load_config(config)?;
    let batch = load_batch(batch)?;

    let sampled = if load.is_none() || memory.is_none() {
        HostMetricsProbe::new().sample()
    } else {
        SystemMetrics::default()
    };
    let metrics = SystemMetrics {
        current_system_load: load.unwrap_or(sampled.current_system_load),
        memory_usage: memory.unwrap_or(sampled.memory_usage),
        ..sampled
    };

    let factory =
        StrategyFactory::new(StrategyRegistry::with_defaults()).with_weights(config.scoring);
    info!(
        "Batch '{}' with {} tasks (load {:.2}, memory {:.2})",
        batch.name,
        batch.len(),
        metrics.current_system_load,
        metrics.memory_usage
    );
    for (rank, score) in factory.score_strategies(&batch, &metrics).iter().enumerate() {
        let factors: Vec<String> = score
            .factors
            .iter()
            .map(|(name, value)| format!("{name}={value:.3}"))
            .collect();
        info!(
            "{}. {} {:.3} ({})",
            rank + 1,
            score.strategy,
            score.score,
            factors.join(", ")
        );
    }
    if let Some(forced) = config.forced_strategy {
        info!("Configuration forces the {forced} strategy");
    }
    Ok(())
}

/// Shows the configuration, writing defaults first when `init` is set.
pub fn handle_config(init: bool, path: Option<PathBuf>) -> Result<()> {
    let path = path.map_or_else(EngineConfig::config_path, Ok)?;

    let config = if path.exists() {
        EngineConfig::load_from_file(&path)?
    } else if init {
        let config = EngineConfig::default();
        config.save_to_file(&path)?;
        info!("Wrote default configuration to {}", path.display());
        config
    } else {
        info!("No configuration at {}, showing defaults", path.display());
        EngineConfig::default()
    };

    info!("Configuration ({}):", path.display());
    info!("{}", config.to_toml()?);
    Ok(())
}

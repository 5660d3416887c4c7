//! Execution controller.
//!
//! Runs a batch under the best-scoring strategy and watches its progress while
//! it runs. When the factory signals a switch, the running executor is asked to
//! stop, its progress is taken back, and a new executor resumes from it. When an
//! executor fails, the controller falls back to the sequential strategy with the
//! failed positions reopened. Every switch, fallbacks included, counts against
//! `SwitchConfig::max_switches`.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use pivot_core::{
    BatchDescriptor, Branch, EngineConfig, Error, ExecutionProgress, ProgressSnapshot, Result,
    Session, StrategyKind, StrategyParams, SystemMetrics,
};
use tokio::sync::watch;
use tokio::{pin, select};
use tracing::{Instrument as _, error, info, info_span, warn};

use crate::executor::{
    BatchOutput, ExecutorConstructor, ExecutorInit, RunSignals, RunStatus, StrategyExecutor,
};
use crate::factory::{StrategyFactory, SwitchDecision, SwitchTrigger};
use crate::metrics::{AggregateMetrics, MetricsCollector, MetricsProbe, RunMetrics, StaticMetrics};
use crate::registry::StrategyRegistry;

/// Watches published progress and decides when the running strategy should change.
struct SwitchMonitor<'run> {
    factory: &'run StrategyFactory,
    probe: &'run dyn MetricsProbe,
    batch: &'run BatchDescriptor,
    current: StrategyKind,
    updates: watch::Receiver<ProgressSnapshot>,
    baseline: usize,
    min_observations: usize,
}

impl SwitchMonitor<'_> {
    /// Resolves with a switch target, or `None` once the executor stops publishing.
    ///
    /// A strategy is only judged after `min_observations` items settled under it,
    /// and never once every position holds a checkpoint.
    async fn watch(mut self) -> Option<(StrategyKind, SwitchTrigger)> {
        while self.updates.changed().await.is_ok() {
            let snapshot = *self.updates.borrow_and_update();
            let settled = snapshot.settled();
            if settled < self.baseline + self.min_observations || settled >= snapshot.total_steps {
                continue;
            }

            let observed = AggregateMetrics::observe(&snapshot, &self.probe.sample());
            if let SwitchDecision::Switch { target, trigger } =
                self.factory
                    .should_switch_strategy(self.current, self.batch, &observed)
            {
                return Some((target, trigger));
            }
        }
        None
    }
}

/// Runs the executor to completion while the monitor watches it.
///
/// Once the monitor picks a target the executor is asked to stop; its own
/// result is always awaited, so recorded checkpoints are never abandoned.
async fn drive(
    executor: &mut dyn StrategyExecutor,
    batch: &BatchDescriptor,
    branch: Arc<dyn Branch>,
    signals: &RunSignals,
    monitor: Option<SwitchMonitor<'_>>,
) -> (Result<RunStatus>, Option<(StrategyKind, SwitchTrigger)>) {
    let mut run = executor.execute(batch, branch);
    let watcher = async move {
        let Some(monitor) = monitor else {
            return None;
        };
        monitor.watch().await
    };
    pin!(watcher);

    let mut watching = true;
    let mut target = None;
    loop {
        select! {
            biased;
            status = &mut run => return (status, target),
            decided = &mut watcher, if watching => {
                watching = false;
                if let Some(decided) = decided {
                    signals.request_stop();
                    target = Some(decided);
                }
            }
        }
    }
}

/// Entry point for running batches with adaptive strategy selection.
pub struct ExecutionController {
    factory: StrategyFactory,
    probe: Arc<dyn MetricsProbe>,
    config: EngineConfig,
    collector: MetricsCollector,
}

impl ExecutionController {
    /// Creates a controller with the default strategies and a static probe
    pub fn new(config: EngineConfig) -> Self {
        Self::with_probe(config, Arc::new(StaticMetrics::default()))
    }

    /// Creates a controller sampling live metrics from `probe`
    pub fn with_probe(config: EngineConfig, probe: Arc<dyn MetricsProbe>) -> Self {
        let factory = Self::build_factory(StrategyRegistry::with_defaults(), &config, &probe);
        Self {
            factory,
            probe,
            config,
            collector: MetricsCollector::new(),
        }
    }

    /// Replaces the strategy registry
    #[must_use]
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.factory = Self::build_factory(registry, &self.config, &self.probe);
        self
    }

    fn build_factory(
        registry: StrategyRegistry,
        config: &EngineConfig,
        probe: &Arc<dyn MetricsProbe>,
    ) -> StrategyFactory {
        StrategyFactory::new(registry)
            .with_weights(config.scoring)
            .with_switching(config.switching)
            .with_probe(Arc::clone(probe))
    }

    /// Get the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the strategy factory
    pub fn factory(&self) -> &StrategyFactory {
        &self.factory
    }

    /// Registers or replaces the constructor for `kind`
    pub fn register_strategy(&mut self, kind: StrategyKind, constructor: ExecutorConstructor) {
        self.factory.register_strategy(kind, constructor);
    }

    /// Aggregate metrics over every run since the last reset
    pub fn get_metrics(&self) -> AggregateMetrics {
        self.collector.aggregate()
    }

    /// Clears accumulated metrics and run history
    pub fn reset_metrics(&mut self) {
        self.collector.clear();
    }

    /// Metrics of the most recent run
    pub fn last_run(&self) -> Option<&RunMetrics> {
        self.collector.last()
    }

    /// Metrics of the most recent runs since the last reset, oldest first.
    ///
    /// The history keeps [`MetricsCollector::DEFAULT_HISTORY_LIMIT`] runs;
    /// [`ExecutionController::get_metrics`] still covers every run.
    pub fn runs(&self) -> &VecDeque<RunMetrics> {
        self.collector.runs()
    }

    /// Runs `batch` and returns one checkpoint per task in input order.
    ///
    /// `params` defaults to the configured parameters and `initial_metrics` to a
    /// fresh probe sample; the latter only drives the initial selection.
    ///
    /// # Errors
    /// Returns an error for invalid parameters or an empty registry, or the
    /// executor error that remained after the fallback budget was spent.
    pub async fn execute_with_strategy(
        &mut self,
        batch: &BatchDescriptor,
        session: &Session,
        branch: Arc<dyn Branch>,
        params: Option<StrategyParams>,
        initial_metrics: Option<SystemMetrics>,
    ) -> Result<BatchOutput> {
        let params = params.unwrap_or(self.config.params);
        params.validate()?;

        let span = info_span!(
            "execute_with_strategy",
            session = %session.name,
            batch = %batch.name,
            tasks = batch.len(),
        );
        self.run_controlled(batch, session, branch, params, initial_metrics)
            .instrument(span)
            .await
    }

    async fn run_controlled(
        &mut self,
        batch: &BatchDescriptor,
        session: &Session,
        branch: Arc<dyn Branch>,
        params: StrategyParams,
        initial_metrics: Option<SystemMetrics>,
    ) -> Result<BatchOutput> {
        let metrics = initial_metrics.unwrap_or_else(|| self.probe.sample());
        let mut kind = self
            .config
            .forced_strategy
            .map_or_else(|| self.factory.select_kind(batch, &metrics), Ok)?;
        info!(
            "Executing {} tasks with {kind} strategy via {}",
            batch.len(),
            branch.name()
        );

        let switching = self.config.switching;
        let mut progress = ExecutionProgress::new(batch.len());
        let mut strategies = vec![kind];
        let mut switches = 0;
        let mut fallbacks = 0;

        let outcome = loop {
            if !self.factory.registry().contains(kind) {
                break Err(Error::StrategyNotRegistered(kind));
            }
            let (signals, updates) = RunSignals::new();
            let init = ExecutorInit::new(params, mem::take(&mut progress), Arc::clone(&self.probe))
                .with_signals(signals.clone());
            let mut executor = match self.factory.create(kind, init) {
                Ok(executor) => executor,
                Err(error) => break Err(error),
            };

            let monitor = (switches < switching.max_switches).then(|| SwitchMonitor {
                factory: &self.factory,
                probe: self.probe.as_ref(),
                batch,
                current: kind,
                updates,
                baseline: executor.progress().snapshot().settled(),
                min_observations: switching.min_observations,
            });
            let (status, target) =
                drive(executor.as_mut(), batch, Arc::clone(&branch), &signals, monitor).await;
            progress = executor.into_progress();

            match status {
                Ok(RunStatus::Completed) => break Ok(()),
                Ok(RunStatus::Interrupted) => {
                    let Some((next, trigger)) = target else {
                        break Err(Error::Interrupted);
                    };
                    switches += 1;
                    info!(
                        "Switching from {kind} to {next} on {trigger} ({switches}/{} switches)",
                        switching.max_switches
                    );
                    kind = next;
                    strategies.push(kind);
                }
                Err(failure) => {
                    if kind == StrategyKind::Sequential || switches >= switching.max_switches {
                        error!("{kind} strategy failed with no fallback left: {failure}");
                        break Err(failure);
                    }
                    let reopened = progress.reopen_failed();
                    switches += 1;
                    fallbacks += 1;
                    warn!(
                        "{kind} strategy failed: {failure}; falling back to sequential \
                         with {reopened} failed items reopened"
                    );
                    kind = StrategyKind::Sequential;
                    strategies.push(kind);
                }
            }
        };

        self.collector.record(RunMetrics::from_progress(
            session.id,
            strategies,
            switches,
            fallbacks,
            &progress,
            self.probe.sample(),
            outcome.is_ok(),
        ));
        outcome.map(|()| BatchOutput::collect(batch, &progress))
    }
}

impl Default for ExecutionController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

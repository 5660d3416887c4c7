//! Strategy selection and switch decisions.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use pivot_core::{
    BatchDescriptor, Error, ExecutionProgress, Result, ScoringWeights, StrategyKind,
    StrategyParams, StrategyScore, SwitchConfig, SystemMetrics,
};
use tracing::debug;

use crate::analyzer::ModelAnalyzer;
use crate::executor::{ExecutorConstructor, ExecutorInit, StrategyExecutor};
use crate::metrics::{AggregateMetrics, MetricsProbe, StaticMetrics};
use crate::registry::StrategyRegistry;

/// Condition that made the factory reconsider the running strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTrigger {
    /// Too many settled items failed; only ordered strategies qualify
    HighFailureRate,
    /// The system is loaded; the concurrent strategy is excluded
    HighLoad,
    /// Memory is scarce; only chunked strategies qualify
    HighMemory,
}

impl SwitchTrigger {
    /// Whether `kind` is a candidate under this trigger
    pub const fn admits(self, kind: StrategyKind) -> bool {
        match self {
            Self::HighFailureRate => kind.is_ordered(),
            Self::HighLoad => !matches!(kind, StrategyKind::Concurrent),
            Self::HighMemory => kind.is_chunked(),
        }
    }
}

impl Display for SwitchTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::HighFailureRate => "high failure rate",
            Self::HighLoad => "high system load",
            Self::HighMemory => "high memory usage",
        })
    }
}

/// Outcome of [`StrategyFactory::should_switch_strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    /// Keep the running strategy
    Stay,
    /// Move to another strategy
    Switch {
        /// Strategy to switch to
        target: StrategyKind,
        /// Condition that fired
        trigger: SwitchTrigger,
    },
}

impl SwitchDecision {
    /// Strategy to switch to, if any
    pub const fn target(self) -> Option<StrategyKind> {
        match self {
            Self::Stay => None,
            Self::Switch { target, .. } => Some(target),
        }
    }

    /// Whether a switch was signaled
    pub const fn is_switch(self) -> bool {
        matches!(self, Self::Switch { .. })
    }
}

/// Picks strategies for batches and decides when a running one should change.
pub struct StrategyFactory {
    registry: StrategyRegistry,
    analyzer: ModelAnalyzer,
    weights: ScoringWeights,
    switching: SwitchConfig,
    probe: Arc<dyn MetricsProbe>,
}

impl StrategyFactory {
    /// Creates a factory over `registry` with default weights and thresholds
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            analyzer: ModelAnalyzer::new(),
            weights: ScoringWeights::default(),
            switching: SwitchConfig::default(),
            probe: Arc::new(StaticMetrics::default()),
        }
    }

    /// Sets the scoring weights
    #[must_use]
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the switch thresholds
    #[must_use]
    pub fn with_switching(mut self, switching: SwitchConfig) -> Self {
        self.switching = switching;
        self
    }

    /// Sets the probe handed to executors built by [`Self::select_strategy`]
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn MetricsProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Get the strategy registry
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Registers or replaces the constructor for `kind`
    pub fn register_strategy(&mut self, kind: StrategyKind, constructor: ExecutorConstructor) {
        self.registry.register(kind, constructor);
    }

    /// Scores every registered strategy for `batch`, best first
    pub fn score_strategies(
        &self,
        batch: &BatchDescriptor,
        metrics: &SystemMetrics,
    ) -> Vec<StrategyScore> {
        let analysis = self.analyzer.analyze(batch);
        self.analyzer.compute_strategy_scores(
            &analysis,
            metrics,
            &self.registry.kinds(),
            &self.weights,
        )
    }

    /// Best-scoring registered strategy for `batch`.
    ///
    /// # Errors
    /// Returns [`Error::EmptyRegistry`] if no strategy is registered.
    pub fn select_kind(&self, batch: &BatchDescriptor, metrics: &SystemMetrics) -> Result<StrategyKind> {
        let scores = self.score_strategies(batch, metrics);
        let best = scores.first().ok_or(Error::EmptyRegistry)?;
        debug!(
            "Selected {} strategy for batch '{}' with score {:.3}",
            best.strategy, batch.name, best.score
        );
        Ok(best.strategy)
    }

    /// Builds the best-scoring executor with fresh progress.
    ///
    /// # Errors
    /// Returns [`Error::EmptyRegistry`] if no strategy is registered.
    pub fn select_strategy(
        &self,
        batch: &BatchDescriptor,
        metrics: &SystemMetrics,
        params: StrategyParams,
    ) -> Result<Box<dyn StrategyExecutor>> {
        let kind = self.select_kind(batch, metrics)?;
        let init = ExecutorInit::new(
            params,
            ExecutionProgress::new(batch.len()),
            Arc::clone(&self.probe),
        );
        self.create(kind, init)
    }

    /// Builds the executor for `kind`.
    ///
    /// # Errors
    /// Returns [`Error::StrategyNotRegistered`] if `kind` has no constructor.
    pub fn create(&self, kind: StrategyKind, init: ExecutorInit) -> Result<Box<dyn StrategyExecutor>> {
        self.registry.create(kind, init)
    }

    /// Decides whether the strategy `current` should give way to another.
    ///
    /// Triggers are checked in priority order: failure rate, then load, then
    /// memory. The first that fires restricts the candidates, which are
    /// re-scored under the observed metrics; a switch is signaled only when the
    /// best candidate differs from `current`.
    pub fn should_switch_strategy(
        &self,
        current: StrategyKind,
        batch: &BatchDescriptor,
        observed: &AggregateMetrics,
    ) -> SwitchDecision {
        let trigger = if observed.partial_failure_rate > self.switching.failure_rate_threshold {
            SwitchTrigger::HighFailureRate
        } else if observed.system_load > self.switching.load_threshold {
            SwitchTrigger::HighLoad
        } else if observed.memory_usage > self.switching.memory_threshold {
            SwitchTrigger::HighMemory
        } else {
            return SwitchDecision::Stay;
        };

        let candidates: Vec<StrategyKind> = self
            .registry
            .kinds()
            .into_iter()
            .filter(|&kind| trigger.admits(kind))
            .collect();
        let analysis = self.analyzer.analyze(batch);
        let scores = self.analyzer.compute_strategy_scores(
            &analysis,
            &observed.to_system_metrics(),
            &candidates,
            &self.weights,
        );

        match scores.first() {
            Some(best) if best.strategy != current => {
                debug!(
                    "{trigger} while running {current}, best candidate is {}",
                    best.strategy
                );
                SwitchDecision::Switch {
                    target: best.strategy,
                    trigger,
                }
            }
            _ => SwitchDecision::Stay,
        }
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new(StrategyRegistry::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::constructor;
    use crate::executor::SequentialExecutor;
    use pivot_core::{FieldSpec, RequestShape};

    fn dependent_batch(dependent: usize) -> BatchDescriptor {
        let fields = (0..dependent)
            .map(|index| FieldSpec::new(format!("field_{index}")).depending_on("anchor"))
            .collect();
        BatchDescriptor::new("dependent").with_request_shape(RequestShape::new(fields))
    }

    #[test]
    fn test_high_failure_rate_moves_off_concurrent() {
        let factory = StrategyFactory::default();
        let observed = AggregateMetrics {
            partial_failure_rate: 0.5,
            ..AggregateMetrics::default()
        };
        let decision =
            factory.should_switch_strategy(StrategyKind::Concurrent, &BatchDescriptor::default(), &observed);
        let Some(target) = decision.target() else {
            panic!("expected a switch, got {decision:?}");
        };
        assert!(matches!(target, StrategyKind::Sequential | StrategyKind::Chunked));
        assert!(matches!(
            decision,
            SwitchDecision::Switch {
                trigger: SwitchTrigger::HighFailureRate,
                ..
            }
        ));
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(SwitchTrigger::HighFailureRate.to_string(), "high failure rate");
        assert_eq!(SwitchTrigger::HighLoad.to_string(), "high system load");
        assert_eq!(SwitchTrigger::HighMemory.to_string(), "high memory usage");
    }

    #[test]
    fn test_no_trigger_means_stay() {
        let factory = StrategyFactory::default();
        let observed = AggregateMetrics {
            partial_failure_rate: 0.3,
            system_load: 0.8,
            memory_usage: 0.8,
            ..AggregateMetrics::default()
        };
        let decision =
            factory.should_switch_strategy(StrategyKind::Concurrent, &BatchDescriptor::default(), &observed);
        assert_eq!(decision, SwitchDecision::Stay);
    }

    #[test]
    fn test_high_load_excludes_concurrent() {
        let factory = StrategyFactory::default();
        let observed = AggregateMetrics {
            system_load: 0.95,
            ..AggregateMetrics::default()
        };
        let decision =
            factory.should_switch_strategy(StrategyKind::Concurrent, &BatchDescriptor::default(), &observed);
        assert_eq!(
            decision,
            SwitchDecision::Switch {
                target: StrategyKind::Hybrid,
                trigger: SwitchTrigger::HighLoad,
            }
        );
    }

    #[test]
    fn test_high_memory_restricts_to_chunked_strategies() {
        let factory = StrategyFactory::default();
        let observed = AggregateMetrics {
            memory_usage: 0.9,
            ..AggregateMetrics::default()
        };
        let decision =
            factory.should_switch_strategy(StrategyKind::Sequential, &dependent_batch(10), &observed);
        assert_eq!(
            decision,
            SwitchDecision::Switch {
                target: StrategyKind::Chunked,
                trigger: SwitchTrigger::HighMemory,
            }
        );

        let staying =
            factory.should_switch_strategy(StrategyKind::Chunked, &dependent_batch(10), &observed);
        assert!(!staying.is_switch());
    }

    #[test]
    fn test_empty_candidate_set_means_stay() {
        let mut registry = StrategyRegistry::new();
        registry.register(StrategyKind::Sequential, constructor(SequentialExecutor::new));
        let factory = StrategyFactory::new(registry);
        let observed = AggregateMetrics {
            memory_usage: 0.95,
            ..AggregateMetrics::default()
        };
        let decision =
            factory.should_switch_strategy(StrategyKind::Concurrent, &BatchDescriptor::default(), &observed);
        assert_eq!(decision, SwitchDecision::Stay);
    }

    #[test]
    fn test_dependent_fields_select_ordered_strategy() {
        let factory = StrategyFactory::default();
        let batch = dependent_batch(20);
        let scores = factory.score_strategies(&batch, &SystemMetrics::default());
        let score_of = |kind: StrategyKind| {
            scores
                .iter()
                .find(|score| score.strategy == kind)
                .map_or(f64::NAN, |score| score.score)
        };
        assert!(score_of(StrategyKind::Sequential) > score_of(StrategyKind::Concurrent));
        assert!(score_of(StrategyKind::Chunked) > score_of(StrategyKind::Hybrid));

        match factory.select_strategy(&batch, &SystemMetrics::default(), StrategyParams::default()) {
            Ok(executor) => assert!(executor.kind().is_ordered()),
            Err(error) => panic!("selection failed: {error}"),
        }
    }

    #[test]
    fn test_empty_registry_is_fatal() {
        let factory = StrategyFactory::new(StrategyRegistry::new());
        let result = factory.select_strategy(
            &BatchDescriptor::default(),
            &SystemMetrics::default(),
            StrategyParams::default(),
        );
        assert!(matches!(result, Err(Error::EmptyRegistry)));
    }
}

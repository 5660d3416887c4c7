//! Static batch analysis and strategy scoring.
//!
//! The analyzer turns a batch's request shape into a [`ModelAnalysis`] and
//! scores each candidate strategy from that analysis plus live
//! [`SystemMetrics`]. Scoring is pure: identical inputs give identical scores
//! in identical order.

use std::collections::BTreeMap;

use pivot_core::{
    BatchDescriptor, ModelAnalysis, ScoringWeights, StrategyConstraints, StrategyKind,
    StrategyScore, SystemMetrics,
};

/// Name of the concurrency sub-score.
pub const CONCURRENCY_FACTOR: &str = "concurrencyFactor";
/// Name of the memory sub-score.
pub const MEMORY_FACTOR: &str = "memoryFactor";
/// Name of the performance sub-score.
pub const PERFORMANCE_FACTOR: &str = "performanceFactor";

/// Derives scoring input from batch descriptors and ranks strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelAnalyzer;

impl ModelAnalyzer {
    const VALIDATION_PER_FIELD: f64 = 0.1;
    const SAFETY_PENALTY_PER_DEPENDENT: f64 = 0.1;
    const MEMORY_PER_FIELD: f64 = 0.05;
    const VALIDATION_COST: f64 = 0.05;
    const PARALLEL_MAX_CONCURRENCY: usize = 10;

    /// Create a new analyzer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Analyze the request shape of a batch.
    ///
    /// A batch without a request shape has no fields and is fully safe to run
    /// concurrently.
    pub fn analyze(&self, batch: &BatchDescriptor) -> ModelAnalysis {
        let Some(shape) = batch.request_shape.as_ref() else {
            return ModelAnalysis::default();
        };

        let field_count = shape.fields.len();
        let dependent_fields: Vec<String> = shape
            .fields
            .iter()
            .filter(|field| field.is_dependent())
            .map(|field| field.name.clone())
            .collect();
        let fields = field_count as f64;
        let dependents = dependent_fields.len() as f64;

        ModelAnalysis {
            field_count,
            validation_complexity: fields * Self::VALIDATION_PER_FIELD,
            concurrent_safety: dependents
                .mul_add(-Self::SAFETY_PENALTY_PER_DEPENDENT, 1.0)
                .max(0.0),
            memory_footprint: fields * Self::MEMORY_PER_FIELD,
            dependent_fields,
        }
    }

    /// Score every strategy in `available`, best first.
    ///
    /// Ties keep the order of `available`.
    pub fn compute_strategy_scores(
        &self,
        analysis: &ModelAnalysis,
        metrics: &SystemMetrics,
        available: &[StrategyKind],
        weights: &ScoringWeights,
    ) -> Vec<StrategyScore> {
        let mut scores: Vec<StrategyScore> = available
            .iter()
            .map(|&strategy| Self::score(strategy, analysis, metrics, weights))
            .collect();
        scores.sort_by(|left, right| right.score.total_cmp(&left.score));
        scores
    }

    fn score(
        strategy: StrategyKind,
        analysis: &ModelAnalysis,
        metrics: &SystemMetrics,
        weights: &ScoringWeights,
    ) -> StrategyScore {
        let mut factors = BTreeMap::new();

        if strategy.is_concurrent() {
            factors.insert(
                CONCURRENCY_FACTOR.to_owned(),
                analysis.concurrent_safety * weights.concurrency,
            );
        }

        let headroom = (1.0 - (analysis.memory_footprint + metrics.memory_usage)).max(0.0);
        factors.insert(MEMORY_FACTOR.to_owned(), headroom * weights.memory);

        if strategy.is_ordered() {
            let performance = analysis
                .validation_complexity
                .mul_add(-Self::VALIDATION_COST, 1.0)
                .max(0.0);
            factors.insert(
                PERFORMANCE_FACTOR.to_owned(),
                performance * weights.performance,
            );
        }

        StrategyScore {
            strategy,
            score: factors.values().sum(),
            factors,
            constraints: StrategyConstraints {
                max_concurrency: if strategy.is_concurrent() {
                    Self::PARALLEL_MAX_CONCURRENCY
                } else {
                    1
                },
                supports_partial_failures: strategy.is_chunked(),
            },
        }
    }
}

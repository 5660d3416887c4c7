//! Metrics collection for tracking controlled runs.

use pivot_core::{ExecutionProgress, ProgressSnapshot, StrategyKind, SystemMetrics};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Aggregate view of executed work, used for switch decisions and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Failed share of settled items
    pub partial_failure_rate: f64,
    /// Checkpoints recorded
    pub executed_steps: usize,
    /// System load at the last sample
    pub system_load: f64,
    /// Memory usage at the last sample
    pub memory_usage: f64,
    /// Mean latency per checkpoint in seconds
    pub average_latency: f64,
}

impl AggregateMetrics {
    /// Combines in-flight progress with a live system sample
    pub fn observe(progress: &ProgressSnapshot, system: &SystemMetrics) -> Self {
        Self {
            partial_failure_rate: progress.failure_rate(),
            executed_steps: progress.settled(),
            system_load: system.current_system_load,
            memory_usage: system.memory_usage,
            average_latency: progress.average_latency(),
        }
    }

    /// System metrics equivalent, used when re-scoring strategies
    pub fn to_system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            current_system_load: self.system_load,
            memory_usage: self.memory_usage,
            historical_success_rate: 1.0 - self.partial_failure_rate,
            historical_latency: self.average_latency,
        }
    }
}

/// Metrics for a single controlled run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    /// When the run finished
    pub timestamp: SystemTime,
    /// Session the run was attributed to
    pub session_id: Uuid,
    /// Strategies used, in the order they ran
    pub strategies: Vec<StrategyKind>,
    /// Switches performed, fallbacks included
    pub switches: usize,
    /// Switches that were fallbacks to the sequential strategy
    pub fallbacks: usize,
    /// Tasks in the batch
    pub total_steps: usize,
    /// Items that ended completed
    pub completed_items: usize,
    /// Items that ended failed
    pub failed_items: usize,
    /// Checkpoints recorded, including re-runs of reopened items
    pub executed_steps: usize,
    /// Sum of per-item latencies
    pub total_latency: Duration,
    /// System sample taken when the run finished
    pub system: SystemMetrics,
    /// Whether the run returned output rather than an error
    pub succeeded: bool,
}

impl RunMetrics {
    /// Captures the final state of a run
    pub fn from_progress(
        session_id: Uuid,
        strategies: Vec<StrategyKind>,
        switches: usize,
        fallbacks: usize,
        progress: &ExecutionProgress,
        system: SystemMetrics,
        succeeded: bool,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            session_id,
            strategies,
            switches,
            fallbacks,
            total_steps: progress.total_steps(),
            completed_items: progress.completed_items(),
            failed_items: progress.failed_items(),
            executed_steps: progress.current_step(),
            total_latency: progress.total_latency(),
            system,
            succeeded,
        }
    }

    /// Strategy that was active when the run finished
    pub fn final_strategy(&self) -> Option<StrategyKind> {
        self.strategies.last().copied()
    }
}

/// Totals over every run recorded since the last clear
#[derive(Debug, Clone, Copy, Default)]
struct RunTotals {
    completed: usize,
    failed: usize,
    executed_steps: usize,
    total_latency: Duration,
}

/// Collects run metrics across calls to the controller.
///
/// Only the most recent `history_limit` runs are kept; aggregates still cover
/// every run recorded since the last [`MetricsCollector::clear`].
#[derive(Debug)]
pub struct MetricsCollector {
    runs: VecDeque<RunMetrics>,
    history_limit: usize,
    totals: RunTotals,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_history_limit(Self::DEFAULT_HISTORY_LIMIT)
    }
}

impl MetricsCollector {
    /// Runs kept by [`MetricsCollector::new`]
    pub const DEFAULT_HISTORY_LIMIT: usize = 256;

    /// Creates a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector keeping at most `history_limit` runs (at least one)
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            runs: VecDeque::new(),
            history_limit: history_limit.max(1),
            totals: RunTotals::default(),
        }
    }

    /// Records a run, dropping the oldest one when the history is full
    pub fn record(&mut self, metrics: RunMetrics) {
        self.totals.completed += metrics.completed_items;
        self.totals.failed += metrics.failed_items;
        self.totals.executed_steps += metrics.executed_steps;
        self.totals.total_latency += metrics.total_latency;

        if self.runs.len() == self.history_limit {
            self.runs.pop_front();
        }
        self.runs.push_back(metrics);
    }

    /// Recorded runs still in the history, oldest first
    pub fn runs(&self) -> &VecDeque<RunMetrics> {
        &self.runs
    }

    /// Most recently recorded run
    pub fn last(&self) -> Option<&RunMetrics> {
        self.runs.back()
    }

    /// Aggregate over every run recorded since the last clear.
    ///
    /// Load and memory come from the most recent run's sample.
    pub fn aggregate(&self) -> AggregateMetrics {
        let RunTotals {
            completed,
            failed,
            executed_steps,
            total_latency,
        } = self.totals;
        let system = self.last().map(|run| run.system).unwrap_or_default();

        let settled = completed + failed;
        AggregateMetrics {
            partial_failure_rate: if settled == 0 {
                0.0
            } else {
                failed as f64 / settled as f64
            },
            executed_steps,
            system_load: system.current_system_load,
            memory_usage: system.memory_usage,
            average_latency: if executed_steps == 0 {
                0.0
            } else {
                total_latency.as_secs_f64() / executed_steps as f64
            },
        }
    }

    /// Clears all metrics
    pub fn clear(&mut self) {
        self.runs.clear();
        self.totals = RunTotals::default();
    }

    /// Returns the number of runs in the history
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns whether the collector is empty
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

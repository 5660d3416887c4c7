//! Adaptive execution-strategy engine.
//!
//! Scores the registered execution strategies for a batch, runs the batch with
//! the best one, and keeps watching the run: a strategy that starts failing or
//! that the host can no longer sustain gives way to a better fit, and a failed
//! executor falls back to sequential execution. Results always come back in
//! input order.

/// Batch shape analysis and strategy scoring.
pub mod analyzer;
/// Execution controller with live switching and fallback.
pub mod controller;
/// Strategy executors.
pub mod executor;
/// Strategy selection and switch decisions.
pub mod factory;
/// Run metrics and system metric probes.
pub mod metrics;
/// Strategy registry.
pub mod registry;

pub use analyzer::ModelAnalyzer;
pub use controller::ExecutionController;
pub use executor::{
    BatchOutput, ChunkedExecutor, ConcurrentExecutor, ExecutorConstructor, ExecutorInit,
    HybridExecutor, RunSignals, RunStatus, SequentialExecutor, StrategyExecutor,
};
pub use factory::{StrategyFactory, SwitchDecision, SwitchTrigger};
pub use metrics::{
    AggregateMetrics, HostMetricsProbe, MetricsCollector, MetricsProbe, RunMetrics, StaticMetrics,
};
pub use registry::{StrategyRegistry, constructor};

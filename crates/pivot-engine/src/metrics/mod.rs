//! Metrics collection for executed runs and live system sampling.
//!
//! Probes report the host state used for scoring and switching; the collector
//! accumulates completed runs into the aggregate view exposed by the controller.

/// Run metrics collection
pub mod collector;
/// System metrics probes
pub mod probe;

pub use collector::{AggregateMetrics, MetricsCollector, RunMetrics};
pub use probe::{HostMetricsProbe, MetricsProbe, StaticMetrics};

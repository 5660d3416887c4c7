use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a random task identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Kind of operation a task asks the work primitive to perform.
///
/// The engine carries the tag through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Single instruction
    #[default]
    Instruct,
    /// Structured operation with parsed output
    Operate,
    /// Planning step
    Plan,
    /// Plain conversational exchange
    Communicate,
}

/// Immutable unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    #[serde(default)]
    pub id: TaskId,
    /// Opaque payload handed to the work primitive
    #[serde(default)]
    pub payload: Value,
    /// Advisory dependency on another task (not used for scheduling)
    #[serde(default)]
    pub depends_on: Option<TaskId>,
    /// Operation tag
    #[serde(default)]
    pub operation: OperationKind,
}

impl Task {
    /// Creates an `Instruct` task carrying `payload`.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            id: TaskId::new(),
            payload,
            depends_on: None,
            operation: OperationKind::Instruct,
        }
    }

    /// Sets the operation tag.
    #[must_use]
    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = operation;
        self
    }

    /// Records an advisory dependency.
    #[must_use]
    pub fn with_dependency(mut self, depends_on: TaskId) -> Self {
        self.depends_on = Some(depends_on);
        self
    }
}

/// The closed set of execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// One task at a time, in order
    Sequential,
    /// All tasks at once under a semaphore
    Concurrent,
    /// Contiguous chunks, sequential within a chunk
    Chunked,
    /// Chunks whose members run concurrently
    Hybrid,
}

impl StrategyKind {
    /// Every strategy in default registration order.
    pub const ALL: [Self; 4] = [
        Self::Sequential,
        Self::Concurrent,
        Self::Chunked,
        Self::Hybrid,
    ];

    /// Lowercase name used in configuration and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
            Self::Chunked => "chunked",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether the strategy runs items of a batch at the same time.
    pub const fn is_concurrent(self) -> bool {
        matches!(self, Self::Concurrent | Self::Hybrid)
    }

    /// Whether the strategy runs items one after another.
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Sequential | Self::Chunked)
    }

    /// Whether the strategy groups work into chunks.
    pub const fn is_chunked(self) -> bool {
        matches!(self, Self::Chunked | Self::Hybrid)
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::Config(format!("unknown strategy: {name}")))
    }
}

/// Run configuration passed by value into every executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Maximum operations in flight at once
    pub concurrency_limit: usize,
    /// Tasks per chunk for chunked strategies
    pub chunk_size: usize,
    /// Failed items tolerated before the run aborts
    pub retry_limit: usize,
    /// Bound on each individual work-primitive call, in seconds
    pub timeout_seconds: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            chunk_size: 10,
            retry_limit: 3,
            timeout_seconds: 30.0,
        }
    }
}

impl StrategyParams {
    /// Largest accepted concurrency limit, the permit bound of the engine's limiters
    pub const MAX_CONCURRENCY_LIMIT: usize = usize::MAX >> 3;

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency_limit(mut self, concurrency_limit: usize) -> Self {
        self.concurrency_limit = concurrency_limit;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the retry limit.
    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets the per-call timeout in seconds.
    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout_seconds: f64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Per-call timeout as a [`Duration`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidParams`] when `timeout_seconds` is negative, NaN
    /// or too large for a [`Duration`].
    pub fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|error| {
            Error::InvalidParams(format!(
                "timeout_seconds {} is not a duration: {error}",
                self.timeout_seconds
            ))
        })
    }

    /// Checks that every parameter is in range.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParams`] for a zero or oversized concurrency limit,
    /// a zero chunk size, or a timeout that is not a positive number of seconds
    /// representable as a [`Duration`].
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::InvalidParams(
                "concurrency_limit must be at least 1".to_owned(),
            ));
        }
        if self.concurrency_limit > Self::MAX_CONCURRENCY_LIMIT {
            return Err(Error::InvalidParams(format!(
                "concurrency_limit must be at most {}, got {}",
                Self::MAX_CONCURRENCY_LIMIT,
                self.concurrency_limit
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidParams(
                "chunk_size must be at least 1".to_owned(),
            ));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "timeout_seconds must be positive, got {}",
                self.timeout_seconds
            )));
        }
        self.timeout()?;
        Ok(())
    }
}

/// Live system state used for scoring and switch decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    /// Load as a fraction of capacity (may exceed 1.0)
    pub current_system_load: f64,
    /// Memory in use, 0.0-1.0
    pub memory_usage: f64,
    /// Share of items that succeeded historically, 0.0-1.0
    pub historical_success_rate: f64,
    /// Average latency per item in seconds
    pub historical_latency: f64,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            current_system_load: 0.0,
            memory_usage: 0.0,
            historical_success_rate: 1.0,
            historical_latency: 0.0,
        }
    }
}

impl SystemMetrics {
    /// Sets the system load.
    #[must_use]
    pub fn with_load(mut self, current_system_load: f64) -> Self {
        self.current_system_load = current_system_load;
        self
    }

    /// Sets the memory usage.
    #[must_use]
    pub fn with_memory(mut self, memory_usage: f64) -> Self {
        self.memory_usage = memory_usage;
        self
    }
}

/// Static scoring input derived from a batch descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAnalysis {
    /// Fields on the item request shape
    pub field_count: usize,
    /// Names of fields with cross-field dependencies
    pub dependent_fields: Vec<String>,
    /// Validation cost heuristic
    pub validation_complexity: f64,
    /// How safe the items are to run concurrently, 0.0-1.0
    pub concurrent_safety: f64,
    /// Memory cost heuristic
    pub memory_footprint: f64,
}

impl Default for ModelAnalysis {
    fn default() -> Self {
        Self {
            field_count: 0,
            dependent_fields: Vec::new(),
            validation_complexity: 0.0,
            concurrent_safety: 1.0,
            memory_footprint: 0.0,
        }
    }
}

/// Weights applied to the scoring factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of the concurrency factor
    pub concurrency: f64,
    /// Weight of the memory factor
    pub memory: f64,
    /// Weight of the performance factor
    pub performance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            concurrency: 0.4,
            memory: 0.3,
            performance: 0.3,
        }
    }
}

/// Descriptive limits attached to a score. Not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConstraints {
    /// Concurrency the strategy is expected to use
    pub max_concurrency: usize,
    /// Whether the strategy tolerates partial batch failure
    pub supports_partial_failures: bool,
}

/// Score of one strategy for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    /// Strategy being scored
    pub strategy: StrategyKind,
    /// Sum of the weighted factors
    pub score: f64,
    /// Named sub-scores
    pub factors: BTreeMap<String, f64>,
    /// Metadata limits
    pub constraints: StrategyConstraints,
}

/// Conversation handle a run is attributed to.
///
/// Only used to correlate log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
}

impl Session {
    /// Creates a session with a random identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("default")
    }
}

//! Strategy executors and the contract they share.
//!
//! Every executor records exactly one checkpoint per batch position it runs,
//! aborts with [`Error::RetryLimitExceeded`] once failed items reach the retry
//! limit, and leaves positions that already hold a checkpoint untouched so a
//! switched-to executor resumes where the previous one stopped.

/// Chunked executor
pub mod chunked;
/// Concurrent executor
pub mod concurrent;
/// Hybrid executor
pub mod hybrid;
/// Concurrently running work-primitive calls
pub mod inflight;
/// Sequential executor
pub mod sequential;
/// Stop and progress signals
pub mod signals;

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pivot_core::{
    BatchDescriptor, Branch, Checkpoint, Error, ExecutionProgress, Result, StrategyKind,
    StrategyParams, Task, TaskId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::metrics::MetricsProbe;

pub use chunked::ChunkedExecutor;
pub use concurrent::ConcurrentExecutor;
pub use hybrid::HybridExecutor;
pub use inflight::InFlight;
pub use sequential::SequentialExecutor;
pub use signals::RunSignals;

/// How a call to [`StrategyExecutor::run`] ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every position holds a checkpoint
    Completed,
    /// A stop was requested and in-flight work was finalized
    Interrupted,
}

/// Outcome of one work-primitive call.
#[derive(Debug)]
pub struct Settled {
    /// Batch position of the task
    pub index: usize,
    /// Task that was invoked
    pub task_id: TaskId,
    /// Response or failure
    pub outcome: Result<Value>,
    /// Time spent in the call
    pub latency: Duration,
}

impl Settled {
    /// A call that failed before reaching the work primitive
    pub fn immediate(index: usize, task: &Task, error: Error) -> Self {
        Self {
            index,
            task_id: task.id,
            outcome: Err(error),
            latency: Duration::ZERO,
        }
    }
}

/// Invokes the work primitive for one task, bounded by the per-call timeout.
///
/// A timeout surfaces as [`Error::Timeout`], an ordinary item failure.
pub async fn invoke(
    index: usize,
    task: &Task,
    branch: &dyn Branch,
    params: &StrategyParams,
) -> Settled {
    let limit = match params.timeout() {
        Ok(limit) => limit,
        Err(error) => return Settled::immediate(index, task, error),
    };
    let started = Instant::now();
    let outcome = match timeout(limit, branch.instruct(task, params)).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(Error::Timeout {
            task_id: task.id,
            seconds: params.timeout_seconds,
        }),
    };
    Settled {
        index,
        task_id: task.id,
        outcome,
        latency: started.elapsed(),
    }
}

/// Everything an executor is constructed from.
pub struct ExecutorInit {
    /// Parameters for the run; the executor keeps a private copy
    pub params: StrategyParams,
    /// Progress to resume from, fresh for a new run
    pub progress: ExecutionProgress,
    /// Live system metrics
    pub probe: Arc<dyn MetricsProbe>,
    /// Stop and progress signals for the run segment
    pub signals: RunSignals,
}

impl ExecutorInit {
    /// Creates an init with signals nobody watches
    pub fn new(
        params: StrategyParams,
        progress: ExecutionProgress,
        probe: Arc<dyn MetricsProbe>,
    ) -> Self {
        Self {
            params,
            progress,
            probe,
            signals: RunSignals::detached(),
        }
    }

    /// Replaces the signals
    #[must_use]
    pub fn with_signals(mut self, signals: RunSignals) -> Self {
        self.signals = signals;
        self
    }
}

/// Builds an executor for one strategy.
pub type ExecutorConstructor =
    Arc<dyn Fn(ExecutorInit) -> Box<dyn StrategyExecutor> + Send + Sync>;

/// Contract shared by the four execution strategies.
#[async_trait]
pub trait StrategyExecutor: Send {
    /// Strategy implemented by this executor
    fn kind(&self) -> StrategyKind;

    /// Parameters currently in effect
    fn params(&self) -> &StrategyParams;

    /// Progress recorded so far
    fn progress(&self) -> &ExecutionProgress;

    /// Gives up the executor and hands its progress to the caller
    fn into_progress(self: Box<Self>) -> ExecutionProgress;

    /// Resumes from progress recorded by another executor
    fn load_progress(&mut self, progress: ExecutionProgress);

    /// Sets up concurrency primitives and binds progress to the batch.
    ///
    /// # Errors
    /// Returns an error if carried progress does not match the batch.
    async fn prepare_execution(&mut self, batch: &BatchDescriptor) -> Result<()>;

    /// Runs every position that has no checkpoint yet.
    ///
    /// # Errors
    /// Returns [`Error::RetryLimitExceeded`] when failed items reach the retry
    /// limit, or an error if the run cannot continue.
    async fn run(&mut self, batch: &BatchDescriptor, branch: Arc<dyn Branch>) -> Result<RunStatus>;

    /// Cancels and awaits anything still running, keeping recorded checkpoints.
    ///
    /// # Errors
    /// Returns an error if an in-flight operation panicked.
    async fn finalize_in_flight_operations(&mut self) -> Result<()>;

    /// Releases everything the executor still holds.
    ///
    /// # Errors
    /// Returns an error if in-flight operations cannot be finalized.
    async fn cleanup(&mut self) -> Result<()>;

    /// Prepares, runs and cleans up; cleanup happens on every exit path.
    ///
    /// # Errors
    /// Returns the first error raised by preparation, the run, or cleanup.
    async fn execute(
        &mut self,
        batch: &BatchDescriptor,
        branch: Arc<dyn Branch>,
    ) -> Result<RunStatus> {
        let status = match self.prepare_execution(batch).await {
            Ok(()) => self.run(batch, branch).await,
            Err(error) => Err(error),
        };
        let cleaned = self.cleanup().await;
        match (status, cleaned) {
            (Ok(status), Ok(())) => Ok(status),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), cleaned) => {
                if let Err(cleanup_error) = cleaned {
                    warn!("{} executor cleanup failed: {cleanup_error}", self.kind());
                }
                Err(error)
            }
        }
    }
}

/// Limiter sized to the concurrency limit of validated `params`.
pub(crate) fn limiter_for(params: &StrategyParams) -> Result<Arc<Semaphore>> {
    params.validate()?;
    Ok(Arc::new(Semaphore::new(params.concurrency_limit)))
}

/// State shared by every executor. `params` is the executor's private copy.
pub(crate) struct ExecutorState {
    pub(crate) params: StrategyParams,
    pub(crate) progress: ExecutionProgress,
    pub(crate) probe: Arc<dyn MetricsProbe>,
    pub(crate) signals: RunSignals,
}

impl ExecutorState {
    pub(crate) fn new(init: ExecutorInit) -> Self {
        Self {
            params: init.params,
            progress: init.progress,
            probe: init.probe,
            signals: init.signals,
        }
    }

    pub(crate) fn begin(&mut self, batch: &BatchDescriptor) -> Result<()> {
        self.params.validate()?;
        self.progress.begin(batch.len())?;
        self.signals.publish(self.progress.snapshot());
        Ok(())
    }

    /// Positions of `range` without a checkpoint.
    pub(crate) fn pending_in(&self, range: Range<usize>) -> Vec<usize> {
        range
            .filter(|&index| !self.progress.is_settled(index))
            .collect()
    }

    /// Records a settled call and publishes the new counters.
    ///
    /// Returns the abort error when this failure brings failed items to the
    /// retry limit.
    pub(crate) fn record(&mut self, settled: Settled) -> Result<Option<Error>> {
        let Settled {
            index,
            task_id,
            outcome,
            latency,
        } = settled;

        let breach = match outcome {
            Ok(response) => {
                self.progress
                    .record_completed(index, task_id, response, latency)?;
                debug!("Task {task_id} at position {index} completed in {latency:?}");
                None
            }
            Err(error) => {
                self.progress.record_failed(index, task_id, &error, latency)?;
                warn!("Task at position {index} failed: {error}");
                let failed = self.progress.failed_items();
                let limit = self.params.retry_limit;
                (failed >= limit).then(|| Error::RetryLimitExceeded {
                    limit,
                    failed,
                    source: Box::new(error),
                })
            }
        };
        self.signals.publish(self.progress.snapshot());
        Ok(breach)
    }

    /// Runs `indices` one at a time in the order given.
    ///
    /// The stop flag is checked before each item; the item in progress always
    /// settles.
    pub(crate) async fn run_ordered(
        &mut self,
        indices: &[usize],
        batch: &BatchDescriptor,
        branch: &dyn Branch,
    ) -> Result<RunStatus> {
        for &index in indices {
            if self.signals.stop_requested() {
                return Ok(RunStatus::Interrupted);
            }
            let Some(task) = batch.tasks.get(index) else {
                return Err(Error::CheckpointOutOfRange {
                    index,
                    total: batch.len(),
                });
            };
            let settled = invoke(index, task, branch, &self.params).await;
            if let Some(breach) = self.record(settled)? {
                warn!("{breach}, aborting remaining items");
                return Err(breach);
            }
        }
        Ok(RunStatus::Completed)
    }
}

/// Final per-position report for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Tasks in input order
    pub tasks: Vec<Task>,
    /// One checkpoint per task, in input order
    pub outcomes: Vec<Checkpoint>,
}

impl BatchOutput {
    /// Projects recorded checkpoints back onto the batch order.
    ///
    /// Positions without a checkpoint are skipped, so for a finished run
    /// `outcomes` lines up with `tasks`.
    pub fn collect(batch: &BatchDescriptor, progress: &ExecutionProgress) -> Self {
        Self {
            tasks: batch.tasks.clone(),
            outcomes: progress.checkpoints().iter().flatten().cloned().collect(),
        }
    }

    /// Responses of completed tasks, in input order
    pub fn responses(&self) -> Vec<&Value> {
        self.outcomes.iter().filter_map(Checkpoint::response).collect()
    }

    /// Failed checkpoints, in input order
    pub fn failures(&self) -> Vec<&Checkpoint> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_completed())
            .collect()
    }
}

/// Splits `len` positions into contiguous ranges of `chunk_size`.
///
/// The last range may be shorter. A zero chunk size is treated as one.
pub fn chunk_ranges(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let size = chunk_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

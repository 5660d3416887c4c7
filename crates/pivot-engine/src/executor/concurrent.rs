use std::sync::Arc;

use async_trait::async_trait;
use pivot_core::{
    BatchDescriptor, Branch, Error, ExecutionProgress, Result, StrategyKind, StrategyParams,
};
use tokio::select;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{ExecutorInit, ExecutorState, InFlight, RunStatus, StrategyExecutor, limiter_for};

/// Submits every pending task at once, each call gated by a semaphore permit.
///
/// Calls settle in any order; outcomes land in the checkpoint slot of their
/// batch position. Item failures never short-circuit the run: when failed items
/// reach the retry limit the triggering error is returned after every
/// submission has settled.
pub struct ConcurrentExecutor {
    state: ExecutorState,
    limiter: Arc<Semaphore>,
    in_flight: InFlight,
}

impl ConcurrentExecutor {
    /// Creates a concurrent executor; the limiter is sized when the run is prepared
    pub fn new(init: ExecutorInit) -> Self {
        Self {
            state: ExecutorState::new(init),
            limiter: Arc::new(Semaphore::new(0)),
            in_flight: InFlight::new(),
        }
    }
}

#[async_trait]
impl StrategyExecutor for ConcurrentExecutor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Concurrent
    }

    fn params(&self) -> &StrategyParams {
        &self.state.params
    }

    fn progress(&self) -> &ExecutionProgress {
        &self.state.progress
    }

    fn into_progress(self: Box<Self>) -> ExecutionProgress {
        self.state.progress
    }

    fn load_progress(&mut self, progress: ExecutionProgress) {
        self.state.progress = progress;
    }

    async fn prepare_execution(&mut self, batch: &BatchDescriptor) -> Result<()> {
        self.state.begin(batch)?;
        self.limiter = limiter_for(&self.state.params)?;
        self.in_flight = InFlight::new();
        Ok(())
    }

    async fn run(&mut self, batch: &BatchDescriptor, branch: Arc<dyn Branch>) -> Result<RunStatus> {
        let pending = self.state.progress.pending_indices();
        debug!(
            "Submitting {} items with concurrency limit {}",
            pending.len(),
            self.state.params.concurrency_limit
        );
        for index in pending {
            let Some(task) = batch.tasks.get(index) else {
                return Err(Error::CheckpointOutOfRange {
                    index,
                    total: batch.len(),
                });
            };
            self.in_flight.spawn(
                index,
                task.clone(),
                Arc::clone(&branch),
                self.state.params,
                Some(Arc::clone(&self.limiter)),
            );
        }

        let stop = self.state.signals.stop_token();
        let mut breach: Option<Error> = None;
        loop {
            let next = select! {
                biased;
                () = stop.cancelled() => None,
                settled = self.in_flight.next_settled() => Some(settled),
            };
            let Some(settled) = next else {
                self.finalize_in_flight_operations().await?;
                return breach.map_or(Ok(RunStatus::Interrupted), Err);
            };
            let Some(settled) = settled? else {
                break;
            };
            if let Some(error) = self.state.record(settled)? {
                warn!("{error}, waiting for remaining submissions");
                breach.get_or_insert(error);
            }
        }
        breach.map_or(Ok(RunStatus::Completed), Err)
    }

    async fn finalize_in_flight_operations(&mut self) -> Result<()> {
        let remaining = self.in_flight.len();
        if remaining > 0 {
            debug!("Cancelling {remaining} in-flight operations");
        }
        for settled in self.in_flight.cancel_and_drain().await? {
            if let Some(error) = self.state.record(settled)? {
                debug!("Retry limit reached while finalizing: {error}");
            }
        }
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.finalize_in_flight_operations().await
    }
}

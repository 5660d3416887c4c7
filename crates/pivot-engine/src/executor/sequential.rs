use std::sync::Arc;

use async_trait::async_trait;
use pivot_core::{BatchDescriptor, Branch, ExecutionProgress, Result, StrategyKind, StrategyParams};

use super::{ExecutorInit, ExecutorState, RunStatus, StrategyExecutor};

/// Runs tasks one at a time in batch order.
///
/// Nothing runs in the background, so finalizing is a no-op: a stop takes
/// effect once the current item settles.
pub struct SequentialExecutor {
    state: ExecutorState,
}

impl SequentialExecutor {
    /// Creates a sequential executor
    pub fn new(init: ExecutorInit) -> Self {
        Self {
            state: ExecutorState::new(init),
        }
    }
}

#[async_trait]
impl StrategyExecutor for SequentialExecutor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
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
        self.state.begin(batch)
    }

    async fn run(&mut self, batch: &BatchDescriptor, branch: Arc<dyn Branch>) -> Result<RunStatus> {
        let pending = self.state.progress.pending_indices();
        self.state
            .run_ordered(&pending, batch, branch.as_ref())
            .await
    }

    async fn finalize_in_flight_operations(&mut self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

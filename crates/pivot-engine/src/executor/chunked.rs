use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pivot_core::{BatchDescriptor, Branch, ExecutionProgress, Result, StrategyKind, StrategyParams};
use tokio::time::sleep;
use tracing::debug;

use super::{ExecutorInit, ExecutorState, RunStatus, StrategyExecutor, chunk_ranges};

/// Runs contiguous chunks one after another, items within a chunk in order.
///
/// The retry limit spans the whole run, not a single chunk. Between chunks the
/// executor pauses briefly while memory usage is above
/// [`ChunkedExecutor::MEMORY_PRESSURE_THRESHOLD`].
pub struct ChunkedExecutor {
    state: ExecutorState,
    processed_chunks: Vec<Range<usize>>,
}

impl ChunkedExecutor {
    /// Memory usage above which the executor pauses between chunks
    pub const MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;
    const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(50);

    /// Creates a chunked executor
    pub fn new(init: ExecutorInit) -> Self {
        Self {
            state: ExecutorState::new(init),
            processed_chunks: Vec::new(),
        }
    }

    /// Chunks run to completion by this executor, in order
    pub fn processed_chunks(&self) -> &[Range<usize>] {
        &self.processed_chunks
    }
}

#[async_trait]
impl StrategyExecutor for ChunkedExecutor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chunked
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
        self.processed_chunks.clear();
        self.state.begin(batch)
    }

    async fn run(&mut self, batch: &BatchDescriptor, branch: Arc<dyn Branch>) -> Result<RunStatus> {
        let chunks = chunk_ranges(batch.len(), self.state.params.chunk_size);
        debug!("Running {} items in {} chunks", batch.len(), chunks.len());

        for (position, chunk) in chunks.into_iter().enumerate() {
            if position > 0
                && self.state.probe.sample().memory_usage > Self::MEMORY_PRESSURE_THRESHOLD
            {
                debug!("Memory pressure before chunk {position}, pausing");
                sleep(Self::BACKPRESSURE_PAUSE).await;
            }

            let pending = self.state.pending_in(chunk.clone());
            let status = self
                .state
                .run_ordered(&pending, batch, branch.as_ref())
                .await?;
            if status == RunStatus::Interrupted {
                return Ok(status);
            }
            self.processed_chunks.push(chunk);
        }
        Ok(RunStatus::Completed)
    }

    async fn finalize_in_flight_operations(&mut self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

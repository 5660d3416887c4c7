use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use pivot_core::{
    BatchDescriptor, Branch, Error, ExecutionProgress, Result, StrategyKind, StrategyParams,
};
use tokio::select;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::{
    ExecutorInit, ExecutorState, InFlight, RunStatus, StrategyExecutor, chunk_ranges, limiter_for,
};

/// Chunks waiting for admission and chunks currently running.
///
/// A running chunk holds one limiter permit until its last item settles.
struct ChunkSchedule {
    queued: VecDeque<Vec<usize>>,
    remaining: HashMap<usize, usize>,
    permits: HashMap<usize, OwnedSemaphorePermit>,
    owners: HashMap<usize, usize>,
    admitted: usize,
}

impl ChunkSchedule {
    fn new(chunks: VecDeque<Vec<usize>>) -> Self {
        Self {
            queued: chunks,
            remaining: HashMap::new(),
            permits: HashMap::new(),
            owners: HashMap::new(),
            admitted: 0,
        }
    }

    /// Marks the item at `index` settled; returns whether its chunk finished.
    fn settle(&mut self, index: usize) -> bool {
        let Some(chunk_id) = self.owners.remove(&index) else {
            return false;
        };
        let finished = self.remaining.get_mut(&chunk_id).is_some_and(|remaining| {
            *remaining -= 1;
            *remaining == 0
        });
        if finished {
            self.remaining.remove(&chunk_id);
            self.permits.remove(&chunk_id);
        }
        finished
    }

    fn is_idle(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Runs chunks concurrently, each chunk's items concurrently too.
///
/// The chunk length is `min(chunk_size, max(1, len / concurrency_limit))`, so
/// the number of chunks roughly tracks the concurrency budget. A chunk takes a
/// single limiter permit for all of its items, so up to `concurrency_limit`
/// chunks run side by side. Chunk-level concurrency is what separates this
/// executor from [`ChunkedExecutor`](super::ChunkedExecutor), which runs one
/// chunk at a time. The load check runs each time a chunk settles, while the
/// other admitted chunks keep running. After a chunk finishes under
/// system load above [`HybridExecutor::LOAD_THROTTLE_THRESHOLD`], the executor
/// lowers its private concurrency limit by one (never below one) and rebuilds
/// the limiter for the rest of the run.
pub struct HybridExecutor {
    state: ExecutorState,
    limiter: Arc<Semaphore>,
    in_flight: InFlight,
    throttles: usize,
}

impl HybridExecutor {
    /// System load above which the executor lowers its concurrency limit
    pub const LOAD_THROTTLE_THRESHOLD: f64 = 0.8;

    /// Creates a hybrid executor; the limiter is sized when the run is prepared
    pub fn new(init: ExecutorInit) -> Self {
        Self {
            state: ExecutorState::new(init),
            limiter: Arc::new(Semaphore::new(0)),
            in_flight: InFlight::new(),
            throttles: 0,
        }
    }

    /// Times the concurrency limit was lowered during the run
    pub fn throttles(&self) -> usize {
        self.throttles
    }

    /// Chunk length for a batch of `len` items.
    pub fn chunk_len(&self, len: usize) -> usize {
        let params = &self.state.params;
        params
            .chunk_size
            .min((len / params.concurrency_limit.max(1)).max(1))
    }

    fn admit(
        &mut self,
        schedule: &mut ChunkSchedule,
        batch: &BatchDescriptor,
        branch: &Arc<dyn Branch>,
    ) -> Result<()> {
        while !schedule.queued.is_empty() {
            let Ok(permit) = Arc::clone(&self.limiter).try_acquire_owned() else {
                break;
            };
            let Some(members) = schedule.queued.pop_front() else {
                break;
            };
            let chunk_id = schedule.admitted;
            schedule.admitted += 1;

            for &index in &members {
                let Some(task) = batch.tasks.get(index) else {
                    return Err(Error::CheckpointOutOfRange {
                        index,
                        total: batch.len(),
                    });
                };
                schedule.owners.insert(index, chunk_id);
                self.in_flight.spawn(
                    index,
                    task.clone(),
                    Arc::clone(branch),
                    self.state.params,
                    None,
                );
            }
            debug!("Admitted chunk {chunk_id} with {} items", members.len());
            schedule.remaining.insert(chunk_id, members.len());
            schedule.permits.insert(chunk_id, permit);
        }
        Ok(())
    }

    /// Lowers the concurrency limit by one when the system is loaded.
    ///
    /// Running chunks move their permits onto the rebuilt limiter, so they keep
    /// counting against the lowered limit.
    fn throttle_if_loaded(&mut self, schedule: &mut ChunkSchedule) {
        let load = self.state.probe.sample().current_system_load;
        if load <= Self::LOAD_THROTTLE_THRESHOLD || self.state.params.concurrency_limit <= 1 {
            return;
        }

        self.state.params.concurrency_limit -= 1;
        let limit = self.state.params.concurrency_limit;
        self.limiter = Arc::new(Semaphore::new(limit));
        for held in schedule.permits.values_mut() {
            let Ok(permit) = Arc::clone(&self.limiter).try_acquire_owned() else {
                break;
            };
            *held = permit;
        }
        self.throttles += 1;
        info!("System load {load:.2}, lowering hybrid concurrency limit to {limit}");
    }
}

#[async_trait]
impl StrategyExecutor for HybridExecutor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
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
        self.throttles = 0;
        Ok(())
    }

    async fn run(&mut self, batch: &BatchDescriptor, branch: Arc<dyn Branch>) -> Result<RunStatus> {
        let chunk_len = self.chunk_len(batch.len());
        let chunks: VecDeque<Vec<usize>> = chunk_ranges(batch.len(), chunk_len)
            .into_iter()
            .map(|range| self.state.pending_in(range))
            .filter(|pending| !pending.is_empty())
            .collect();
        debug!(
            "Running {} pending chunks of up to {chunk_len} items",
            chunks.len()
        );

        let mut schedule = ChunkSchedule::new(chunks);
        let stop = self.state.signals.stop_token();
        let mut breach: Option<Error> = None;
        loop {
            if stop.is_cancelled() {
                self.finalize_in_flight_operations().await?;
                return breach.map_or(Ok(RunStatus::Interrupted), Err);
            }
            if breach.is_none() {
                self.admit(&mut schedule, batch, &branch)?;
            }
            if schedule.is_idle() {
                break;
            }

            let next = select! {
                biased;
                () = stop.cancelled() => None,
                settled = self.in_flight.next_settled() => Some(settled),
            };
            let Some(settled) = next else {
                continue;
            };
            let Some(settled) = settled? else {
                break;
            };
            let index = settled.index;
            if let Some(error) = self.state.record(settled)? {
                warn!("{error}, waiting for running chunks");
                breach.get_or_insert(error);
            }
            if schedule.settle(index) {
                self.throttle_if_loaded(&mut schedule);
            }
        }
        breach.map_or(Ok(RunStatus::Completed), Err)
    }

    async fn finalize_in_flight_operations(&mut self) -> Result<()> {
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

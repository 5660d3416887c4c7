//! Mutable run state shared by executors and carried across strategy switches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::TaskId;

/// Recorded outcome for the task at one position in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Checkpoint {
    /// The work primitive returned a response
    Completed {
        /// Task at this position
        task_id: TaskId,
        /// Response returned by the work primitive
        response: Value,
    },
    /// The work primitive raised or timed out
    Failed {
        /// Task at this position
        task_id: TaskId,
        /// Rendered error
        error: String,
    },
}

impl Checkpoint {
    /// Task the checkpoint belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Completed { task_id, .. } | Self::Failed { task_id, .. } => *task_id,
        }
    }

    /// Whether the task completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Response for a completed task.
    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Completed { response, .. } => Some(response),
            Self::Failed { .. } => None,
        }
    }

    /// Error for a failed task.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

/// Point-in-time counters published while a run is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Steps in the run
    pub total_steps: usize,
    /// Items completed so far
    pub completed_items: usize,
    /// Items failed so far
    pub failed_items: usize,
    /// Sum of per-item latencies
    pub total_latency: Duration,
}

impl ProgressSnapshot {
    /// Items with a recorded outcome.
    pub fn settled(&self) -> usize {
        self.completed_items + self.failed_items
    }

    /// Failed share of settled items, 0.0 when nothing settled yet.
    pub fn failure_rate(&self) -> f64 {
        let settled = self.settled();
        if settled == 0 {
            0.0
        } else {
            self.failed_items as f64 / settled as f64
        }
    }

    /// Mean latency of settled items in seconds.
    pub fn average_latency(&self) -> f64 {
        let settled = self.settled();
        if settled == 0 {
            0.0
        } else {
            self.total_latency.as_secs_f64() / settled as f64
        }
    }
}

/// Run state: counters plus one checkpoint slot per batch position.
///
/// `completed_items + failed_items` never exceeds `total_steps`; recording a
/// position twice replaces the earlier outcome and its count. The counters are
/// only changed through recording, so they always agree with the slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    current_step: usize,
    total_steps: usize,
    completed_items: usize,
    failed_items: usize,
    #[serde(default)]
    total_latency: Duration,
    checkpoints: Vec<Option<Checkpoint>>,
}

impl ExecutionProgress {
    /// Creates progress for a run of `total_steps` items.
    #[must_use]
    pub fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            checkpoints: vec![None; total_steps],
            ..Self::default()
        }
    }

    /// Checkpoints recorded so far, including replacements
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Steps in the run, fixed once the run starts
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Positions holding a completed checkpoint
    pub fn completed_items(&self) -> usize {
        self.completed_items
    }

    /// Positions holding a failed checkpoint
    pub fn failed_items(&self) -> usize {
        self.failed_items
    }

    /// Sum of per-item latencies
    pub fn total_latency(&self) -> Duration {
        self.total_latency
    }

    /// Binds the progress to a batch of `batch_len` tasks.
    ///
    /// Progress without slots adopts the batch size; carried progress must
    /// already have one slot per task.
    ///
    /// # Errors
    /// Returns [`Error::ProgressMismatch`] when carried progress covers a different number of steps.
    pub fn begin(&mut self, batch_len: usize) -> Result<()> {
        if self.checkpoints.is_empty() {
            *self = Self::new(batch_len);
            return Ok(());
        }
        if self.checkpoints.len() != batch_len {
            return Err(Error::ProgressMismatch {
                expected: self.checkpoints.len(),
                actual: batch_len,
            });
        }
        Ok(())
    }

    /// Records a completed item at `index`.
    ///
    /// # Errors
    /// Returns [`Error::CheckpointOutOfRange`] if `index` is not a position of the run.
    pub fn record_completed(
        &mut self,
        index: usize,
        task_id: TaskId,
        response: Value,
        latency: Duration,
    ) -> Result<()> {
        self.record(index, Checkpoint::Completed { task_id, response }, latency)
    }

    /// Records a failed item at `index`.
    ///
    /// # Errors
    /// Returns [`Error::CheckpointOutOfRange`] if `index` is not a position of the run.
    pub fn record_failed(
        &mut self,
        index: usize,
        task_id: TaskId,
        error: &Error,
        latency: Duration,
    ) -> Result<()> {
        let checkpoint = Checkpoint::Failed {
            task_id,
            error: error.to_string(),
        };
        self.record(index, checkpoint, latency)
    }

    fn record(&mut self, index: usize, checkpoint: Checkpoint, latency: Duration) -> Result<()> {
        let total = self.checkpoints.len();
        let slot = self
            .checkpoints
            .get_mut(index)
            .ok_or(Error::CheckpointOutOfRange { index, total })?;

        match slot.as_ref() {
            Some(Checkpoint::Completed { .. }) => {
                self.completed_items = self.completed_items.saturating_sub(1);
            }
            Some(Checkpoint::Failed { .. }) => {
                self.failed_items = self.failed_items.saturating_sub(1);
            }
            None => {}
        }
        if checkpoint.is_completed() {
            self.completed_items += 1;
        } else {
            self.failed_items += 1;
        }
        *slot = Some(checkpoint);
        self.current_step += 1;
        self.total_latency += latency;
        Ok(())
    }

    /// Checkpoint at `index`, if one was recorded.
    pub fn checkpoint(&self, index: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(index).and_then(Option::as_ref)
    }

    /// All checkpoint slots in batch order.
    pub fn checkpoints(&self) -> &[Option<Checkpoint>] {
        &self.checkpoints
    }

    /// Whether `index` already holds an outcome.
    pub fn is_settled(&self, index: usize) -> bool {
        self.checkpoint(index).is_some()
    }

    /// Positions without an outcome, in batch order.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.checkpoints
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether every position holds an outcome.
    pub fn is_finished(&self) -> bool {
        self.completed_items + self.failed_items == self.total_steps
    }

    /// Clears failed checkpoints so their positions run again.
    ///
    /// Returns the number of positions reopened.
    pub fn reopen_failed(&mut self) -> usize {
        let mut reopened = 0;
        for slot in &mut self.checkpoints {
            if matches!(slot, Some(Checkpoint::Failed { .. })) {
                *slot = None;
                reopened += 1;
            }
        }
        self.failed_items = self.failed_items.saturating_sub(reopened);
        reopened
    }

    /// Counters for publishing while the run is in flight.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_steps: self.total_steps,
            completed_items: self.completed_items,
            failed_items: self.failed_items,
            total_latency: self.total_latency,
        }
    }
}

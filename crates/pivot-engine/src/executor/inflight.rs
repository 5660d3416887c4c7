use std::sync::Arc;

use pivot_core::{Branch, Error, Result, StrategyParams, Task};
use tokio::select;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Settled, invoke};

/// Work-primitive calls running concurrently for one executor.
///
/// Cancellation is cooperative: every call races against a shared token, and
/// a call that observes the token settles as `None` instead of recording.
pub struct InFlight {
    tasks: JoinSet<Option<Settled>>,
    cancel: CancellationToken,
}

impl InFlight {
    /// Creates an empty set with a fresh cancellation token
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the call for the task at `index`.
    ///
    /// With a limiter, the call waits for a permit before invoking the work
    /// primitive and releases it when the call settles.
    pub fn spawn(
        &mut self,
        index: usize,
        task: Task,
        branch: Arc<dyn Branch>,
        params: StrategyParams,
        limiter: Option<Arc<Semaphore>>,
    ) {
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            select! {
                biased;
                () = cancel.cancelled() => None,
                settled = Self::call(index, &task, branch.as_ref(), &params, limiter) => Some(settled),
            }
        });
    }

    async fn call(
        index: usize,
        task: &Task,
        branch: &dyn Branch,
        params: &StrategyParams,
        limiter: Option<Arc<Semaphore>>,
    ) -> Settled {
        let permit = match limiter {
            Some(limiter) => match limiter.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(error) => {
                    return Settled::immediate(
                        index,
                        task,
                        Error::LimiterClosed(error.to_string()),
                    );
                }
            },
            None => None,
        };
        let settled = invoke(index, task, branch, params).await;
        drop(permit);
        settled
    }

    /// Number of calls not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every call has been joined
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next call to settle.
    ///
    /// Returns `Ok(None)` once nothing is left in flight.
    ///
    /// # Errors
    /// Returns [`Error::Join`] if a call panicked.
    pub async fn next_settled(&mut self) -> Result<Option<Settled>> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Some(settled)) => return Ok(Some(settled)),
                Ok(None) => {}
                Err(error) => return Err(Error::Join(error.to_string())),
            }
        }
        Ok(None)
    }

    /// Cancels every outstanding call and waits for all of them.
    ///
    /// Calls that settled before observing the cancellation are returned so
    /// their outcomes can still be recorded.
    ///
    /// # Errors
    /// Returns [`Error::Join`] if a call panicked; the remaining calls are
    /// still awaited first.
    pub async fn cancel_and_drain(&mut self) -> Result<Vec<Settled>> {
        self.cancel.cancel();
        let mut settled = Vec::new();
        let mut join_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => settled.push(outcome),
                Ok(None) => {}
                Err(error) => {
                    warn!("In-flight operation failed while draining: {error}");
                    join_error.get_or_insert(Error::Join(error.to_string()));
                }
            }
        }
        join_error.map_or(Ok(settled), Err)
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

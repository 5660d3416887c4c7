use async_trait::async_trait;
use serde_json::Value;

use crate::{Result, StrategyParams, Task};

/// The external work primitive that performs one task.
///
/// Executors treat it as opaque: one call per attempt, bounded by
/// [`StrategyParams::timeout_seconds`]. Implementations must be cancel-safe,
/// since a strategy switch drops calls that are still in flight.
#[async_trait]
pub trait Branch: Send + Sync {
    /// Returns a name used in logs.
    fn name(&self) -> &str;

    /// Performs `task` and returns its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be performed; the engine records it
    /// as a failed checkpoint for that task.
    async fn instruct(&self, task: &Task, params: &StrategyParams) -> Result<Value>;
}

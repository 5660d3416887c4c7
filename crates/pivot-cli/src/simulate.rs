//! Simulated work primitive for exercising the engine from the command line.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use pivot_core::{Branch, Error, Result, StrategyParams, Task, TaskId};
use serde_json::{Value, json};
use tokio::time::sleep;

/// Echoes each task's payload after a fixed delay.
pub struct SimulatedBranch {
    latency: Duration,
    failing: HashSet<TaskId>,
}

impl SimulatedBranch {
    /// Creates a branch that answers every task after `latency`
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failing: HashSet::new(),
        }
    }

    /// Makes every call for these tasks fail
    #[must_use]
    pub fn failing(mut self, tasks: impl IntoIterator<Item = TaskId>) -> Self {
        self.failing.extend(tasks);
        self
    }
}

#[async_trait]
impl Branch for SimulatedBranch {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn instruct(&self, task: &Task, _params: &StrategyParams) -> Result<Value> {
        sleep(self.latency).await;
        if self.failing.contains(&task.id) {
            return Err(Error::task_failed(task.id, "simulated failure"));
        }
        Ok(json!({
            "task_id": task.id,
            "operation": task.operation,
            "echo": task.payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_payload() {
        let task = Task::new(json!({"instruction": "hello"}));
        let branch = SimulatedBranch::new(Duration::ZERO);
        let response = match branch.instruct(&task, &StrategyParams::default()).await {
            Ok(response) => response,
            Err(error) => panic!("simulated call failed: {error}"),
        };
        assert_eq!(response["echo"]["instruction"], "hello");
        assert_eq!(response["operation"], "instruct");
    }

    #[tokio::test]
    async fn test_failing_tasks() {
        let task = Task::new(json!(null));
        let branch = SimulatedBranch::new(Duration::ZERO).failing([task.id]);
        let result = branch.instruct(&task, &StrategyParams::default()).await;
        assert!(result.is_err_and(|error| error.is_item_failure()));
    }
}

//! Common test utilities and helpers for pivot-engine tests
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use async_trait::async_trait;
use pivot_core::{
    BatchDescriptor, Branch, Error, FieldSpec, RequestShape, Result, StrategyParams, Task,
};
use pivot_engine::BatchOutput;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::{EnvFilter, fmt};

// ----------------------------------------------------------------------------
// Tracing initialization for tests
// ----------------------------------------------------------------------------

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests (idempotent).
/// Honors `RUST_LOG` if set, otherwise defaults to "debug".
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string());
        if fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_err()
        {
            // tracing already initialized in this process
        }
    });
}

// ----------------------------------------------------------------------------
// Batches
// ----------------------------------------------------------------------------

/// Batch of `count` tasks whose payload is `{"index": i}`
pub fn indexed_batch(count: usize) -> BatchDescriptor {
    let tasks = (0..count).map(|index| Task::new(json!({ "index": index }))).collect();
    BatchDescriptor::new(format!("indexed-{count}")).with_tasks(tasks)
}

/// Indexed batch whose request shape declares `dependent` dependent fields
pub fn dependent_batch(count: usize, dependent: usize) -> BatchDescriptor {
    let fields = (0..dependent)
        .map(|index| FieldSpec::new(format!("field_{index}")).depending_on("anchor"))
        .collect();
    indexed_batch(count).with_request_shape(RequestShape::new(fields))
}

/// Payload indices of completed responses, in output order
pub fn response_indices(output: &BatchOutput) -> Vec<usize> {
    output.responses().into_iter().map(payload_index).collect()
}

fn payload_index(value: &Value) -> usize {
    value["index"].as_u64().expect("payload carries an index") as usize
}

// ----------------------------------------------------------------------------
// Scripted work primitive
// ----------------------------------------------------------------------------

/// Decrements the in-flight counter when a call ends or is dropped.
struct InFlightGuard<'counter>(&'counter AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Work primitive driven by a script keyed on the payload index.
///
/// Each call sleeps before answering. With `reverse_order` the delay shrinks
/// as the index grows, so concurrent strategies settle items in reverse.
#[derive(Default)]
pub struct ScriptedBranch {
    total: usize,
    step: Duration,
    reverse_order: bool,
    failing: HashSet<usize>,
    flaky: HashSet<usize>,
    hanging: HashSet<usize>,
    attempts: Mutex<HashMap<usize, usize>>,
    completions: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBranch {
    /// Branch for a batch of `total` items, each call taking `step`
    pub fn new(total: usize, step: Duration) -> Self {
        Self {
            total,
            step,
            ..Self::default()
        }
    }

    /// Makes later indices finish first
    pub fn reversed(mut self) -> Self {
        self.reverse_order = true;
        self
    }

    /// Fails every call for these indices
    pub fn failing(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Fails only the first call for these indices
    pub fn flaky(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.flaky.extend(indices);
        self
    }

    /// Never answers for these indices
    pub fn hanging(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.hanging.extend(indices);
        self
    }

    /// Calls that started for `index`, cancelled ones included
    pub fn attempts(&self, index: usize) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
    }

    /// Indices in the order their calls finished
    pub fn completion_order(&self) -> Vec<usize> {
        self.completions.lock().unwrap().clone()
    }

    /// Finished calls for `index`
    pub fn completions_of(&self, index: usize) -> usize {
        self.completions
            .lock()
            .unwrap()
            .iter()
            .filter(|&&finished| finished == index)
            .count()
    }

    /// Most calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, index: usize) -> Duration {
        if self.reverse_order {
            let rank = self.total.saturating_sub(index).max(1) as u32;
            self.step * rank
        } else {
            self.step
        }
    }
}

#[async_trait]
impl Branch for ScriptedBranch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn instruct(&self, task: &Task, _params: &StrategyParams) -> Result<Value> {
        let index = payload_index(&task.payload);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(index).or_insert(0);
            *entry += 1;
            *entry
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if self.hanging.contains(&index) {
            sleep(Duration::from_secs(3600)).await;
        }
        sleep(self.delay_for(index)).await;
        self.completions.lock().unwrap().push(index);

        if self.failing.contains(&index) || (attempt == 1 && self.flaky.contains(&index)) {
            return Err(Error::task_failed(task.id, format!("scripted failure at {index}")));
        }
        Ok(json!({ "index": index, "attempt": attempt }))
    }
}

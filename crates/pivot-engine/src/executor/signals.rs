use std::sync::Arc;

use pivot_core::ProgressSnapshot;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Channel between a running executor and whoever is watching it.
///
/// The executor publishes a [`ProgressSnapshot`] after every checkpoint and
/// polls the stop flag at its own boundaries. Requesting a stop never aborts
/// work directly; the executor finalizes in-flight operations and returns
/// [`RunStatus::Interrupted`](super::RunStatus::Interrupted).
#[derive(Debug, Clone)]
pub struct RunSignals {
    stop: CancellationToken,
    updates: Arc<watch::Sender<ProgressSnapshot>>,
}

impl RunSignals {
    /// Creates signals plus a receiver for the published snapshots
    pub fn new() -> (Self, watch::Receiver<ProgressSnapshot>) {
        let (sender, receiver) = watch::channel(ProgressSnapshot::default());
        let signals = Self {
            stop: CancellationToken::new(),
            updates: Arc::new(sender),
        };
        (signals, receiver)
    }

    /// Signals nobody is watching
    pub fn detached() -> Self {
        let (signals, _receiver) = Self::new();
        signals
    }

    /// Asks the executor to stop at its next boundary
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Whether a stop was requested
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Token that resolves once a stop is requested
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Publishes the latest progress counters
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        self.updates.send_modify(|current| *current = snapshot);
    }

    /// Subscribes another watcher
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.updates.subscribe()
    }
}

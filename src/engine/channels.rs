// src/engine/channels.rs

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::dag::TaskInstance;
use crate::engine::ExecutorEvent;

/// Worker side of the two channels owned by a scheduler.
///
/// - `work_rx`: ready instances; shared by every worker, each instance is
///   received by exactly one of them.
/// - `result_tx`: `Started` / `Finished` events back to the run loop.
///
/// The work queue closes when the scheduler finishes its run, which is what
/// lets workers exit.
#[derive(Debug, Clone)]
pub struct WorkerChannels {
    pub work_rx: Arc<Mutex<mpsc::UnboundedReceiver<Arc<TaskInstance>>>>,
    pub result_tx: mpsc::UnboundedSender<ExecutorEvent>,
}

impl WorkerChannels {
    /// Wait for the next instance; `None` once the queue is closed and empty.
    pub async fn next_instance(&self) -> Option<Arc<TaskInstance>> {
        let mut rx = self.work_rx.lock().await;
        rx.recv().await
    }

    /// Returns `false` if the run loop is gone.
    pub fn send(&self, event: ExecutorEvent) -> bool {
        self.result_tx.send(event).is_ok()
    }
}

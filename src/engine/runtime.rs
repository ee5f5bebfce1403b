// src/engine/runtime.rs

use tracing::{debug, info, warn};

use crate::dag::Scheduler;
use crate::engine::{CancelSignal, ExecutorEvent, TaskExecutionResult};
use crate::errors::SchedulerError;
use crate::types::Status;

impl Scheduler {
    /// Main run loop.
    ///
    /// - Seeds the work queue with the initial ready set.
    /// - Consumes `Started` / `Finished` events from the workers and feeds
    ///   them into the scheduler's step methods.
    /// - Enqueues whatever each step made ready.
    /// - On cancellation, skips everything still pending and waits for the
    ///   in-flight instances to drain.
    ///
    /// Returns one result per dispatched instance once every instance is
    /// terminal. The work queue is closed on return so workers can exit.
    pub async fn run(
        &mut self,
        mut cancel: CancelSignal,
    ) -> Result<Vec<TaskExecutionResult>, SchedulerError> {
        // Drop our own copy of the worker side so a dead pool is noticed.
        self.worker_channels.take();

        let outcome = self.run_inner(&mut cancel).await;

        // Closing the queue is what lets idle workers exit.
        self.work_tx.take();
        outcome
    }

    async fn run_inner(
        &mut self,
        cancel: &mut CancelSignal,
    ) -> Result<Vec<TaskExecutionResult>, SchedulerError> {
        let step = self.kickstart()?;
        if self.is_finished() {
            info!("no pending instances; nothing to run");
            return Ok(Vec::new());
        }
        self.dispatch(&step.newly_queued);

        let mut results = Vec::new();
        let mut cancelled = false;
        if cancel.is_cancelled() {
            cancelled = true;
            self.cancel_pending();
        }

        while !self.is_finished() {
            tokio::select! {
                // Cancellation is observed before any result that raced with it.
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    let step = self.cancel_pending();
                    warn!(
                        skipped = step.status_changes.len(),
                        "cancellation requested; skipping pending instances"
                    );
                }
                event = self.result_rx.recv() => match event {
                    Some(ExecutorEvent::Started(instance)) => {
                        self.on_started(instance.id());
                    }
                    Some(ExecutorEvent::Finished(result)) => {
                        let step = self.on_finished(&result);
                        results.push(result);
                        if !step.newly_queued.is_empty() {
                            self.dispatch(&step.newly_queued);
                        }
                    }
                    None => {
                        let remaining = self.instance_count() - self.registry.terminal_count();
                        warn!(remaining, "result stream closed before the run finished");
                        return Err(SchedulerError::ResultStreamClosed { remaining });
                    }
                },
            }
        }

        debug!(results = results.len(), "run loop finished");
        info!(
            succeeded = self.instance_count_by_status(Status::Succeeded),
            failed = self.instance_count_by_status(Status::Failed),
            upstream_failed = self.instance_count_by_status(Status::UpstreamFailed),
            skipped = self.instance_count_by_status(Status::Skipped),
            "run finished"
        );
        Ok(results)
    }
}

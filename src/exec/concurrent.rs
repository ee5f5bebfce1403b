// src/exec/concurrent.rs

//! Fixed-size worker pool that executes task instances.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dag::TaskInstance;
use crate::engine::{ExecutorEvent, Observers, TaskExecutionResult, WorkerChannels};
use crate::errors::{AssetdagError, ExecutionError, Result};
use crate::exec::ExecutionContext;
use crate::exec::operator::{Operator, OperatorRegistry};
use crate::exec::retry::RetryPolicy;

/// Pool of `workers` tokio tasks pulling from one shared work queue.
#[derive(Debug, Clone)]
pub struct ConcurrentExecutor {
    registry: Arc<OperatorRegistry>,
    workers: usize,
    observers: Observers,
}

impl ConcurrentExecutor {
    pub fn new(registry: OperatorRegistry, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(AssetdagError::ConfigError(
                "worker count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            registry: Arc::new(registry),
            workers,
            observers: Observers::default(),
        })
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers. Each exits once the work queue is closed.
    pub fn start(&self, channels: WorkerChannels, ctx: ExecutionContext) -> Vec<JoinHandle<()>> {
        let ctx = Arc::new(ctx);
        info!(workers = self.workers, run_id = %ctx.run_id, "starting workers");

        (0..self.workers)
            .map(|worker| {
                let worker = Worker {
                    index: worker,
                    registry: Arc::clone(&self.registry),
                    observers: self.observers.clone(),
                    channels: channels.clone(),
                    ctx: Arc::clone(&ctx),
                };
                tokio::spawn(worker.run())
            })
            .collect()
    }
}

struct Worker {
    index: usize,
    registry: Arc<OperatorRegistry>,
    observers: Observers,
    channels: WorkerChannels,
    ctx: Arc<ExecutionContext>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.index, "worker started");

        while let Some(instance) = self.channels.next_instance().await {
            if !self.channels.send(ExecutorEvent::Started(Arc::clone(&instance))) {
                warn!(worker = self.index, "scheduler gone; worker exiting");
                break;
            }

            let result = self.execute(instance).await;

            if !self.channels.send(ExecutorEvent::Finished(result)) {
                warn!(worker = self.index, "scheduler gone; worker exiting");
                break;
            }
        }

        debug!(worker = self.index, "worker finished (queue closed)");
    }

    /// Run one instance to completion, retrying operator failures.
    async fn execute(&self, instance: Arc<TaskInstance>) -> TaskExecutionResult {
        let started = Instant::now();

        if self.ctx.cancel.is_cancelled() {
            debug!(instance = %instance, "run cancelled; not executing");
            return TaskExecutionResult {
                instance,
                error: Some(ExecutionError::Cancelled),
                duration: started.elapsed(),
                attempts: 0,
            };
        }

        let Some(operator) = self.registry.get(instance.asset_type(), instance.kind()) else {
            let error = ExecutionError::NoOperator {
                asset_type: instance.asset_type().clone(),
                kind: instance.kind(),
            };
            self.observers.on_task_started(&instance);
            self.observers.on_task_ended(&instance, Some(&error), started.elapsed());
            return TaskExecutionResult {
                instance,
                error: Some(error),
                duration: started.elapsed(),
                attempts: 1,
            };
        };

        let policy = RetryPolicy::for_asset(instance.asset(), &instance.pipeline().settings);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            self.observers.on_task_started(&instance);

            let error = self.run_attempt(operator, &instance).await.err();

            self.observers
                .on_task_ended(&instance, error.as_ref(), attempt_started.elapsed());

            let Some(err) = error else {
                return TaskExecutionResult {
                    instance,
                    error: None,
                    duration: started.elapsed(),
                    attempts: attempt,
                };
            };

            if !policy.should_retry(attempt) || !err.is_retryable() || self.ctx.cancel.is_cancelled() {
                return TaskExecutionResult {
                    instance,
                    error: Some(err),
                    duration: started.elapsed(),
                    attempts: attempt,
                };
            }

            warn!(
                instance = %instance,
                attempt,
                max_attempts = policy.max_attempts(),
                error = %err,
                "attempt failed; retrying"
            );

            if !self.wait_before_retry(&policy).await {
                return TaskExecutionResult {
                    instance,
                    error: Some(err),
                    duration: started.elapsed(),
                    attempts: attempt,
                };
            }
        }
    }

    /// One operator call on its own task, so a panic fails the instance
    /// instead of taking the worker down with it.
    async fn run_attempt(
        &self,
        operator: &Arc<dyn Operator>,
        instance: &Arc<TaskInstance>,
    ) -> std::result::Result<(), ExecutionError> {
        let operator = Arc::clone(operator);
        let ctx = Arc::clone(&self.ctx);
        let task_instance = Arc::clone(instance);

        let handle = tokio::spawn(async move { operator.run(&ctx, &task_instance).await });

        match handle.await {
            Ok(outcome) => outcome.map_err(ExecutionError::from),
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "operator task was aborted".to_string()
                };
                error!(instance = %instance, worker = self.index, reason = %reason, "operator panicked");
                Err(ExecutionError::Panicked(reason))
            }
        }
    }

    /// Returns `false` if the run was cancelled while waiting.
    async fn wait_before_retry(&self, policy: &RetryPolicy) -> bool {
        if policy.delay.is_zero() {
            return true;
        }

        let mut cancel = self.ctx.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

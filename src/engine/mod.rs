// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the scheduler's run loop ([`runtime`])
//! - the channels between that loop and the workers ([`channels`])
//! - the cancellation signal threaded through a run ([`cancel`])
//! - observers of status changes and task boundaries ([`observer`])
//!
//! The pure state machine lives in [`crate::dag::Scheduler`]; this module is
//! the async shell around it.

use std::sync::Arc;
use std::time::Duration;

use crate::dag::TaskInstance;
use crate::errors::ExecutionError;
use crate::types::Status;

/// One status transition performed by the scheduler.
#[derive(Debug, Clone)]
pub struct StatusChangeEvent {
    pub instance: Arc<TaskInstance>,
    pub old: Status,
    pub new: Status,
}

/// Outcome of one dispatched instance, reported once when it stops running.
#[derive(Debug)]
pub struct TaskExecutionResult {
    pub instance: Arc<TaskInstance>,
    /// `None` on success; otherwise the error of the last attempt.
    pub error: Option<ExecutionError>,
    /// Wall time across all attempts, including retry delays.
    pub duration: Duration,
    pub attempts: u32,
}

impl TaskExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Messages flowing from workers back to the scheduler loop.
#[derive(Debug)]
pub enum ExecutorEvent {
    /// A worker picked the instance off the work queue.
    Started(Arc<TaskInstance>),
    /// The instance stopped running.
    Finished(TaskExecutionResult),
}

pub mod cancel;
pub mod channels;
pub mod observer;
pub mod runtime;

pub use cancel::{CancelHandle, CancelSignal};
pub use channels::WorkerChannels;
pub use observer::{LogObserver, Observers, ProgressPrinter, RunObserver};

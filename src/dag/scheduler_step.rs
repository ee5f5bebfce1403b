// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::instance::InstanceId;
use crate::engine::StatusChangeEvent;

/// Structured result of a single scheduler step.
///
/// The run loop uses it to know what to enqueue; tests use it to drive the
/// scheduler by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Instances moved to `Queued` by this step, in construction order.
    pub newly_queued: Vec<InstanceId>,
    /// Instances forced to `UpstreamFailed` by this step.
    pub newly_upstream_failed: Vec<InstanceId>,
    /// Every transition this step performed, in order.
    pub status_changes: Vec<StatusChangeEvent>,
    /// Whether every instance is terminal after this step.
    pub run_finished: bool,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.status_changes.is_empty()
    }
}

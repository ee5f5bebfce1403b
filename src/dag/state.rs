// src/dag/state.rs

//! Per-run status bookkeeping for task instances.

use std::time::Instant;

use tracing::{debug, warn};

use crate::dag::instance::InstanceId;
use crate::dag::task_graph::{EdgeKind, TaskGraph};
use crate::types::Status;

/// Status plus the moments it last changed.
#[derive(Debug, Clone, Copy)]
pub struct InstanceState {
    pub status: Status,
    pub queued_at: Option<Instant>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl InstanceState {
    fn new() -> Self {
        Self {
            status: Status::Pending,
            queued_at: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Status of every instance, indexed by [`InstanceId`].
///
/// Owned by the scheduler; workers never touch it.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    states: Vec<InstanceState>,
}

impl StateRegistry {
    /// Every instance starts `Pending`.
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![InstanceState::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn status(&self, id: InstanceId) -> Option<Status> {
        self.states.get(id).map(|s| s.status)
    }

    pub fn state(&self, id: InstanceId) -> Option<&InstanceState> {
        self.states.get(id)
    }

    /// Unconditional write used by pre-run marking.
    ///
    /// Returns the previous status, or `None` for an unknown id.
    pub fn set(&mut self, id: InstanceId, status: Status) -> Option<Status> {
        let state = self.states.get_mut(id)?;
        let old = state.status;
        state.status = status;
        Some(old)
    }

    /// Checked write used while a run is in progress.
    ///
    /// Returns the previous status when the transition is legal; otherwise
    /// leaves the state untouched and returns `None`.
    pub fn transition(&mut self, id: InstanceId, next: Status) -> Option<Status> {
        let state = self.states.get_mut(id)?;
        let old = state.status;
        if !old.can_transition_to(next) {
            warn!(instance = id, from = %old, to = %next, "rejecting illegal status transition");
            return None;
        }

        let now = Instant::now();
        match next {
            Status::Queued => state.queued_at = Some(now),
            Status::Running => state.started_at = Some(now),
            _ => state.finished_at = Some(now),
        }
        state.status = next;
        Some(old)
    }

    pub fn count(&self, status: Status) -> usize {
        self.states.iter().filter(|s| s.status == status).count()
    }

    pub fn terminal_count(&self) -> usize {
        self.states.iter().filter(|s| s.status.is_terminal()).count()
    }

    pub fn ids_with_status(&self, status: Status) -> impl Iterator<Item = InstanceId> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.status == status)
            .map(|(id, _)| id)
    }
}

/// Readiness and failure-propagation rules applied to a registry.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    registry: &'a mut StateRegistry,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, registry: &'a mut StateRegistry) -> Self {
        Self { graph, registry }
    }

    /// Whether every dependency of `id` lets it start.
    ///
    /// Requirement edges need `Succeeded` or `Skipped`; ordering edges only
    /// need the dependency to be terminal.
    pub fn deps_satisfied(&self, id: InstanceId) -> bool {
        deps_satisfied(self.graph, self.registry, id)
    }

    /// Move every `Pending` candidate whose dependencies are satisfied to
    /// `Queued` and return them in construction order.
    pub fn collect_new_ready(
        &mut self,
        candidates: impl IntoIterator<Item = InstanceId>,
    ) -> Vec<(InstanceId, Status)> {
        let mut ready: Vec<InstanceId> = candidates
            .into_iter()
            .filter(|&id| self.registry.status(id) == Some(Status::Pending))
            .filter(|&id| self.deps_satisfied(id))
            .collect();
        ready.sort_unstable();
        ready.dedup();

        let mut queued = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(old) = self.registry.transition(id, Status::Queued) {
                debug!(instance = %self.human_id(id), "dependencies satisfied; queueing");
                queued.push((id, old));
            }
        }
        queued
    }

    /// Force `UpstreamFailed` on every `Pending` instance reachable from
    /// `failed` through requirement edges.
    ///
    /// The walk only continues through instances it marks, so anything that
    /// already started or finished keeps its status.
    pub fn mark_dependents_upstream_failed(&mut self, failed: InstanceId) -> Vec<InstanceId> {
        let mut stack: Vec<InstanceId> = requiring_dependents(self.graph, failed).collect();
        let mut newly_failed = Vec::new();

        while let Some(id) = stack.pop() {
            if self.registry.status(id) != Some(Status::Pending) {
                continue;
            }
            if self.registry.transition(id, Status::UpstreamFailed).is_some() {
                debug!(
                    instance = %self.human_id(id),
                    cause = %self.human_id(failed),
                    "marking dependent as upstream_failed"
                );
                newly_failed.push(id);
                stack.extend(requiring_dependents(self.graph, id));
            }
        }

        newly_failed.sort_unstable();
        newly_failed
    }

    pub fn all_terminal(&self) -> bool {
        self.registry.terminal_count() == self.registry.len()
    }

    fn human_id(&self, id: InstanceId) -> &str {
        self.graph
            .instance(id)
            .map(|i| i.human_id())
            .unwrap_or("<unknown>")
    }
}

/// Read-only variant used by query methods on the scheduler.
pub(crate) fn deps_satisfied(graph: &TaskGraph, registry: &StateRegistry, id: InstanceId) -> bool {
    graph.dependencies_of(id).iter().all(|edge| {
        let Some(status) = registry.status(edge.instance) else {
            return false;
        };
        match edge.kind {
            EdgeKind::Requires => status.satisfies_dependents(),
            EdgeKind::Ordering => status.is_terminal(),
        }
    })
}

fn requiring_dependents(graph: &TaskGraph, id: InstanceId) -> impl Iterator<Item = InstanceId> + '_ {
    graph
        .dependents_of(id)
        .iter()
        .filter(|e| e.kind == EdgeKind::Requires)
        .map(|e| e.instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_rejects_regressions() {
        let mut registry = StateRegistry::new(1);
        assert_eq!(registry.transition(0, Status::Queued), Some(Status::Pending));
        assert_eq!(registry.transition(0, Status::Pending), None);
        assert_eq!(registry.transition(0, Status::Succeeded), None);
        assert_eq!(registry.transition(0, Status::Running), Some(Status::Queued));
        assert_eq!(registry.transition(0, Status::Failed), Some(Status::Running));
        assert_eq!(registry.status(0), Some(Status::Failed));

        let state = registry.state(0).unwrap();
        assert!(state.queued_at.is_some());
        assert!(state.started_at.is_some());
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn set_overrides_anything() {
        let mut registry = StateRegistry::new(2);
        assert_eq!(registry.set(1, Status::Succeeded), Some(Status::Pending));
        assert_eq!(registry.set(1, Status::Pending), Some(Status::Succeeded));
        assert_eq!(registry.set(5, Status::Pending), None);
        assert_eq!(registry.count(Status::Pending), 2);
    }
}

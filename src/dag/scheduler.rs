// src/dag/scheduler.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::dag::instance::{InstanceId, TaskInstance};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state::{self, StateManager, StateRegistry};
use crate::dag::task_graph::{EdgeKind, TaskGraph};
use crate::engine::{
    ExecutorEvent, Observers, StatusChangeEvent, TaskExecutionResult, WorkerChannels,
};
use crate::errors::{AssetdagError, Result, SchedulerError};
use crate::pipeline::Pipeline;
use crate::types::{AssetType, InstanceKind, Status};

/// Scheduler holds the immutable instance graph plus the per-run status of
/// every instance.
///
/// It is responsible for:
/// - pre-run marking (which instances take part in this run)
/// - deciding when an instance is ready (dependencies satisfied)
/// - advancing statuses as workers report back
/// - forcing `UpstreamFailed` on dependents of failures
///
/// The pure step methods ([`kickstart`](Self::kickstart),
/// [`on_started`](Self::on_started), [`on_finished`](Self::on_finished))
/// hold all the semantics; the async loop in
/// [`run`](Self::run) only moves messages.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    graph: TaskGraph,
    pub(crate) registry: StateRegistry,
    observers: Observers,
    pub(crate) work_tx: Option<mpsc::UnboundedSender<Arc<TaskInstance>>>,
    pub(crate) worker_channels: Option<WorkerChannels>,
    pub(crate) result_rx: mpsc::UnboundedReceiver<ExecutorEvent>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pipeline", &self.pipeline.name())
            .field("instances", &self.graph.len())
            .field("terminal", &self.registry.terminal_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Expand a validated pipeline into task instances, all `Pending`.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let graph = TaskGraph::build(Arc::clone(&pipeline));
        let registry = StateRegistry::new(graph.len());

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        debug!(
            pipeline = %pipeline.name(),
            instances = graph.len(),
            "scheduler: built task graph"
        );

        Self {
            pipeline,
            graph,
            registry,
            observers: Observers::default(),
            work_tx: Some(work_tx),
            worker_channels: Some(WorkerChannels {
                work_rx: Arc::new(Mutex::new(work_rx)),
                result_tx,
            }),
            result_rx,
        }
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Hand out the worker side of the work queue and result stream.
    ///
    /// Only one executor may own them; a second call fails.
    pub fn worker_channels(&mut self) -> std::result::Result<WorkerChannels, SchedulerError> {
        self.worker_channels
            .take()
            .ok_or(SchedulerError::ChannelsTaken)
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    // ---------------------------------------------------------------------
    // Pre-run marking
    // ---------------------------------------------------------------------

    /// Set every instance to `status`.
    pub fn mark_all(&mut self, status: Status) {
        for id in 0..self.registry.len() {
            self.registry.set(id, status);
        }
        debug!(%status, "scheduler: marked all instances");
    }

    /// Set every instance of `asset` to `status`; with `include_downstream`,
    /// every instance of every transitively downstream asset as well.
    pub fn mark_asset(&mut self, asset: &str, status: Status, include_downstream: bool) -> Result<()> {
        if !self.graph.assets().contains(asset) {
            return Err(AssetdagError::AssetNotFound(asset.to_string()));
        }

        let marked = self.mark_asset_instances(asset, status, include_downstream);
        debug!(
            asset,
            %status,
            include_downstream,
            assets = marked,
            "scheduler: marked asset"
        );
        Ok(())
    }

    /// Apply [`mark_asset`](Self::mark_asset) to every asset tagged `tag`.
    ///
    /// Returns how many assets carried the tag.
    pub fn mark_by_tag(&mut self, tag: &str, status: Status, include_downstream: bool) -> usize {
        let tagged: Vec<String> = self
            .pipeline
            .assets
            .iter()
            .filter(|a| a.has_tag(tag))
            .map(|a| a.name.clone())
            .collect();

        for name in tagged.iter() {
            self.mark_asset_instances(name, status, include_downstream);
        }
        debug!(tag, %status, include_downstream, assets = tagged.len(), "scheduler: marked by tag");

        tagged.len()
    }

    /// Set a single check instance, looked up by its id
    /// (`orders:id:not_null`, `orders:custom-check:row_count`).
    pub fn mark_check(&mut self, check_id: &str, status: Status) -> Result<()> {
        let id = self
            .graph
            .instances()
            .iter()
            .find(|i| i.kind().is_check() && i.human_id() == check_id)
            .map(|i| i.id())
            .ok_or_else(|| AssetdagError::CheckNotFound(check_id.to_string()))?;

        self.registry.set(id, status);
        debug!(check = check_id, %status, "scheduler: marked check");
        Ok(())
    }

    /// Every `Pending` instance of `kind` gets `status`.
    ///
    /// Returns how many instances changed.
    pub fn mark_pending_instances_by_kind(&mut self, kind: InstanceKind, status: Status) -> usize {
        let ids: Vec<InstanceId> = self
            .registry
            .ids_with_status(Status::Pending)
            .filter(|&id| self.graph.instances()[id].kind() == kind)
            .collect();

        for &id in ids.iter() {
            self.registry.set(id, status);
        }
        ids.len()
    }

    /// Marks `asset` (and its downstream closure) without checking the name.
    /// Returns how many assets were marked.
    fn mark_asset_instances(&mut self, asset: &str, status: Status, include_downstream: bool) -> usize {
        let assets = if include_downstream {
            self.graph.assets().downstream_closure(asset)
        } else {
            vec![asset.to_string()]
        };

        for name in assets.iter() {
            for &id in self.graph.instances_of(name) {
                self.registry.set(id, status);
            }
        }
        assets.len()
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Whether any `Pending` or `Queued` instance belongs to an asset of
    /// `asset_type`.
    pub fn will_run_task_of_type(&self, asset_type: &AssetType) -> bool {
        self.graph.instances().iter().any(|instance| {
            instance.asset_type() == asset_type
                && matches!(
                    self.registry.status(instance.id()),
                    Some(Status::Pending | Status::Queued)
                )
        })
    }

    /// Distinct asset types used by the pipeline.
    pub fn asset_types(&self) -> BTreeSet<AssetType> {
        self.pipeline
            .assets
            .iter()
            .map(|a| a.asset_type.clone())
            .collect()
    }

    pub fn task_instances(&self) -> &[Arc<TaskInstance>] {
        self.graph.instances()
    }

    pub fn task_instances_by_status(&self, status: Status) -> Vec<Arc<TaskInstance>> {
        self.registry
            .ids_with_status(status)
            .map(|id| Arc::clone(&self.graph.instances()[id]))
            .collect()
    }

    pub fn instance_by_human_id(&self, human_id: &str) -> Option<&Arc<TaskInstance>> {
        self.graph
            .instances()
            .iter()
            .find(|i| i.human_id() == human_id)
    }

    pub fn instance_count(&self) -> usize {
        self.graph.len()
    }

    pub fn instance_count_by_status(&self, status: Status) -> usize {
        self.registry.count(status)
    }

    pub fn status_of(&self, id: InstanceId) -> Option<Status> {
        self.registry.status(id)
    }

    /// Whether the dependencies of `id` currently allow it to start.
    pub fn deps_satisfied(&self, id: InstanceId) -> bool {
        state::deps_satisfied(&self.graph, &self.registry, id)
    }

    /// Every instance is terminal.
    pub fn is_finished(&self) -> bool {
        self.registry.terminal_count() == self.registry.len()
    }

    // ---------------------------------------------------------------------
    // Steps
    // ---------------------------------------------------------------------

    /// Validate the pre-run state and compute the initial ready set.
    ///
    /// - Fails if any instance is already `Queued` or `Running`.
    /// - `Pending` instances that require a `Failed` or `UpstreamFailed`
    ///   instance are forced to `UpstreamFailed` first.
    /// - Every `Pending` instance whose dependencies are satisfied moves to
    ///   `Queued`.
    pub fn kickstart(&mut self) -> std::result::Result<SchedulerStep, SchedulerError> {
        if let Some(instance) = self.graph.instances().iter().find(|i| {
            matches!(
                self.registry.status(i.id()),
                Some(Status::Queued | Status::Running)
            )
        }) {
            let status = self.registry.status(instance.id()).unwrap_or(Status::Queued);
            return Err(SchedulerError::InstanceInFlight(
                instance.human_id().to_string(),
                status,
            ));
        }

        let mut step = SchedulerStep::default();

        let failed_roots: Vec<InstanceId> = (0..self.registry.len())
            .filter(|&id| {
                matches!(
                    self.registry.status(id),
                    Some(Status::Failed | Status::UpstreamFailed)
                )
            })
            .collect();
        for root in failed_roots {
            self.propagate_failure(root, &mut step);
        }

        let pending: Vec<InstanceId> = self.registry.ids_with_status(Status::Pending).collect();
        self.queue_ready(pending, &mut step);

        step.run_finished = self.is_finished();
        info!(
            instances = self.instance_count(),
            pending = self.instance_count_by_status(Status::Pending),
            queued = step.newly_queued.len(),
            "scheduler: kickstarted run"
        );
        Ok(step)
    }

    /// A worker picked up `id`.
    pub fn on_started(&mut self, id: InstanceId) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        self.apply(id, Status::Running, &mut step);
        step.run_finished = self.is_finished();
        step
    }

    /// A worker finished `result.instance`, successfully or not.
    ///
    /// Readiness is re-evaluated among the direct dependents; on failure,
    /// every pending dependent reachable through requirement edges is forced
    /// to `UpstreamFailed` first.
    pub fn on_finished(&mut self, result: &TaskExecutionResult) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let id = result.instance.id();

        // Tolerate a missing Started event.
        if self.registry.status(id) == Some(Status::Queued) {
            self.apply(id, Status::Running, &mut step);
        }

        let next = if result.is_success() {
            Status::Succeeded
        } else {
            Status::Failed
        };

        if !self.apply(id, next, &mut step) {
            warn!(
                instance = %result.instance,
                status = ?self.registry.status(id),
                "finish reported for an instance that is not running; ignoring"
            );
            step.run_finished = self.is_finished();
            return step;
        }

        if next == Status::Failed {
            self.propagate_failure(id, &mut step);
        }

        let mut candidates: Vec<InstanceId> = self
            .graph
            .dependents_of(id)
            .iter()
            .map(|e| e.instance)
            .collect();
        for &failed in step.newly_upstream_failed.iter() {
            candidates.extend(
                self.graph
                    .dependents_of(failed)
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Ordering)
                    .map(|e| e.instance),
            );
        }
        self.queue_ready(candidates, &mut step);

        step.run_finished = self.is_finished();
        step
    }

    /// Cancellation: every `Pending` instance becomes `Skipped`.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let pending: Vec<InstanceId> = self.registry.ids_with_status(Status::Pending).collect();
        for id in pending {
            self.apply(id, Status::Skipped, &mut step);
        }
        step.run_finished = self.is_finished();
        step
    }

    /// Send queued instances to the workers.
    pub(crate) fn dispatch(&self, ids: &[InstanceId]) {
        let Some(tx) = self.work_tx.as_ref() else {
            warn!(count = ids.len(), "work queue already closed; not dispatching");
            return;
        };

        for &id in ids {
            let instance = Arc::clone(&self.graph.instances()[id]);
            debug!(instance = %instance, "dispatching");
            if tx.send(instance).is_err() {
                warn!(instance = id, "no worker is listening on the work queue");
            }
        }
    }

    fn queue_ready(&mut self, candidates: Vec<InstanceId>, step: &mut SchedulerStep) {
        let queued = StateManager::new(&self.graph, &mut self.registry).collect_new_ready(candidates);
        for (id, old) in queued {
            self.record(id, old, Status::Queued, step);
            step.newly_queued.push(id);
        }
    }

    fn propagate_failure(&mut self, failed: InstanceId, step: &mut SchedulerStep) {
        let newly = StateManager::new(&self.graph, &mut self.registry)
            .mark_dependents_upstream_failed(failed);
        for id in newly {
            self.record(id, Status::Pending, Status::UpstreamFailed, step);
            step.newly_upstream_failed.push(id);
        }
    }

    /// Checked transition plus event emission.
    fn apply(&mut self, id: InstanceId, next: Status, step: &mut SchedulerStep) -> bool {
        match self.registry.transition(id, next) {
            Some(old) => {
                self.record(id, old, next, step);
                true
            }
            None => false,
        }
    }

    fn record(&self, id: InstanceId, old: Status, new: Status, step: &mut SchedulerStep) {
        let Some(instance) = self.graph.instance(id) else {
            return;
        };
        let event = StatusChangeEvent {
            instance: Arc::clone(instance),
            old,
            new,
        };
        self.observers.on_status_change(&event);
        step.status_changes.push(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::ExecutionError;
    use crate::pipeline::RawPipelineFile;

    fn scheduler(src: &str) -> Scheduler {
        let raw: RawPipelineFile = toml::from_str(src).unwrap();
        Scheduler::new(Arc::new(Pipeline::try_from(raw).unwrap()))
    }

    fn chain_with_check() -> Scheduler {
        scheduler(
            r#"
[pipeline]
metadata_push = true

[[asset]]
name = "a"
type = "empty"

[[asset.columns]]
name = "id"
checks = [{ name = "not_null" }]

[[asset]]
name = "b"
type = "shell"
depends = ["a"]
"#,
        )
    }

    fn finish(s: &mut Scheduler, human_id: &str, ok: bool) -> SchedulerStep {
        let instance = Arc::clone(s.instance_by_human_id(human_id).unwrap());
        s.on_started(instance.id());
        let result = TaskExecutionResult {
            instance,
            error: if ok {
                None
            } else {
                Some(ExecutionError::Operator(anyhow::anyhow!("boom")))
            },
            duration: Duration::from_millis(1),
            attempts: 1,
        };
        s.on_finished(&result)
    }

    fn human_ids(s: &Scheduler, ids: &[InstanceId]) -> Vec<String> {
        ids.iter()
            .map(|&id| s.task_instances()[id].human_id().to_string())
            .collect()
    }

    #[test]
    fn checks_and_push_wait_for_main() {
        let mut s = chain_with_check();
        let step = s.kickstart().unwrap();
        assert_eq!(human_ids(&s, &step.newly_queued), vec!["a"]);

        let step = finish(&mut s, "a", true);
        assert_eq!(
            human_ids(&s, &step.newly_queued),
            vec!["a:id:not_null", "b"]
        );

        // `b` has no checks, so its push only waits for `b`.
        let step = finish(&mut s, "b", true);
        assert_eq!(human_ids(&s, &step.newly_queued), vec!["b:metadata-push"]);
    }

    #[test]
    fn failed_check_does_not_block_metadata_push() {
        let mut s = chain_with_check();
        s.kickstart().unwrap();
        finish(&mut s, "a", true);

        let step = finish(&mut s, "a:id:not_null", false);
        assert!(step.newly_upstream_failed.is_empty());
        assert_eq!(human_ids(&s, &step.newly_queued), vec!["a:metadata-push"]);
    }

    #[test]
    fn failed_main_fails_everything_downstream() {
        let mut s = chain_with_check();
        s.kickstart().unwrap();

        let step = finish(&mut s, "a", false);
        assert!(step.newly_queued.is_empty());
        assert_eq!(
            human_ids(&s, &step.newly_upstream_failed),
            vec!["a:id:not_null", "a:metadata-push", "b", "b:metadata-push"]
        );
        assert!(step.run_finished);
        assert!(s.is_finished());
    }

    #[test]
    fn kickstart_rejects_in_flight_instances() {
        let mut s = chain_with_check();
        s.kickstart().unwrap();
        let err = s.kickstart().unwrap_err();
        assert!(matches!(err, SchedulerError::InstanceInFlight(ref id, Status::Queued) if id == "a"));
    }

    #[test]
    fn kickstart_propagates_pre_marked_failures() {
        let mut s = chain_with_check();
        s.mark_asset("a", Status::Failed, false).unwrap();
        s.mark_asset("b", Status::Pending, false).unwrap();

        let step = s.kickstart().unwrap();
        assert!(step.newly_queued.is_empty());
        assert_eq!(
            human_ids(&s, &step.newly_upstream_failed),
            vec!["b", "b:metadata-push"]
        );
        assert!(step.run_finished);
    }

    #[test]
    fn mark_asset_with_downstream_and_unknown_asset() {
        let mut s = chain_with_check();
        s.mark_all(Status::Succeeded);
        s.mark_asset("a", Status::Pending, true).unwrap();
        assert_eq!(s.instance_count_by_status(Status::Pending), 5);

        let err = s.mark_asset("nope", Status::Pending, false).unwrap_err();
        assert!(matches!(err, AssetdagError::AssetNotFound(ref n) if n == "nope"));
    }

    #[test]
    fn only_filter_and_type_queries() {
        let mut s = chain_with_check();
        let changed = s.mark_pending_instances_by_kind(InstanceKind::MetadataPush, Status::Skipped);
        assert_eq!(changed, 2);
        assert!(s.will_run_task_of_type(&AssetType::from("shell")));

        s.mark_asset("b", Status::Skipped, false).unwrap();
        assert!(!s.will_run_task_of_type(&AssetType::from("shell")));
        assert!(s.will_run_task_of_type(&AssetType::from("empty")));
        assert_eq!(s.asset_types().len(), 2);
    }

    #[test]
    fn mark_check_targets_one_check_instance() {
        let mut s = chain_with_check();
        s.mark_all(Status::Succeeded);
        s.mark_check("a:id:not_null", Status::Pending).unwrap();

        assert_eq!(s.instance_count_by_status(Status::Pending), 1);
        let step = s.kickstart().unwrap();
        assert_eq!(human_ids(&s, &step.newly_queued), vec!["a:id:not_null"]);

        // Main instances and unknown ids are not checks.
        assert!(matches!(
            s.mark_check("a", Status::Pending),
            Err(AssetdagError::CheckNotFound(ref id)) if id == "a"
        ));
        assert!(s.mark_check("a:id:unique", Status::Pending).is_err());
    }

    #[test]
    fn mark_by_tag_counts_tagged_assets() {
        let mut s = scheduler(
            r#"
[[asset]]
name = "a"
type = "empty"
tags = ["core"]

[[asset]]
name = "b"
type = "empty"
depends = ["a"]

[[asset]]
name = "c"
type = "empty"
tags = ["core"]
"#,
        );
        s.mark_all(Status::Succeeded);

        assert_eq!(s.mark_by_tag("nightly", Status::Pending, true), 0);
        assert_eq!(s.instance_count_by_status(Status::Pending), 0);

        assert_eq!(s.mark_by_tag("core", Status::Pending, true), 2);
        assert_eq!(s.instance_count_by_status(Status::Pending), 3);
    }

    #[test]
    fn cancel_pending_skips_everything_not_started() {
        let mut s = chain_with_check();
        s.kickstart().unwrap();
        let step = s.cancel_pending();
        assert_eq!(step.status_changes.len(), 4);
        assert!(step.status_changes.iter().all(|e| e.new == Status::Skipped));
        assert_eq!(s.status_of(0), Some(Status::Queued));
        assert!(!s.is_finished());
    }

    #[test]
    fn worker_channels_are_handed_out_once() {
        let mut s = chain_with_check();
        assert!(s.worker_channels().is_ok());
        assert!(matches!(
            s.worker_channels(),
            Err(SchedulerError::ChannelsTaken)
        ));
    }
}

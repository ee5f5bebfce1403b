// src/dag/task_graph.rs

//! Expansion of an asset DAG into a DAG of task instances.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dag::graph::AssetGraph;
use crate::dag::instance::{InstanceId, TaskInstance};
use crate::pipeline::Pipeline;
use crate::types::InstanceKind;

/// How a dependency constrains its dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The dependency must be `Succeeded` or `Skipped`; its failure marks the
    /// dependent `UpstreamFailed`.
    Requires,
    /// The dependency only has to be terminal, in any state. Used for
    /// check -> metadata push so a failing check never blocks the push.
    Ordering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub instance: InstanceId,
    pub kind: EdgeKind,
}

/// Immutable instance graph built once per scheduler.
///
/// Edges:
/// - `Main(B)` requires `Main(A)` for every upstream `A` of `B`
/// - every check of `A` requires `Main(A)`
/// - `MetadataPush(A)` requires `Main(A)` and is ordered after every check of `A`
#[derive(Debug)]
pub struct TaskGraph {
    assets: AssetGraph,
    instances: Vec<Arc<TaskInstance>>,
    dependencies: Vec<Vec<Edge>>,
    dependents: Vec<Vec<Edge>>,
    by_asset: HashMap<String, Vec<InstanceId>>,
}

impl TaskGraph {
    pub fn build(pipeline: Arc<Pipeline>) -> Self {
        let assets = AssetGraph::from_pipeline(&pipeline);
        let mut instances: Vec<Arc<TaskInstance>> = Vec::new();
        let mut by_asset: HashMap<String, Vec<InstanceId>> = HashMap::new();

        for asset in pipeline.assets.iter() {
            let mut ids = Vec::new();

            let id = instances.len();
            instances.push(Arc::new(TaskInstance::main(
                id,
                Arc::clone(asset),
                Arc::clone(&pipeline),
            )));
            ids.push(id);

            for column in asset.columns.iter() {
                for check in column.checks.iter() {
                    let id = instances.len();
                    instances.push(Arc::new(TaskInstance::column_check(
                        id,
                        Arc::clone(asset),
                        Arc::clone(&pipeline),
                        &column.name,
                        check.clone(),
                    )));
                    ids.push(id);
                }
            }

            for check in asset.custom_checks.iter() {
                let id = instances.len();
                instances.push(Arc::new(TaskInstance::custom_check(
                    id,
                    Arc::clone(asset),
                    Arc::clone(&pipeline),
                    check.clone(),
                )));
                ids.push(id);
            }

            if pipeline.settings.metadata_push {
                let id = instances.len();
                instances.push(Arc::new(TaskInstance::metadata_push(
                    id,
                    Arc::clone(asset),
                    Arc::clone(&pipeline),
                )));
                ids.push(id);
            }

            by_asset.insert(asset.name.clone(), ids);
        }

        let mut graph = Self {
            assets,
            dependencies: vec![Vec::new(); instances.len()],
            dependents: vec![Vec::new(); instances.len()],
            instances,
            by_asset,
        };
        graph.construct_relationships();
        graph
    }

    fn construct_relationships(&mut self) {
        for idx in 0..self.instances.len() {
            let instance = Arc::clone(&self.instances[idx]);
            let asset_name = instance.asset_name();

            match instance.kind() {
                InstanceKind::Main => {
                    let upstream_mains: Vec<InstanceId> = self
                        .assets
                        .upstream_of(asset_name)
                        .iter()
                        .filter_map(|up| self.main_of(up))
                        .collect();
                    for up in upstream_mains {
                        self.add_edge(up, idx, EdgeKind::Requires);
                    }
                }
                InstanceKind::ColumnCheck | InstanceKind::CustomCheck => {
                    if let Some(main) = self.main_of(asset_name) {
                        self.add_edge(main, idx, EdgeKind::Requires);
                    }
                }
                InstanceKind::MetadataPush => {
                    if let Some(main) = self.main_of(asset_name) {
                        self.add_edge(main, idx, EdgeKind::Requires);
                    }
                    let checks: Vec<InstanceId> = self
                        .instances_of(asset_name)
                        .iter()
                        .copied()
                        .filter(|&id| self.instances[id].kind().is_check())
                        .collect();
                    for check in checks {
                        self.add_edge(check, idx, EdgeKind::Ordering);
                    }
                }
            }
        }

        // Keep readiness re-evaluation in construction order.
        for edges in self.dependents.iter_mut() {
            edges.sort_by_key(|e| e.instance);
        }
        for edges in self.dependencies.iter_mut() {
            edges.sort_by_key(|e| e.instance);
        }
    }

    fn add_edge(&mut self, from: InstanceId, to: InstanceId, kind: EdgeKind) {
        self.dependencies[to].push(Edge { instance: from, kind });
        self.dependents[from].push(Edge { instance: to, kind });
    }

    pub fn assets(&self) -> &AssetGraph {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[Arc<TaskInstance>] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Arc<TaskInstance>> {
        self.instances.get(id)
    }

    /// Instances this one waits for.
    pub fn dependencies_of(&self, id: InstanceId) -> &[Edge] {
        self.dependencies.get(id).map(|e| e.as_slice()).unwrap_or(&[])
    }

    /// Instances waiting for this one.
    pub fn dependents_of(&self, id: InstanceId) -> &[Edge] {
        self.dependents.get(id).map(|e| e.as_slice()).unwrap_or(&[])
    }

    /// All instances of an asset: main first, then checks, then metadata push.
    pub fn instances_of(&self, asset: &str) -> &[InstanceId] {
        self.by_asset.get(asset).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn main_of(&self, asset: &str) -> Option<InstanceId> {
        self.instances_of(asset)
            .iter()
            .copied()
            .find(|&id| self.instances[id].kind() == InstanceKind::Main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RawPipelineFile;

    fn pipeline(src: &str) -> Arc<Pipeline> {
        let raw: RawPipelineFile = toml::from_str(src).unwrap();
        Arc::new(Pipeline::try_from(raw).unwrap())
    }

    #[test]
    fn expands_checks_and_metadata_push_per_asset() {
        let graph = TaskGraph::build(pipeline(
            r#"
[pipeline]
metadata_push = true

[[asset]]
name = "orders"
type = "empty"

[[asset.columns]]
name = "id"
checks = [{ name = "not_null" }, { name = "unique" }]

[[asset.custom_checks]]
name = "Row Count"

[[asset]]
name = "report"
type = "empty"
depends = ["orders"]
"#,
        ));

        let ids: Vec<&str> = graph.instances().iter().map(|i| i.human_id()).collect();
        assert_eq!(
            ids,
            vec![
                "orders",
                "orders:id:not_null",
                "orders:id:unique",
                "orders:custom-check:row_count",
                "orders:metadata-push",
                "report",
                "report:metadata-push",
            ]
        );

        // Checks require the main instance.
        assert_eq!(
            graph.dependencies_of(1),
            &[Edge { instance: 0, kind: EdgeKind::Requires }]
        );

        // Metadata push requires main and is ordered after every check.
        assert_eq!(
            graph.dependencies_of(4),
            &[
                Edge { instance: 0, kind: EdgeKind::Requires },
                Edge { instance: 1, kind: EdgeKind::Ordering },
                Edge { instance: 2, kind: EdgeKind::Ordering },
                Edge { instance: 3, kind: EdgeKind::Ordering },
            ]
        );

        // Downstream main depends only on the upstream main.
        assert_eq!(
            graph.dependencies_of(5),
            &[Edge { instance: 0, kind: EdgeKind::Requires }]
        );
        assert_eq!(graph.main_of("report"), Some(5));
    }

    #[test]
    fn upstream_declared_later_in_file_is_still_linked() {
        let graph = TaskGraph::build(pipeline(
            r#"
[[asset]]
name = "b"
type = "empty"
depends = ["a"]

[[asset]]
name = "a"
type = "empty"
"#,
        ));

        assert_eq!(
            graph.dependencies_of(0),
            &[Edge { instance: 1, kind: EdgeKind::Requires }]
        );
        assert_eq!(
            graph.dependents_of(1),
            &[Edge { instance: 0, kind: EdgeKind::Requires }]
        );
    }
}

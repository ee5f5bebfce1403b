// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use crate::pipeline::Pipeline;

/// Internal node structure: stores immediate upstreams and downstreams.
#[derive(Debug, Clone)]
struct AssetNode {
    /// Assets listed in this asset's `depends`.
    upstream: Vec<String>,
    /// Assets that list this one in their `depends`.
    downstream: Vec<String>,
}

/// Asset-level DAG keyed by asset name.
///
/// Acyclicity is already guaranteed by pipeline validation; this only keeps
/// adjacency information for marking and diagnostics. Iteration follows
/// pipeline order.
#[derive(Debug, Clone)]
pub struct AssetGraph {
    order: Vec<String>,
    nodes: HashMap<String, AssetNode>,
}

impl AssetGraph {
    /// Build the graph from a validated [`Pipeline`].
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let mut nodes: HashMap<String, AssetNode> = HashMap::new();
        let mut order = Vec::with_capacity(pipeline.assets.len());

        for asset in pipeline.assets.iter() {
            order.push(asset.name.clone());
            nodes.insert(
                asset.name.clone(),
                AssetNode {
                    upstream: asset.depends.clone(),
                    downstream: Vec::new(),
                },
            );
        }

        // Walk in pipeline order so downstream lists are deterministic.
        for asset in pipeline.assets.iter() {
            for dep in asset.depends.iter() {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.downstream.push(asset.name.clone());
                }
            }
        }

        Self { order, nodes }
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn upstream_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.upstream.as_slice())
            .unwrap_or(&[])
    }

    pub fn downstream_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.downstream.as_slice())
            .unwrap_or(&[])
    }

    /// `root` followed by every asset transitively downstream of it, each
    /// listed once, in discovery order.
    pub fn downstream_closure(&self, root: &str) -> Vec<String> {
        let mut stack: Vec<&str> = vec![root];
        let mut visited: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name) {
                continue;
            }
            out.push(name.to_string());

            // Reverse so the first downstream is visited first.
            for next in self.downstream_of(name).iter().rev() {
                stack.push(next.as_str());
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RawPipelineFile;

    fn diamond() -> Pipeline {
        let raw: RawPipelineFile = toml::from_str(
            r#"
[[asset]]
name = "a"
type = "empty"

[[asset]]
name = "b"
type = "empty"
depends = ["a"]

[[asset]]
name = "c"
type = "empty"
depends = ["a"]

[[asset]]
name = "d"
type = "empty"
depends = ["b", "c"]

[[asset]]
name = "e"
type = "empty"
"#,
        )
        .unwrap();
        Pipeline::try_from(raw).unwrap()
    }

    #[test]
    fn downstream_closure_visits_each_asset_once() {
        let graph = AssetGraph::from_pipeline(&diamond());
        assert_eq!(graph.downstream_closure("a"), vec!["a", "b", "d", "c"]);
        assert_eq!(graph.downstream_closure("c"), vec!["c", "d"]);
        assert_eq!(graph.downstream_closure("e"), vec!["e"]);
    }

    #[test]
    fn adjacency_follows_pipeline_order() {
        let graph = AssetGraph::from_pipeline(&diamond());
        assert_eq!(graph.downstream_of("a"), ["b".to_string(), "c".to_string()]);
        assert_eq!(graph.upstream_of("d"), ["b".to_string(), "c".to_string()]);
        assert!(graph.upstream_of("missing").is_empty());
    }
}

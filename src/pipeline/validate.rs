// src/pipeline/validate.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{AssetdagError, Result};
use crate::pipeline::model::{Pipeline, RawPipelineFile};

impl TryFrom<RawPipelineFile> for Pipeline {
    type Error = AssetdagError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(Pipeline::new_unchecked(raw.pipeline, raw.environment, raw.asset))
    }
}

pub fn validate_raw_pipeline(raw: &RawPipelineFile) -> Result<()> {
    ensure_has_assets(raw)?;
    validate_settings(raw)?;
    validate_unique_names(raw)?;
    validate_dependencies(raw)?;
    validate_checks(raw)?;
    validate_dag(raw)?;
    Ok(())
}

fn ensure_has_assets(raw: &RawPipelineFile) -> Result<()> {
    if raw.asset.is_empty() {
        return Err(AssetdagError::ConfigError(
            "pipeline must contain at least one [[asset]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_settings(raw: &RawPipelineFile) -> Result<()> {
    if raw.pipeline.concurrency == Some(0) {
        return Err(AssetdagError::ConfigError(
            "[pipeline].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_unique_names(raw: &RawPipelineFile) -> Result<()> {
    let mut seen = HashSet::new();
    for asset in raw.asset.iter() {
        if asset.name.trim().is_empty() {
            return Err(AssetdagError::ConfigError(
                "asset name must not be empty".to_string(),
            ));
        }
        if !seen.insert(asset.name.as_str()) {
            return Err(AssetdagError::ConfigError(format!(
                "asset '{}' is defined more than once",
                asset.name
            )));
        }
    }
    Ok(())
}

fn validate_dependencies(raw: &RawPipelineFile) -> Result<()> {
    let names: HashSet<&str> = raw.asset.iter().map(|a| a.name.as_str()).collect();

    for asset in raw.asset.iter() {
        for dep in asset.depends.iter() {
            if dep == &asset.name {
                return Err(AssetdagError::ConfigError(format!(
                    "asset '{}' cannot depend on itself in `depends`",
                    asset.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(AssetdagError::ConfigError(format!(
                    "asset '{}' has unknown dependency '{}' in `depends`",
                    asset.name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_checks(raw: &RawPipelineFile) -> Result<()> {
    for asset in raw.asset.iter() {
        let mut columns = HashSet::new();
        for column in asset.columns.iter() {
            if !columns.insert(column.name.as_str()) {
                return Err(AssetdagError::ConfigError(format!(
                    "asset '{}' defines column '{}' more than once",
                    asset.name, column.name
                )));
            }

            let mut seen = HashSet::new();
            for check in column.checks.iter() {
                if !seen.insert(check.name.as_str()) {
                    return Err(AssetdagError::ConfigError(format!(
                        "asset '{}' column '{}' has duplicate check '{}'",
                        asset.name, column.name, check.name
                    )));
                }
            }
        }

        // Custom checks are identified by their slug, so "Row count" and
        // "row_count" collide.
        let mut slugs: HashMap<String, &str> = HashMap::new();
        for check in asset.custom_checks.iter() {
            if let Some(previous) = slugs.insert(check.slug(), check.name.as_str()) {
                let msg = if previous == check.name {
                    format!(
                        "asset '{}' has duplicate custom check '{}'",
                        asset.name, check.name
                    )
                } else {
                    format!(
                        "asset '{}' has custom checks '{}' and '{}' that both resolve to id '{}'",
                        asset.name,
                        previous,
                        check.name,
                        check.slug()
                    )
                };
                return Err(AssetdagError::ConfigError(msg));
            }
        }
    }
    Ok(())
}

fn validate_dag(raw: &RawPipelineFile) -> Result<()> {
    // Edge direction: upstream -> asset.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for asset in raw.asset.iter() {
        graph.add_node(asset.name.as_str());
    }

    for asset in raw.asset.iter() {
        for dep in asset.depends.iter() {
            graph.add_edge(dep.as_str(), asset.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(AssetdagError::DagCycle(format!(
                "cycle detected in pipeline involving asset '{}'",
                node
            )))
        }
    }
}

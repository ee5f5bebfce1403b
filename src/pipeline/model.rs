// src/pipeline/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::types::AssetType;

/// Pipeline definition as read from a TOML file, before validation.
///
/// ```toml
/// [pipeline]
/// name = "analytics"
/// retries = 1
///
/// [environment.prod]
/// production = true
///
/// [[asset]]
/// name = "raw_orders"
/// type = "shell"
/// cmd = "echo loading"
///
/// [[asset]]
/// name = "orders"
/// type = "shell"
/// cmd = "echo building"
/// depends = ["raw_orders"]
/// ```
///
/// Assets are an array of tables so that file order is pipeline order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Named environments from `[environment.<name>]`.
    #[serde(default)]
    pub environment: BTreeMap<String, EnvironmentSection>,

    #[serde(default)]
    pub asset: Vec<Asset>,
}

/// `[pipeline]` section: pipeline-wide defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Default retry budget for every asset that does not set its own.
    #[serde(default)]
    pub retries: u32,

    /// Default delay between attempts, in seconds.
    #[serde(default)]
    pub retries_delay: u64,

    /// Default worker count when `--workers` is not given.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Informational only; this tool runs once per invocation.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Adds a metadata push instance to every asset.
    #[serde(default)]
    pub metadata_push: bool,
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            retries: 0,
            retries_delay: 0,
            concurrency: None,
            schedule: None,
            metadata_push: false,
        }
    }
}

/// `[environment.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentSection {
    /// Production environments require `--force`.
    #[serde(default)]
    pub production: bool,

    /// Exported to every shell operator as environment variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// `[[asset]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,

    #[serde(rename = "type")]
    pub asset_type: AssetType,

    #[serde(default)]
    pub description: Option<String>,

    /// Command run by the `shell` operator for the main instance.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Names of upstream assets.
    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub custom_checks: Vec<CustomCheck>,

    #[serde(default)]
    pub materialization: Option<Materialization>,

    /// Overrides `pipeline.retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `pipeline.retries_delay`.
    #[serde(default)]
    pub retries_delay: Option<u64>,
}

impl Asset {
    pub fn effective_retries(&self, defaults: &PipelineSection) -> u32 {
        self.retries.unwrap_or(defaults.retries)
    }

    pub fn effective_retries_delay(&self, defaults: &PipelineSection) -> u64 {
        self.retries_delay.unwrap_or(defaults.retries_delay)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,

    #[serde(default, rename = "type")]
    pub data_type: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub checks: Vec<ColumnCheck>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnCheck {
    pub name: String,

    /// Command run by the `shell` operator for this check.
    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomCheck {
    pub name: String,

    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl CustomCheck {
    /// Identifier used in instance ids: `"Row count"` -> `row_count`.
    pub fn slug(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "_")
    }
}

/// How the asset's output is materialized. Interpreted by backend operators
/// only; the scheduler never looks at it.
#[derive(Debug, Clone, Deserialize)]
pub struct Materialization {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub strategy: Option<String>,
}

/// A validated pipeline.
///
/// Can only be obtained through `TryFrom<RawPipelineFile>`, which guarantees
/// unique asset names, known dependencies and an acyclic graph.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub settings: PipelineSection,
    pub environments: BTreeMap<String, EnvironmentSection>,
    pub assets: Vec<Arc<Asset>>,
    /// Directory the pipeline file lives in; shell commands run here.
    pub root_dir: Option<PathBuf>,
}

impl Pipeline {
    pub(crate) fn new_unchecked(
        settings: PipelineSection,
        environments: BTreeMap<String, EnvironmentSection>,
        assets: Vec<Asset>,
    ) -> Self {
        Self {
            settings,
            environments,
            assets: assets.into_iter().map(Arc::new).collect(),
            root_dir: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn asset(&self, name: &str) -> Option<&Arc<Asset>> {
        self.assets.iter().find(|a| a.name == name)
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }
}

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use assetdag::pipeline::{
    Asset, Column, ColumnCheck, CustomCheck, EnvironmentSection, Pipeline, PipelineSection,
    RawPipelineFile,
};
use assetdag::types::AssetType;

/// Builder for `Pipeline` to simplify test setup.
pub struct PipelineBuilder {
    raw: RawPipelineFile,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawPipelineFile {
                pipeline: PipelineSection::default(),
                environment: BTreeMap::new(),
                asset: Vec::new(),
            },
        }
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.raw.asset.push(asset);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.raw.pipeline.name = name.to_string();
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.raw.pipeline.retries = retries;
        self
    }

    pub fn metadata_push(mut self, val: bool) -> Self {
        self.raw.pipeline.metadata_push = val;
        self
    }

    pub fn with_environment(mut self, name: &str, production: bool) -> Self {
        self.raw.environment.insert(
            name.to_string(),
            EnvironmentSection {
                production,
                variables: BTreeMap::new(),
            },
        );
        self
    }

    pub fn raw(self) -> RawPipelineFile {
        self.raw
    }

    pub fn build(self) -> Arc<Pipeline> {
        Arc::new(Pipeline::try_from(self.raw).expect("Failed to build valid pipeline from builder"))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Asset`.
pub struct AssetBuilder {
    asset: Asset,
}

impl AssetBuilder {
    pub fn new(name: &str, asset_type: &str) -> Self {
        Self {
            asset: Asset {
                name: name.to_string(),
                asset_type: AssetType::from(asset_type),
                description: None,
                cmd: None,
                depends: vec![],
                tags: vec![],
                columns: vec![],
                custom_checks: vec![],
                materialization: None,
                retries: None,
                retries_delay: None,
            },
        }
    }

    /// Shorthand for an asset of the `test` type, which the fake operators
    /// are usually registered for.
    pub fn test(name: &str) -> Self {
        Self::new(name, crate::TEST_ASSET_TYPE)
    }

    pub fn depends(mut self, upstream: &str) -> Self {
        self.asset.depends.push(upstream.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.asset.cmd = Some(cmd.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.asset.tags.push(tag.to_string());
        self
    }

    pub fn column_check(mut self, column: &str, check: &str) -> Self {
        let check = ColumnCheck {
            name: check.to_string(),
            cmd: None,
            description: None,
        };
        match self.asset.columns.iter_mut().find(|c| c.name == column) {
            Some(c) => c.checks.push(check),
            None => self.asset.columns.push(Column {
                name: column.to_string(),
                data_type: None,
                description: None,
                checks: vec![check],
            }),
        }
        self
    }

    pub fn custom_check(mut self, name: &str) -> Self {
        self.asset.custom_checks.push(CustomCheck {
            name: name.to_string(),
            cmd: None,
            description: None,
        });
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.asset.retries = Some(retries);
        self
    }

    pub fn retries_delay(mut self, secs: u64) -> Self {
        self.asset.retries_delay = Some(secs);
        self
    }

    pub fn build(self) -> Asset {
        self.asset
    }
}

// src/dag/instance.rs

//! Task instances: one schedulable unit of work per asset phase.

use std::fmt;
use std::sync::Arc;

use crate::pipeline::{Asset, ColumnCheck, CustomCheck, Pipeline};
use crate::types::{AssetType, InstanceKind};

/// Index of an instance inside its [`TaskGraph`](crate::dag::TaskGraph).
pub type InstanceId = usize;

/// The check a check instance runs.
#[derive(Debug, Clone)]
pub enum CheckRef {
    Column { column: String, check: ColumnCheck },
    Custom(CustomCheck),
}

impl CheckRef {
    pub fn name(&self) -> &str {
        match self {
            CheckRef::Column { check, .. } => &check.name,
            CheckRef::Custom(check) => &check.name,
        }
    }

    pub fn cmd(&self) -> Option<&str> {
        match self {
            CheckRef::Column { check, .. } => check.cmd.as_deref(),
            CheckRef::Custom(check) => check.cmd.as_deref(),
        }
    }
}

/// One schedulable unit: an asset paired with an [`InstanceKind`].
///
/// Instances are immutable and shared with workers behind an `Arc`; their
/// status lives in the scheduler's state registry.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    id: InstanceId,
    human_id: String,
    kind: InstanceKind,
    asset: Arc<Asset>,
    pipeline: Arc<Pipeline>,
    check: Option<CheckRef>,
}

impl TaskInstance {
    pub(crate) fn main(id: InstanceId, asset: Arc<Asset>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id,
            human_id: asset.name.clone(),
            kind: InstanceKind::Main,
            asset,
            pipeline,
            check: None,
        }
    }

    pub(crate) fn column_check(
        id: InstanceId,
        asset: Arc<Asset>,
        pipeline: Arc<Pipeline>,
        column: &str,
        check: ColumnCheck,
    ) -> Self {
        Self {
            id,
            human_id: format!("{}:{}:{}", asset.name, column, check.name),
            kind: InstanceKind::ColumnCheck,
            asset,
            pipeline,
            check: Some(CheckRef::Column {
                column: column.to_string(),
                check,
            }),
        }
    }

    pub(crate) fn custom_check(
        id: InstanceId,
        asset: Arc<Asset>,
        pipeline: Arc<Pipeline>,
        check: CustomCheck,
    ) -> Self {
        Self {
            id,
            human_id: format!("{}:custom-check:{}", asset.name, check.slug()),
            kind: InstanceKind::CustomCheck,
            asset,
            pipeline,
            check: Some(CheckRef::Custom(check)),
        }
    }

    pub(crate) fn metadata_push(id: InstanceId, asset: Arc<Asset>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id,
            human_id: format!("{}:metadata-push", asset.name),
            kind: InstanceKind::MetadataPush,
            asset,
            pipeline,
            check: None,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Stable, readable identifier, e.g. `orders:id:not_null`.
    pub fn human_id(&self) -> &str {
        &self.human_id
    }

    pub fn kind(&self) -> InstanceKind {
        self.kind
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn asset_name(&self) -> &str {
        &self.asset.name
    }

    pub fn asset_type(&self) -> &AssetType {
        &self.asset.asset_type
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn check(&self) -> Option<&CheckRef> {
        self.check.as_ref()
    }

    /// Description suitable for reports.
    pub fn description(&self) -> String {
        match (&self.kind, &self.check) {
            (InstanceKind::ColumnCheck, Some(CheckRef::Column { column, check })) => format!(
                "{} - Column '{}' / Check '{}'",
                self.asset.name, column, check.name
            ),
            (InstanceKind::CustomCheck, Some(check)) => {
                format!("{} - Custom Check '{}'", self.asset.name, check.name())
            }
            (InstanceKind::MetadataPush, _) => format!("{} - Metadata Push", self.asset.name),
            _ => self.asset.name.clone(),
        }
    }
}

impl fmt::Display for TaskInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human_id)
    }
}

// src/exec/defaults.rs

//! Registry of built-in operators for a concrete run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dag::Scheduler;
use crate::exec::builtin::{MetadataPushOperator, NoOpOperator};
use crate::exec::operator::OperatorRegistry;
use crate::exec::shell::ShellOperator;
use crate::types::{AssetType, InstanceKind};

/// Build operators only for asset types that will actually run.
///
/// - `empty`: no-op for every kind
/// - `shell`: subprocess for main and checks
/// - metadata push: logs metadata, for every type that runs
///
/// Types with no built-in operator are left unregistered; their instances
/// fail with "no executor registered".
pub fn build_registry(scheduler: &Scheduler) -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    let noop: Arc<NoOpOperator> = Arc::new(NoOpOperator);
    let shell: Arc<ShellOperator> = Arc::new(ShellOperator);
    let push: Arc<MetadataPushOperator> = Arc::new(MetadataPushOperator);

    for asset_type in scheduler.asset_types() {
        if !scheduler.will_run_task_of_type(&asset_type) {
            debug!(asset_type = %asset_type, "no instance of this type will run; skipping operator setup");
            continue;
        }

        match asset_type.as_str() {
            AssetType::EMPTY => {
                registry.register_all_kinds(asset_type.clone(), noop.clone());
            }
            AssetType::SHELL => {
                for kind in [
                    InstanceKind::Main,
                    InstanceKind::ColumnCheck,
                    InstanceKind::CustomCheck,
                ] {
                    registry.register(asset_type.clone(), kind, shell.clone());
                }
            }
            other => {
                warn!(asset_type = other, "no built-in operator for asset type");
            }
        }

        if asset_type.as_str() != AssetType::EMPTY {
            registry.register(asset_type.clone(), InstanceKind::MetadataPush, push.clone());
        }
    }

    debug!(?registry, "operator registry built");
    registry
}

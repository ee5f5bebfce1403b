// src/exec/builtin.rs

//! Operators that need no external backend.

use tracing::{debug, info};

use crate::dag::TaskInstance;
use crate::exec::ExecutionContext;
use crate::exec::operator::{Operator, OperatorFuture};

/// Succeeds immediately. Registered for the `empty` asset type.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpOperator;

impl Operator for NoOpOperator {
    fn run<'a>(&'a self, _ctx: &'a ExecutionContext, instance: &'a TaskInstance) -> OperatorFuture<'a> {
        Box::pin(async move {
            debug!(instance = %instance, "no-op");
            Ok(())
        })
    }
}

/// Publishes an asset's column metadata.
///
/// There is no catalog backend; the metadata is written to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataPushOperator;

impl Operator for MetadataPushOperator {
    fn run<'a>(&'a self, ctx: &'a ExecutionContext, instance: &'a TaskInstance) -> OperatorFuture<'a> {
        Box::pin(async move {
            let asset = instance.asset();
            info!(
                asset = %asset.name,
                run_id = %ctx.run_id,
                columns = asset.columns.len(),
                description = asset.description.as_deref().unwrap_or(""),
                "pushing asset metadata"
            );

            for column in asset.columns.iter() {
                info!(
                    asset = %asset.name,
                    column = %column.name,
                    data_type = column.data_type.as_deref().unwrap_or("unknown"),
                    checks = column.checks.len(),
                    description = column.description.as_deref().unwrap_or(""),
                    "column metadata"
                );
            }

            Ok(())
        })
    }
}

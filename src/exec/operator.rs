// src/exec/operator.rs

//! Pluggable operator abstraction.
//!
//! The executor talks to an [`Operator`] per `(asset type, instance kind)`
//! instead of knowing about any backend. Production registers the built-in
//! operators from [`defaults`](crate::exec::defaults); tests register fakes
//! that record calls or fail on purpose.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dag::TaskInstance;
use crate::exec::ExecutionContext;
use crate::types::{AssetType, InstanceKind};

pub type OperatorFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Runs one task instance against some backend.
///
/// Implementations should watch `ctx.cancel` when they may block for long.
pub trait Operator: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a ExecutionContext, instance: &'a TaskInstance) -> OperatorFuture<'a>;
}

/// Lookup table `(asset type, instance kind) -> operator`.
///
/// Read-only once handed to the executor.
#[derive(Default, Clone)]
pub struct OperatorRegistry {
    operators: HashMap<(AssetType, InstanceKind), Arc<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset_type: AssetType, kind: InstanceKind, operator: Arc<dyn Operator>) {
        self.operators.insert((asset_type, kind), operator);
    }

    /// Register one operator for every instance kind.
    pub fn register_all_kinds(&mut self, asset_type: AssetType, operator: Arc<dyn Operator>) {
        for kind in InstanceKind::ALL {
            self.register(asset_type.clone(), kind, Arc::clone(&operator));
        }
    }

    pub fn with(
        mut self,
        asset_type: impl Into<AssetType>,
        kind: InstanceKind,
        operator: impl Operator + 'static,
    ) -> Self {
        self.register(asset_type.into(), kind, Arc::new(operator));
        self
    }

    pub fn get(&self, asset_type: &AssetType, kind: InstanceKind) -> Option<&Arc<dyn Operator>> {
        self.operators.get(&(asset_type.clone(), kind))
    }

    pub fn contains(&self, asset_type: &AssetType, kind: InstanceKind) -> bool {
        self.get(asset_type, kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .operators
            .keys()
            .map(|(t, k)| format!("{t}/{k}"))
            .collect();
        keys.sort();
        f.debug_struct("OperatorRegistry")
            .field("operators", &keys)
            .finish()
    }
}

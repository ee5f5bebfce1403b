// src/errors.rs

//! Crate-wide error types.
//!
//! - [`AssetdagError`] covers everything that stops a run before scheduling
//!   starts (pipeline file, validation, run parameters).
//! - [`SchedulerError`] is returned by the run loop itself.
//! - [`ExecutionError`] is what a single task instance failed with.

use thiserror::Error;

use crate::types::{AssetType, InstanceKind};

#[derive(Error, Debug)]
pub enum AssetdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Check not found: {0}")]
    CheckNotFound(String),

    #[error("Cycle detected in pipeline: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by [`Scheduler::run`](crate::dag::Scheduler::run).
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("instance '{0}' is already {1} before the run started")]
    InstanceInFlight(String, crate::types::Status),

    #[error("worker channels were already handed to an executor")]
    ChannelsTaken,

    #[error("result stream closed with {remaining} instance(s) still not finished")]
    ResultStreamClosed { remaining: usize },
}

/// Why a single task instance failed.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("no executor registered for asset type '{asset_type}' and instance kind '{kind}'")]
    NoOperator {
        asset_type: AssetType,
        kind: InstanceKind,
    },

    #[error("run cancelled before the task started")]
    Cancelled,

    #[error("operator panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Operator(#[from] anyhow::Error),
}

impl ExecutionError {
    /// Only plain operator errors are retried; a missing registration, a
    /// cancelled run or a panic are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Operator(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetdagError>;

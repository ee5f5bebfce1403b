// src/exec/mod.rs

//! Execution layer.
//!
//! - [`operator`] defines the `Operator` trait and the registry keyed by
//!   `(asset type, instance kind)`.
//! - [`concurrent`] is the worker pool that pulls ready instances, runs the
//!   matching operator (with retries) and reports back to the scheduler.
//! - [`context`] carries run-wide parameters (run id, dates, environment,
//!   cancellation).
//! - [`retry`] resolves an instance's retry budget.
//! - [`shell`] and [`builtin`] are the operators shipped with the CLI;
//!   [`defaults`] wires them into a registry.

pub mod builtin;
pub mod concurrent;
pub mod context;
pub mod defaults;
pub mod operator;
pub mod retry;
pub mod shell;

pub use builtin::{MetadataPushOperator, NoOpOperator};
pub use concurrent::ConcurrentExecutor;
pub use context::{ExecutionContext, parse_date};
pub use defaults::build_registry;
pub use operator::{Operator, OperatorFuture, OperatorRegistry};
pub use retry::RetryPolicy;
pub use shell::ShellOperator;

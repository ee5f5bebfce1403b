// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the asset-level DAG (upstream/downstream by name).
//! - [`instance`] defines task instances, one per asset phase.
//! - [`task_graph`] expands assets into instances and their dependency edges.
//! - [`state`] keeps per-run statuses and the readiness rules.
//! - [`scheduler`] contains the per-run state machine.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod graph;
pub mod instance;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;
pub mod task_graph;

pub use graph::AssetGraph;
pub use instance::{CheckRef, InstanceId, TaskInstance};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use state::{InstanceState, StateRegistry};
pub use task_graph::{Edge, EdgeKind, TaskGraph};

// src/pipeline/mod.rs

//! Pipeline definitions.
//!
//! - [`model`] is the TOML-backed data model (assets, columns, checks).
//! - [`loader`] reads a pipeline file from disk.
//! - [`validate`] turns a raw file into a [`Pipeline`] that is guaranteed to
//!   be a DAG with unique names and known dependencies.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    Asset, Column, ColumnCheck, CustomCheck, EnvironmentSection, Materialization, Pipeline,
    PipelineSection, RawPipelineFile,
};

// src/pipeline/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;
use crate::pipeline::model::{Pipeline, RawPipelineFile};

/// File name looked up when a directory is given instead of a file.
pub const PIPELINE_FILE_NAME: &str = "pipeline.toml";

/// Load a pipeline file and return the raw, unvalidated definition.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawPipelineFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a pipeline from a file or directory and validate it.
///
/// - Resolves a directory to `<dir>/pipeline.toml`.
/// - Reads TOML, applying serde defaults.
/// - Checks unique names, known dependencies and acyclicity.
/// - Records the containing directory as the pipeline root.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Pipeline> {
    let file = resolve_pipeline_file(path.as_ref());
    debug!(path = %file.display(), "loading pipeline definition");

    let raw = load_from_path(&file)?;
    let pipeline = Pipeline::try_from(raw)?;

    Ok(pipeline.with_root_dir(pipeline_root_dir(&file)))
}

/// `dir` -> `dir/pipeline.toml`; anything else is taken as the file itself.
pub fn resolve_pipeline_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(PIPELINE_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// - "configs/pipeline.toml" -> "configs"
/// - "pipeline.toml" (parent = "") -> current working directory
fn pipeline_root_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

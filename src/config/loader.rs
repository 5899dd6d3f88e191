// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawDagFile;
use crate::config::validate::DagDefinition;
use crate::errors::Result;

/// Read and deserialize a DAG file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawDagFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawDagFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a DAG file and validate it into a [`DagDefinition`].
///
/// All-or-nothing: parse errors, unknown keys, bad durations or an invalid
/// graph fail here, before any run exists.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<DagDefinition> {
    let raw = load_from_path(path)?;
    DagDefinition::try_from(raw)
}

/// `etlgraph.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("etlgraph.toml")
}

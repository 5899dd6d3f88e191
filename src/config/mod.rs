// src/config/mod.rs

//! DAG definition files.
//!
//! - `model.rs`: the TOML-backed raw shape.
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: turning the raw shape into a [`DagDefinition`].
//! - `duration.rs`: `"5m"`-style durations.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{RawDagFile, TaskConfig};
pub use validate::DagDefinition;

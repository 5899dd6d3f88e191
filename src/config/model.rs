// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::state::StorageMode;
use crate::warehouse::LoadMode;

/// Top-level DAG definition as read from a TOML file.
///
/// ```toml
/// [dag]
/// id = "sparkify"
/// schedule = "0 * * * *"
///
/// [default]
/// max_attempts = 3
/// retry_delay = "5m"
///
/// [task.Begin_execution]
/// kind = "noop"
///
/// [task.Load_user_dim_table]
/// kind = "load_dimension"
/// sql = "INSERT INTO users (userid) SELECT DISTINCT userid FROM staging_events"
/// after = ["Begin_execution"]
/// ```
///
/// This is only the raw shape; [`super::validate`] turns it into a
/// [`super::DagDefinition`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDagFile {
    pub dag: DagSection,

    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub warehouse: WarehouseSection,

    /// All tasks from `[task.<id>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[dag]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DagSection {
    pub id: String,

    /// Cron expression; `None` means the DAG is only run manually.
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageMode,

    /// Extra `[upstream, downstream]` pairs on top of each task's `after`.
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".etlgraph")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// `[default]` section: retry settings applied to every task unless the task
/// overrides them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Growth factor for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for exponential backoff delays.
    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub retry_quality_failures: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max() -> String {
    "1h".to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            backoff: BackoffKind::default(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max: default_backoff_max(),
            timeout: None,
            retry_quality_failures: false,
        }
    }
}

/// `[warehouse]` section. Credentials never live in the file; only the name
/// of the environment variable holding the connection string does.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseSection {
    #[serde(default = "default_dsn_env")]
    pub dsn_env: String,
}

fn default_dsn_env() -> String {
    "ETLGRAPH_WAREHOUSE_DSN".to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            dsn_env: default_dsn_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindName {
    Noop,
    CreateTable,
    BulkLoad,
    LoadFact,
    LoadDimension,
    DataQualityCheck,
}

/// `[task.<id>]` section.
///
/// Which of the kind-specific keys are required or allowed depends on
/// `kind`; that is checked during validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub kind: KindName,

    /// This task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    // Kind-specific parameters.
    #[serde(default)]
    pub sql: Option<String>,
    /// LoadDimension only; defaults to true.
    #[serde(default)]
    pub truncate: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub mode: Option<LoadMode>,
    #[serde(default)]
    pub iam_role: Option<String>,
    /// LoadFact only: accept at-least-once retries after ambiguous failures.
    #[serde(default)]
    pub retry_safe: Option<bool>,

    // Overrides for `[default]`.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<String>,
    #[serde(default)]
    pub backoff: Option<BackoffKind>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub retry_quality_failures: Option<bool>,
}

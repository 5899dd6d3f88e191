// src/config/validate.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    BackoffKind, DefaultSection, KindName, RawDagFile, TaskConfig, WarehouseSection,
};
use crate::dag::{Dag, Exponential, RetryPolicy, TaskKind, TaskSpec};
use crate::engine::EngineConfig;
use crate::errors::{EtlError, Result};
use crate::exec::{BulkLoad, CreateTable, DataQualityCheck, LoadDimension, LoadFact, Noop};
use crate::state::{RunStore, StorageMode};
use crate::trigger::CronSchedule;

/// A fully validated DAG definition, ready to hand to the engine.
#[derive(Debug, Clone)]
pub struct DagDefinition {
    pub dag: Arc<Dag>,
    pub engine: EngineConfig,
    pub schedule: Option<CronSchedule>,
    pub state_dir: PathBuf,
    pub storage: StorageMode,
    pub warehouse: WarehouseSection,
}

impl DagDefinition {
    pub fn store(&self) -> RunStore {
        RunStore::for_mode(self.storage, &self.state_dir)
    }

    /// Connection string from the environment variable named in `[warehouse]`.
    pub fn warehouse_dsn(&self) -> Result<String> {
        std::env::var(&self.warehouse.dsn_env).map_err(|_| {
            EtlError::Config(format!(
                "environment variable {} must hold the warehouse connection string",
                self.warehouse.dsn_env
            ))
        })
    }
}

impl TryFrom<RawDagFile> for DagDefinition {
    type Error = EtlError;

    fn try_from(raw: RawDagFile) -> std::result::Result<Self, Self::Error> {
        validate_globals(&raw)?;

        let specs = raw
            .task
            .iter()
            .map(|(id, cfg)| build_task(id, cfg, &raw.default))
            .collect::<Result<Vec<_>>>()?;

        let dag = Dag::build(raw.dag.id.clone(), specs, raw.dag.edges.clone())?;

        let schedule = raw
            .dag
            .schedule
            .as_deref()
            .map(CronSchedule::parse)
            .transpose()?;

        let mut engine = EngineConfig::new(raw.dag.max_concurrency);
        if let Some(timeout) = &raw.default.timeout {
            engine = engine.default_timeout(duration("[default].timeout", timeout)?);
        }

        Ok(Self {
            dag: Arc::new(dag),
            engine,
            schedule,
            state_dir: raw.dag.state_dir,
            storage: raw.dag.storage,
            warehouse: raw.warehouse,
        })
    }
}

fn validate_globals(raw: &RawDagFile) -> Result<()> {
    if raw.dag.id.trim().is_empty() {
        return Err(config("[dag].id must not be empty"));
    }
    if raw.dag.max_concurrency == 0 {
        return Err(config("[dag].max_concurrency must be >= 1 (got 0)"));
    }
    if raw.default.max_attempts == 0 {
        return Err(config("[default].max_attempts must be >= 1 (got 0)"));
    }
    if raw.task.is_empty() {
        return Err(config("DAG must contain at least one [task.<id>] section"));
    }
    Ok(())
}

fn build_task(id: &str, cfg: &TaskConfig, defaults: &DefaultSection) -> Result<TaskSpec> {
    reject_foreign_keys(id, cfg)?;

    let kind = match cfg.kind {
        KindName::Noop => TaskKind::Noop(Noop),
        KindName::CreateTable => TaskKind::CreateTable(CreateTable::new(required(id, "sql", &cfg.sql)?)),
        KindName::BulkLoad => {
            let mut load = BulkLoad::new(
                required(id, "source", &cfg.source)?,
                required(id, "target", &cfg.target)?,
                cfg.mode.unwrap_or_default(),
            );
            if let Some(format) = &cfg.format {
                load = load.format(format);
            }
            if let Some(role) = &cfg.iam_role {
                load = load.iam_role(role);
            }
            TaskKind::BulkLoad(load)
        }
        KindName::LoadFact => TaskKind::LoadFact(
            LoadFact::new(required(id, "sql", &cfg.sql)?).retry_safe(cfg.retry_safe.unwrap_or(false)),
        ),
        KindName::LoadDimension => TaskKind::LoadDimension(LoadDimension::new(
            required(id, "sql", &cfg.sql)?,
            cfg.truncate.unwrap_or(true),
        )),
        KindName::DataQualityCheck => {
            TaskKind::DataQualityCheck(DataQualityCheck::new(required(id, "sql", &cfg.sql)?))
        }
    };

    let mut spec = TaskSpec::new(id, kind)
        .after(cfg.after.iter().cloned())
        .retry(retry_policy(id, cfg, defaults)?);

    if let Some(timeout) = &cfg.timeout {
        spec = spec.timeout(duration(&format!("task '{id}' timeout"), timeout)?);
    }

    Ok(spec)
}

fn retry_policy(id: &str, cfg: &TaskConfig, defaults: &DefaultSection) -> Result<RetryPolicy> {
    let max_attempts = cfg.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(config(&format!("task '{id}': max_attempts must be >= 1 (got 0)")));
    }

    let raw_delay = cfg.retry_delay.as_deref().unwrap_or(&defaults.retry_delay);
    let delay = duration(&format!("task '{id}' retry_delay"), raw_delay)?;

    let policy = RetryPolicy::fixed(max_attempts, delay)
        .retry_quality_failures(cfg.retry_quality_failures.unwrap_or(defaults.retry_quality_failures));

    match cfg.backoff.unwrap_or(defaults.backoff) {
        BackoffKind::Fixed => Ok(policy),
        BackoffKind::Exponential => {
            if defaults.backoff_multiplier < 1.0 {
                return Err(config("[default].backoff_multiplier must be >= 1.0"));
            }
            let max = duration("[default].backoff_max", &defaults.backoff_max)?;
            Ok(policy.with_backoff(Exponential {
                multiplier: defaults.backoff_multiplier,
                max,
            }))
        }
    }
}

/// Keys that only make sense for other kinds are rejected rather than
/// silently ignored.
fn reject_foreign_keys(id: &str, cfg: &TaskConfig) -> Result<()> {
    let present = [
        ("sql", cfg.sql.is_some()),
        ("truncate", cfg.truncate.is_some()),
        ("source", cfg.source.is_some()),
        ("target", cfg.target.is_some()),
        ("format", cfg.format.is_some()),
        ("mode", cfg.mode.is_some()),
        ("iam_role", cfg.iam_role.is_some()),
        ("retry_safe", cfg.retry_safe.is_some()),
    ];

    let allowed: &[&str] = match cfg.kind {
        KindName::Noop => &[],
        KindName::CreateTable | KindName::DataQualityCheck => &["sql"],
        KindName::LoadFact => &["sql", "retry_safe"],
        KindName::LoadDimension => &["sql", "truncate"],
        KindName::BulkLoad => &["source", "target", "format", "mode", "iam_role"],
    };

    for (key, set) in present {
        if set && !allowed.contains(&key) {
            return Err(config(&format!(
                "task '{id}': key `{key}` is not valid for kind {:?}",
                cfg.kind
            )));
        }
    }
    Ok(())
}

fn required(id: &str, key: &str, value: &Option<String>) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| config(&format!("task '{id}' is missing required key `{key}`")))
}

fn duration(what: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| config(&format!("{what}: {e}")))
}

fn config(msg: &str) -> EtlError {
    EtlError::Config(msg.to_string())
}

// src/state/store.rs

//! Persistence for [`RunState`]s.
//!
//! File mode keeps one JSON document per run at
//! `<root>/<dag_id>/<run_id>.json`, written via a temp file and rename so a
//! crash never leaves a half-written snapshot. Memory mode is used by tests
//! and by `storage = "memory"` configs.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::Dag;
use crate::errors::{EtlError, Result};
use crate::state::run_state::RunState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    File,
    Memory,
}

type MemoryRuns = Arc<Mutex<BTreeMap<(String, String), RunState>>>;

#[derive(Debug, Clone)]
enum Backend {
    File { root: PathBuf },
    Memory(MemoryRuns),
}

/// Cheap to clone; clones share the same storage.
#[derive(Debug, Clone)]
pub struct RunStore {
    backend: Backend,
}

impl RunStore {
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::File { root: root.into() },
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::default()),
        }
    }

    pub fn for_mode(mode: StorageMode, root: impl Into<PathBuf>) -> Self {
        match mode {
            StorageMode::File => Self::file(root),
            StorageMode::Memory => Self::memory(),
        }
    }

    /// Create and persist the run for `tick`. Fails if that tick already has
    /// a run: there is at most one RunState per `(DAG, tick)`.
    ///
    /// The existence check and the first write are a single step, so two
    /// processes sharing a state directory cannot both create the same run.
    pub fn create_run(&self, dag: &Dag, tick: DateTime<Utc>) -> Result<RunState> {
        let state = RunState::new(dag, tick);
        let created = match &self.backend {
            Backend::File { root } => {
                let path = run_path(root, &state.dag_id, &state.run_id);
                create_exclusive(&path, &serde_json::to_vec_pretty(&state)?)?
            }
            Backend::Memory(runs) => {
                let key = (state.dag_id.clone(), state.run_id.clone());
                match lock(runs)?.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(state.clone());
                        true
                    }
                    Entry::Occupied(_) => false,
                }
            }
        };

        if !created {
            return Err(EtlError::Store(format!(
                "run '{}' of DAG '{}' already exists",
                state.run_id,
                dag.id()
            )));
        }
        debug!(dag = dag.id(), run_id = %state.run_id, "created run");
        Ok(state)
    }

    pub fn save(&self, state: &RunState) -> Result<()> {
        match &self.backend {
            Backend::File { root } => {
                let path = run_path(root, &state.dag_id, &state.run_id);
                let body = serde_json::to_vec_pretty(state)?;
                atomic_write(&path, &body)
            }
            Backend::Memory(runs) => {
                lock(runs)?.insert(
                    (state.dag_id.clone(), state.run_id.clone()),
                    state.clone(),
                );
                Ok(())
            }
        }
    }

    pub fn load(&self, dag_id: &str, run_id: &str) -> Result<RunState> {
        match &self.backend {
            Backend::File { root } => {
                let path = run_path(root, dag_id, run_id);
                if !path.exists() {
                    return Err(not_found(dag_id, run_id));
                }
                let body = fs::read(&path)?;
                Ok(serde_json::from_slice(&body)?)
            }
            Backend::Memory(runs) => lock(runs)?
                .get(&(dag_id.to_string(), run_id.to_string()))
                .cloned()
                .ok_or_else(|| not_found(dag_id, run_id)),
        }
    }

    /// Run ids of one DAG, oldest first (ids sort by tick).
    pub fn list(&self, dag_id: &str) -> Result<Vec<String>> {
        let mut ids = match &self.backend {
            Backend::File { root } => {
                let dir = root.join(dag_id);
                if !dir.exists() {
                    return Ok(Vec::new());
                }
                let mut ids = Vec::new();
                for entry in fs::read_dir(&dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
                ids
            }
            Backend::Memory(runs) => lock(runs)?
                .keys()
                .filter(|(dag, _)| dag == dag_id)
                .map(|(_, run)| run.clone())
                .collect(),
        };
        ids.sort();
        Ok(ids)
    }

    pub fn latest(&self, dag_id: &str) -> Result<Option<RunState>> {
        match self.list(dag_id)?.pop() {
            Some(run_id) => self.load(dag_id, &run_id).map(Some),
            None => Ok(None),
        }
    }
}

fn run_path(root: &Path, dag_id: &str, run_id: &str) -> PathBuf {
    root.join(dag_id).join(format!("{run_id}.json"))
}

/// Unique sibling of `path` for staging a write.
fn temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    PathBuf::from(format!(
        "{}.tmp-{}-{seq}",
        path.to_string_lossy(),
        std::process::id()
    ))
}

fn atomic_write(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Write `body` to `path` only if `path` does not exist yet. Returns false
/// when it already exists. The file appears complete or not at all.
fn create_exclusive(path: &Path, body: &[u8]) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, body)?;
    let linked = fs::hard_link(&tmp, path);
    fs::remove_file(&tmp)?;

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn lock(
    runs: &MemoryRuns,
) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), RunState>>> {
    runs.lock()
        .map_err(|_| EtlError::Store("in-memory run store lock poisoned".to_string()))
}

fn not_found(dag_id: &str, run_id: &str) -> EtlError {
    EtlError::Store(format!("run '{run_id}' of DAG '{dag_id}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    use crate::dag::TaskSpec;
    use crate::state::task_instance::TaskStatus;

    fn dag() -> Dag {
        Dag::build("store_dag", vec![TaskSpec::noop("A")], vec![]).unwrap()
    }

    fn tick(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn exercise(store: RunStore) {
        let dag = dag();
        let mut run = store.create_run(&dag, tick(1)).unwrap();
        assert!(store.create_run(&dag, tick(1)).is_err());

        run.transition("A", TaskStatus::Queued);
        store.save(&run).unwrap();

        let loaded = store.load("store_dag", &run.run_id).unwrap();
        assert_eq!(loaded.status_of("A"), Some(TaskStatus::Queued));

        store.create_run(&dag, tick(2)).unwrap();
        assert_eq!(
            store.list("store_dag").unwrap(),
            vec![
                "scheduled__20240301T010000Z".to_string(),
                "scheduled__20240301T020000Z".to_string()
            ]
        );
        let latest = store.latest("store_dag").unwrap().unwrap();
        assert_eq!(latest.tick, tick(2));
        assert!(store.latest("other").unwrap().is_none());
        assert!(store.load("store_dag", "missing").is_err());
    }

    #[test]
    fn memory_store_round_trip() {
        exercise(RunStore::memory());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempdir().unwrap();
        exercise(RunStore::file(dir.path()));
        assert!(
            dir.path()
                .join("store_dag")
                .join("scheduled__20240301T010000Z.json")
                .exists()
        );
    }

    #[test]
    fn racing_stores_create_a_tick_only_once() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = RunStore::file(root.clone());
                std::thread::spawn(move || store.create_run(&dag(), tick(5)).is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(created, 1);
        let store = RunStore::file(root);
        assert_eq!(store.list("store_dag").unwrap().len(), 1);
        assert!(store.load("store_dag", "scheduled__20240301T050000Z").is_ok());
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = RunStore::memory();
        let other = store.clone();
        let run = store.create_run(&dag(), tick(3)).unwrap();
        assert!(other.load("store_dag", &run.run_id).is_ok());
    }
}

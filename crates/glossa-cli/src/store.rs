//! File-backed persistence for CLI state.
//!
//! Corpus state (divisions, lines, sentences) is rebuilt per invocation
//! from `--source` files, but three things must survive between runs:
//!
//! - lexicon entries (`lexicon create` in one invocation, `lexicon get`
//!   in the next) via [`LexiconFile`];
//! - search result snapshots, so the `results_id` printed by `search`
//!   can be consumed by a later `page` invocation, via
//!   [`ResultCacheFile`], a [`ResultCache`] implementation over a JSON
//!   file with absolute expiry timestamps;
//! - lexical task records, so `lexicon status <task>` can be polled
//!   independently of the invocation that started the task, via
//!   [`TaskFile`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glossa_core::{Error, LexicalValue, MemoryStorage, ResultCache, Storage, TaskStatus};

const LEXICON_FILE: &str = "lexicon.json";
const RESULTS_FILE: &str = "results_cache.json";
const TASKS_FILE: &str = "tasks.json";

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct LexiconState {
    versions: Vec<LexicalValue>,
    latest: BTreeMap<String, String>,
}

/// Handle to the on-disk lexicon store.
#[derive(Debug)]
pub struct LexiconFile {
    path: PathBuf,
}

impl LexiconFile {
    /// Locate the store under a data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(LEXICON_FILE),
        }
    }

    /// Replay the saved lexicon state into storage.
    pub async fn load_into(&self, storage: &MemoryStorage) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let state: LexiconState =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", self.path.display()))?;

        let mut lemmas = Vec::new();
        for value in state.versions {
            if !lemmas.contains(&value.lemma) {
                lemmas.push(value.lemma.clone());
            }
            storage.put_lexical(value).await?;
        }
        // put_lexical points every lemma at its newest version; lemmas
        // whose pointer was deleted get it removed again.
        for lemma in lemmas {
            if !state.latest.contains_key(&lemma) {
                storage.drop_latest_lexical(&lemma).await?;
            }
        }
        Ok(())
    }

    /// Save the current lexicon state from storage.
    pub async fn save_from(&self, storage: &MemoryStorage) -> Result<()> {
        let (versions, latest) = storage.lexical_state().await;
        let state = LexiconState { versions, latest };
        write_json(&self.path, &state)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct CacheState {
    entries: BTreeMap<String, CacheEntry>,
}

/// File-backed result cache.
///
/// Persists search snapshots under the data directory so pagination
/// works across invocations. Expiry uses absolute timestamps; expired
/// entries read as absent and are swept on write.
#[derive(Debug)]
pub struct ResultCacheFile {
    path: PathBuf,
}

impl ResultCacheFile {
    /// Locate the cache under a data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(RESULTS_FILE),
        }
    }

    fn load(&self) -> glossa_core::Result<CacheState> {
        if !self.path.exists() {
            return Ok(CacheState::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Cache(format!("reading {}: {e}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Cache(format!("parsing {}: {e}", self.path.display())))
    }

    fn save(&self, state: &CacheState) -> glossa_core::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Cache(format!("creating {}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string(state)
            .map_err(|e| Error::Cache(format!("encoding cache state: {e}")))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::Cache(format!("writing {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ResultCache for ResultCacheFile {
    async fn get(&self, key: &str) -> glossa_core::Result<Option<String>> {
        let state = self.load()?;
        let now = Utc::now();
        Ok(state
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> glossa_core::Result<()> {
        let mut state = self.load()?;
        let now = Utc::now();
        state.entries.retain(|_, e| e.expires_at > now);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Cache(format!("ttl out of range: {e}")))?;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        self.save(&state)
    }

    async fn delete(&self, key: &str) -> glossa_core::Result<()> {
        let mut state = self.load()?;
        if state.entries.remove(key).is_some() {
            self.save(&state)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct TasksState {
    tasks: BTreeMap<String, TaskStatus>,
}

/// File-backed lexical task records.
///
/// `lexicon create` writes the record when the task starts and again
/// when it settles; `lexicon status` reads it back in any invocation.
#[derive(Debug)]
pub struct TaskFile {
    path: PathBuf,
}

impl TaskFile {
    /// Locate the task store under a data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TASKS_FILE),
        }
    }

    /// Record a task's status.
    pub fn put(&self, task_id: &str, status: &TaskStatus) -> Result<()> {
        let mut state = self.load()?;
        state.tasks.insert(task_id.to_string(), status.clone());
        write_json(&self.path, &state)
    }

    /// Fetch a task's recorded status.
    pub fn get(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        Ok(self.load()?.tasks.get(task_id).cloned())
    }

    fn load(&self) -> Result<TasksState> {
        if !self.path.exists() {
            return Ok(TasksState::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", self.path.display()))
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

//! Lexical value generation: citation context assembly, LLM analysis, and
//! versioned persistence.
//!
//! `create_or_update` runs asynchronously: it registers a task record,
//! gathers citations for the lemma through the search service, samples them
//! to fit the model's input budget, invokes the LLM boundary with retries,
//! and commits a new lexical value version. Task records move
//! `in_progress -> completed | error` and stay readable long enough to
//! outlive client polling.
//!
//! Writes are serialized per lemma with a keyed lock; tasks for different
//! lemmas run in parallel. Deletion is two-phase: `trigger_delete` returns
//! the latest version as a confirmation token, and `delete` validates that
//! token against the store so an intervening write fails the delete instead
//! of losing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{LexiconConfig, LlmConfig};
use crate::llm::{parse_reply, with_retries, LexicalReply, LlmClient};
use crate::search::{SearchOptions, SearchService};
use crate::storage::Storage;
use crate::types::{LexicalValue, SearchResult};
use crate::util::opaque_id;
use crate::{Error, Result};

/// Format of lexical value version strings.
const VERSION_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Options for one generation task.
#[derive(Debug, Clone)]
pub struct LexiconOptions {
    /// Search token lemmas instead of surface forms.
    pub search_lemma: bool,
    /// Language code recorded on the entry.
    pub language_code: String,
    /// Restrict context citations to these categories.
    pub categories: Vec<String>,
    /// Invoke the LLM. When off, the entry records citations only.
    pub analyze: bool,
}

impl Default for LexiconOptions {
    fn default() -> Self {
        Self {
            search_lemma: true,
            language_code: "grc".to_string(),
            categories: Vec::new(),
            analyze: true,
        }
    }
}

/// Lifecycle state of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// The task is running.
    InProgress,
    /// The task committed a new version.
    Completed,
    /// The task failed; the message carries the error kind and detail.
    Error,
}

/// What a completed task did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    /// First version for the lemma.
    Create,
    /// A prior version existed.
    Update,
}

/// Pollable status of a generation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Current lifecycle state.
    pub status: TaskState,
    /// Human-readable progress or error message.
    pub message: String,
    /// The committed entry, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<LexicalValue>,
    /// Whether the task created or updated, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<TaskAction>,
}

/// Confirmation returned by the first phase of deletion.
#[derive(Debug, Clone)]
pub struct DeleteTrigger {
    /// Token that must match the latest version at delete time.
    pub trigger_id: String,
    /// The entry that would be deleted, for confirmation display.
    pub entry: LexicalValue,
}

struct TaskEntry {
    status: TaskStatus,
    cancel: watch::Sender<bool>,
    expires_at: tokio::time::Instant,
}

/// Lexical value generation service.
pub struct LexiconService {
    storage: Arc<dyn Storage>,
    search: Arc<SearchService>,
    llm: Arc<dyn LlmClient>,
    config: LexiconConfig,
    llm_config: LlmConfig,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    last_version: std::sync::Mutex<String>,
    task_nonce: AtomicU64,
}

impl LexiconService {
    /// Create a service from its collaborators.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        search: Arc<SearchService>,
        llm: Arc<dyn LlmClient>,
        config: LexiconConfig,
        llm_config: LlmConfig,
    ) -> Self {
        Self {
            storage,
            search,
            llm,
            config,
            llm_config,
            tasks: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            last_version: std::sync::Mutex::new(String::new()),
            task_nonce: AtomicU64::new(0),
        }
    }

    /// Start an asynchronous create-or-update task for a lemma.
    ///
    /// Always commits a new version on success; there is no dedup on
    /// content equality. Returns the task id for status polling.
    pub async fn create_or_update(
        self: &Arc<Self>,
        lemma: &str,
        opts: LexiconOptions,
    ) -> Result<String> {
        if lemma.trim().is_empty() {
            return Err(Error::Validation("lemma must not be empty".to_string()));
        }
        let lemma = lemma.trim().to_string();
        let nonce = self.task_nonce.fetch_add(1, Ordering::Relaxed);
        let task_id = opaque_id(
            "tk",
            &format!(
                "{lemma}:{nonce}:{}",
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ),
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(
                task_id.clone(),
                TaskEntry {
                    status: TaskStatus {
                        status: TaskState::InProgress,
                        message: format!("generating lexical value for '{lemma}'"),
                        entry: None,
                        action: None,
                    },
                    cancel: cancel_tx,
                    expires_at: tokio::time::Instant::now()
                        + Duration::from_secs(self.config.task_ttl_seconds),
                },
            );
        }

        let service = Arc::clone(self);
        let spawned_id = task_id.clone();
        tokio::spawn(async move {
            let budget = Duration::from_secs(service.config.task_budget_seconds);
            let mut abort_rx = cancel_rx.clone();
            // Cancellation drops the running future, aborting whatever I/O
            // is in flight; storage writes are atomic per call, so state
            // stays at the last completed boundary.
            let guarded = async {
                tokio::select! {
                    result = service.run_task(&lemma, opts, cancel_rx) => result,
                    _ = abort_rx.changed() => Err(Error::Cancelled(
                        "lexical value task cancelled".to_string(),
                    )),
                }
            };
            let outcome = match tokio::time::timeout(budget, guarded).await {
                Ok(result) => result,
                Err(_) => Err(Error::Deadline(format!(
                    "lexical value task for '{lemma}' exceeded {}s",
                    budget.as_secs()
                ))),
            };
            service.finish_task(&spawned_id, &lemma, outcome).await;
        });

        Ok(task_id)
    }

    /// Poll a task's status.
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let now = tokio::time::Instant::now();
        let mut tasks = self.tasks.write().await;
        tasks.retain(|_, entry| entry.expires_at > now);
        tasks
            .get(task_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| Error::NotFound(format!("no task '{task_id}'")))
    }

    /// Signal cancellation to a running task.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(task_id)
            .ok_or_else(|| Error::NotFound(format!("no task '{task_id}'")))?;
        let _ = entry.cancel.send(true);
        Ok(())
    }

    /// First phase of deletion: fetch the latest entry and its version as
    /// the confirmation token.
    pub async fn trigger_delete(&self, lemma: &str) -> Result<DeleteTrigger> {
        let entry = self
            .storage
            .latest_lexical(lemma)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no lexical value for '{lemma}'")))?;
        Ok(DeleteTrigger {
            trigger_id: entry.version.clone(),
            entry,
        })
    }

    /// Second phase of deletion: validate the trigger and remove the
    /// latest pointer. Older versions stay retrievable.
    pub async fn delete(&self, lemma: &str, trigger_id: &str) -> Result<()> {
        let lock = self.lock_for(lemma).await;
        let _guard = lock.lock().await;

        let latest = self
            .storage
            .latest_lexical(lemma)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no lexical value for '{lemma}'")))?;
        if latest.version != trigger_id {
            return Err(Error::StaleTrigger(format!(
                "latest version is {} but trigger was {trigger_id}",
                latest.version
            )));
        }
        self.storage.drop_latest_lexical(lemma).await?;
        info!(lemma, version = trigger_id, "lexical value deleted");
        Ok(())
    }

    /// Version strings for a lemma, descending.
    pub async fn list_versions(&self, lemma: &str) -> Result<Vec<String>> {
        self.storage.list_lexical_versions(lemma).await
    }

    /// Fetch a lexical value, latest or by explicit version.
    pub async fn get(&self, lemma: &str, version: Option<&str>) -> Result<LexicalValue> {
        let found = match version {
            Some(v) => self.storage.lexical_version(lemma, v).await?,
            None => self.storage.latest_lexical(lemma).await?,
        };
        found.ok_or_else(|| Error::NotFound(format!("no lexical value for '{lemma}'")))
    }

    async fn lock_for(&self, lemma: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(lemma.to_string()).or_default())
    }

    async fn finish_task(
        &self,
        task_id: &str,
        lemma: &str,
        outcome: Result<(LexicalValue, TaskAction)>,
    ) {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            return;
        };
        match outcome {
            Ok((value, action)) => {
                entry.status = TaskStatus {
                    status: TaskState::Completed,
                    message: format!("committed version {} for '{lemma}'", value.version),
                    entry: Some(value),
                    action: Some(action),
                };
            },
            Err(e) => {
                warn!(task_id, lemma, error = %e, "lexical value task failed");
                entry.status = TaskStatus {
                    status: TaskState::Error,
                    message: format!("{}: {e}", e.kind()),
                    entry: None,
                    action: None,
                };
            },
        }
    }

    async fn run_task(
        &self,
        lemma: &str,
        opts: LexiconOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<(LexicalValue, TaskAction)> {
        let lock = self.lock_for(lemma).await;
        let _guard = lock.lock().await;
        ensure_live(&cancel)?;

        let prior = self.storage.latest_lexical(lemma).await?;
        ensure_live(&cancel)?;

        let response = self
            .search
            .search(
                lemma,
                SearchOptions {
                    search_lemma: opts.search_lemma,
                    categories: opts.categories.clone(),
                    page_size: Some(self.config.context_page_size),
                    ttl_seconds: None,
                },
            )
            .await?;
        ensure_live(&cancel)?;

        let samples = sample_citations(&response.first_page, self.config.max_context_citations);
        debug!(
            lemma,
            total = response.total,
            sampled = samples.len(),
            "assembled citation context"
        );

        let reply = if opts.analyze {
            let prompt = build_prompt(lemma, &opts.language_code, &samples, prior.as_ref());
            let completion = with_retries(
                self.llm_config.retries,
                Duration::from_millis(self.llm_config.retry_base_ms),
                "llm completion",
                || {
                    let prompt = prompt.clone();
                    let cancel = cancel.clone();
                    async move {
                        ensure_live(&cancel)?;
                        self.llm.complete(&prompt).await
                    }
                },
            )
            .await?;
            parse_reply(&completion)?
        } else {
            LexicalReply {
                translation: String::new(),
                short_description: String::new(),
                long_description: String::new(),
                related_terms: Vec::new(),
                citations_used: samples.iter().map(|s| s.citation_string.clone()).collect(),
            }
        };
        ensure_live(&cancel)?;

        // Only citations that were actually offered to the model may be
        // recorded; anything else is dropped and logged.
        let mut citations_used = Vec::new();
        for cited in reply.citations_used {
            if samples.iter().any(|s| s.citation_string == cited) {
                citations_used.push(cited);
            } else {
                warn!(lemma, citation = %cited, "dropping unknown citation from reply");
            }
        }
        let references: Vec<SearchResult> = samples
            .iter()
            .filter(|s| citations_used.contains(&s.citation_string))
            .cloned()
            .collect();

        let version = self.next_version(prior.as_ref().map(|p| p.version.as_str()));
        let now = Utc::now();
        let value = LexicalValue {
            lemma: lemma.to_string(),
            language_code: opts.language_code,
            translation: reply.translation,
            short_description: reply.short_description,
            long_description: reply.long_description,
            related_terms: reply.related_terms,
            citations_used,
            references,
            created_at: now,
            updated_at: now,
            version: version.clone(),
        };

        self.storage.put_lexical(value.clone()).await?;
        let action = if prior.is_some() {
            TaskAction::Update
        } else {
            TaskAction::Create
        };
        info!(lemma, version = %version, ?action, "lexical value committed");
        Ok((value, action))
    }

    /// Allocate a strictly increasing version string.
    ///
    /// Commits within the same wall-clock second, or behind a prior
    /// version from a skewed clock, bump one second past the floor.
    fn next_version(&self, prior: Option<&str>) -> String {
        let candidate = Utc::now().format(VERSION_FORMAT).to_string();
        #[allow(clippy::expect_used)]
        let mut last = self.last_version.lock().expect("version lock poisoned");
        let floor = prior
            .filter(|p| *p > last.as_str())
            .map_or_else(|| last.clone(), str::to_string);
        let version = if candidate > floor {
            candidate
        } else {
            bump_version(&floor)
        };
        *last = version.clone();
        version
    }
}

fn ensure_live(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        Err(Error::Cancelled("lexical value task cancelled".to_string()))
    } else {
        Ok(())
    }
}

/// One second past a version string; falls back to suffixing when the
/// floor does not parse.
fn bump_version(floor: &str) -> String {
    NaiveDateTime::parse_from_str(floor, VERSION_FORMAT).map_or_else(
        |_| format!("{floor}_1"),
        |dt| {
            (dt + TimeDelta::seconds(1))
                .format(VERSION_FORMAT)
                .to_string()
        },
    )
}

/// Reduce citations to at most `max` by uniform stride, preserving order
/// and always keeping the first and last.
fn sample_citations(results: &[SearchResult], max: usize) -> Vec<SearchResult> {
    if results.len() <= max || max == 0 {
        return results.to_vec();
    }
    if max == 1 {
        return vec![results[0].clone()];
    }
    let n = results.len();
    let mut picked = Vec::with_capacity(max);
    let mut last_index = usize::MAX;
    for i in 0..max {
        let index = i * (n - 1) / (max - 1);
        if index != last_index {
            picked.push(results[index].clone());
            last_index = index;
        }
    }
    picked
}

/// Assemble the generation prompt: the lemma, its sampled citations with
/// one sentence of context on each side, and any prior entry.
fn build_prompt(
    lemma: &str,
    language_code: &str,
    samples: &[SearchResult],
    prior: Option<&LexicalValue>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Write a lexicon entry for the lemma '{lemma}' ({language_code}).\n\
         Reply with one JSON object with fields: translation, \
         short_description, long_description, related_terms, citations_used.\n\
         citations_used must repeat, verbatim, only citation strings listed below.\n\n"
    ));

    if let Some(prior) = prior {
        prompt.push_str("Previous entry (revise rather than restart):\n");
        if let Ok(json) = serde_json::to_string(prior) {
            prompt.push_str(&json);
        }
        prompt.push_str("\n\n");
    }

    prompt.push_str("Citations:\n");
    for sample in samples {
        prompt.push_str(&format!("- {}\n", sample.citation_string));
        if let Some(prev) = &sample.prev_sentence_text {
            prompt.push_str(&format!("  before: {prev}\n"));
        }
        prompt.push_str(&format!("  text: {}\n", sample.sentence_text));
        if let Some(next) = &sample.next_sentence_text {
            prompt.push_str(&format!("  after: {next}\n"));
        }
    }
    prompt
}

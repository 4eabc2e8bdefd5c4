//! Configuration for the glossa pipeline and services.
//!
//! Configuration is stored in TOML and loaded from an explicit path; every
//! field has a serde default so partial files work. A missing file yields
//! the built-in defaults.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [ingest]
//! abbreviations = ["κεφ", "στ"]
//! error_rate_threshold = 0.05
//!
//! [search]
//! cache_prefix = "glossa"
//! chunk_size = 1000
//! default_page_size = 100
//!
//! [llm]
//! endpoint = "http://localhost:8400/v1/complete"
//! model = "lexicon-writer"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

const fn default_error_rate_threshold() -> f64 {
    0.05
}
const fn default_chunk_size() -> usize {
    1000
}
const fn default_page_size() -> usize {
    100
}
const fn default_max_page_size() -> usize {
    1000
}
const fn default_ttl_seconds() -> u64 {
    3600
}
fn default_cache_prefix() -> String {
    "glossa".to_string()
}
const fn default_cache_read_retries() -> u32 {
    3
}
const fn default_cache_retry_base_ms() -> u64 {
    50
}
const fn default_cache_timeout_seconds() -> u64 {
    2
}
const fn default_storage_timeout_seconds() -> u64 {
    30
}
const fn default_max_context_citations() -> usize {
    50
}
const fn default_context_page_size() -> usize {
    1000
}
const fn default_task_budget_seconds() -> u64 {
    900
}
const fn default_task_ttl_seconds() -> u64 {
    86400
}
const fn default_llm_timeout_seconds() -> u64 {
    600
}
const fn default_llm_retries() -> u32 {
    3
}
const fn default_llm_retry_base_ms() -> u64 {
    1000
}
fn default_llm_endpoint() -> String {
    "http://localhost:8400/v1/complete".to_string()
}
fn default_llm_model() -> String {
    "lexicon-writer".to_string()
}
const fn default_nlp_concurrency() -> usize {
    4
}
fn default_language_code() -> String {
    "grc".to_string()
}

/// Top-level configuration for glossa services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ingestion pipeline settings.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Search and pagination settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Lexical value generation settings.
    #[serde(default)]
    pub lexicon: LexiconConfig,
    /// External LLM boundary settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Abbreviations that suppress sentence termination on `.`.
    ///
    /// The exact set is corpus-dependent and supplied as configuration;
    /// entries are compared without their trailing dot.
    #[serde(default)]
    pub abbreviations: Vec<String>,

    /// Fraction of lines that may fail before the job aborts.
    ///
    /// Parsing and integrity issues below this rate are collected into the
    /// ingest report without halting the job.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Storage operation timeout in seconds.
    #[serde(default = "default_storage_timeout_seconds")]
    pub storage_timeout_seconds: u64,

    /// Bounded concurrency for NLP annotation work.
    #[serde(default = "default_nlp_concurrency")]
    pub nlp_concurrency: usize,

    /// Language code recorded on ingested authors.
    #[serde(default = "default_language_code")]
    pub language_code: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            abbreviations: Vec::new(),
            error_rate_threshold: default_error_rate_threshold(),
            storage_timeout_seconds: default_storage_timeout_seconds(),
            nlp_concurrency: default_nlp_concurrency(),
            language_code: default_language_code(),
        }
    }
}

/// Search and pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Key prefix for cached result sets.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Number of results per cache chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Page size used when the caller does not specify one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound on caller-supplied page sizes.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Result set time-to-live in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Attempts for cache reads before the error surfaces.
    #[serde(default = "default_cache_read_retries")]
    pub cache_read_retries: u32,

    /// Base delay for cache read backoff, in milliseconds.
    #[serde(default = "default_cache_retry_base_ms")]
    pub cache_retry_base_ms: u64,

    /// Cache operation timeout in seconds.
    #[serde(default = "default_cache_timeout_seconds")]
    pub cache_timeout_seconds: u64,

    /// Storage operation timeout in seconds.
    #[serde(default = "default_storage_timeout_seconds")]
    pub storage_timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            chunk_size: default_chunk_size(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_ttl_seconds: default_ttl_seconds(),
            cache_read_retries: default_cache_read_retries(),
            cache_retry_base_ms: default_cache_retry_base_ms(),
            cache_timeout_seconds: default_cache_timeout_seconds(),
            storage_timeout_seconds: default_storage_timeout_seconds(),
        }
    }
}

/// Lexical value generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// Maximum citations assembled into one generation prompt.
    #[serde(default = "default_max_context_citations")]
    pub max_context_citations: usize,

    /// Page size used for the context-gathering search.
    #[serde(default = "default_context_page_size")]
    pub context_page_size: usize,

    /// Total budget for one lexical value task, in seconds.
    #[serde(default = "default_task_budget_seconds")]
    pub task_budget_seconds: u64,

    /// How long task status records outlive completion, in seconds.
    ///
    /// Large enough to outlive client polling.
    #[serde(default = "default_task_ttl_seconds")]
    pub task_ttl_seconds: u64,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            max_context_citations: default_max_context_citations(),
            context_page_size: default_context_page_size(),
            task_budget_seconds: default_task_budget_seconds(),
            task_ttl_seconds: default_task_ttl_seconds(),
        }
    }
}

/// External LLM boundary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Completion endpoint URL.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retry attempts for transient failures.
    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    /// Base delay for retry backoff, in milliseconds.
    #[serde(default = "default_llm_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout_seconds(),
            retries: default_llm_retries(),
            retry_base_ms: default_llm_retry_base_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Serialize the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }
}

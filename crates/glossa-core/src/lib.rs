//! # glossa-core
//!
//! Core functionality for glossa - a citation-aware ingestion, search, and
//! lexicon service for ancient Greek corpora.
//!
//! This crate decodes TLG-style citation markup, reconstructs sentences
//! across cited line boundaries while preserving per-line provenance,
//! groups lines into logical text divisions, serves cached paginated
//! citation search, and generates versioned lexicon entries with an
//! external LLM.
//!
//! ## Architecture
//!
//! The pipeline stages are plain synchronous state machines driven by an
//! async ingestion driver; every external collaborator sits behind a
//! trait:
//!
//! - **Parsing**: [`CitationParser`] decodes citation prefixes per line
//! - **Grouping**: [`DivisionIngestor`] assigns lines to divisions
//! - **Assembly**: [`SentenceReconstructor`] joins lines into sentences
//! - **Driver**: [`IngestPipeline`] wires the stages to storage and NLP
//! - **Search**: [`SearchService`] snapshots results into a chunked cache
//! - **Lexicon**: [`LexiconService`] runs versioned LLM generation tasks
//! - **Boundaries**: [`Storage`](storage::Storage),
//!   [`ResultCache`](cache::ResultCache), [`NlpAnnotator`](nlp::NlpAnnotator),
//!   [`LlmClient`](llm::LlmClient)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use glossa_core::{
//!     Config, FoldingAnnotator, IngestPipeline, MemoryStorage, Result,
//!     WorkStructures,
//! };
//!
//! # async fn demo() -> Result<()> {
//! let config = Config::default();
//! let storage = Arc::new(MemoryStorage::new());
//! let pipeline = IngestPipeline::new(
//!     storage,
//!     Arc::new(FoldingAnnotator),
//!     WorkStructures::new(),
//!     config.ingest,
//! );
//!
//! let (_cancel, watch) = tokio::sync::watch::channel(false);
//! let source = "[0627][010]\n-Z//1/1\tὨμου δὲ ἄρθρον.\n";
//! let report = pipeline.ingest_bytes(source.as_bytes(), watch).await?;
//! println!("{} sentences from {} lines", report.sentences, report.lines);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`] with a machine-readable
//! [`Error::kind`]. Ingestion-stage failures are collected into the ingest
//! report rather than surfaced, up to a configured error rate.

/// Result cache boundary and key layout
pub mod cache;
/// TLG citation parsing
pub mod citation;
/// Configuration for the pipeline and services
pub mod config;
/// Division grouping state machine
pub mod division;
/// Error types and result alias
pub mod error;
/// Async ingestion driver
pub mod ingest;
/// Lexical value generation service
pub mod lexicon;
/// External LLM boundary
pub mod llm;
/// NLP annotation boundary and pool
pub mod nlp;
/// Search and pagination service
pub mod search;
/// Sentence reconstruction
pub mod sentence;
/// Storage boundary and in-memory implementation
pub mod storage;
/// Core data types
pub mod types;
/// Shared helpers
pub mod util;

// Re-export commonly used types
pub use cache::{MemoryCache, ResultCache};
pub use citation::{CitationParser, ContentLine, ParsedLine};
pub use config::{Config, IngestConfig, LexiconConfig, LlmConfig, SearchConfig};
pub use division::{CompletedDivision, DivisionIngestor, DivisionKey};
pub use error::{Error, Result};
pub use ingest::{IngestIssue, IngestPipeline, IngestReport};
pub use lexicon::{
    DeleteTrigger, LexiconOptions, LexiconService, TaskAction, TaskState, TaskStatus,
};
pub use llm::{HttpLlmClient, LexicalReply, LlmClient};
pub use nlp::{Annotation, AnnotationPool, FoldingAnnotator, NlpAnnotator};
pub use search::{SearchOptions, SearchResponse, SearchService};
pub use sentence::{AssembledSentence, LineSpan, SentenceReconstructor};
pub use storage::{MemoryStorage, SearchQuery, Storage};
pub use types::*;

//! # CLI Structure and Argument Parsing
//!
//! Defines the command-line interface for `glossa`, built with `clap`
//! derive macros.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Ingest a TLG-cited source file and print the report
//! glossa ingest corpus.txt --structures works.toml
//!
//! # Search, then page through the cached snapshot in later invocations
//! glossa search "ἄρθρον" --source corpus.txt --lemma --page-size 50
//! glossa page rs_1a2b3c4d5e6f 2
//!
//! # Generate, poll, inspect, and delete lexicon entries
//! glossa lexicon create "αἷμα" --source corpus.txt
//! glossa lexicon status tk_1a2b3c4d5e6f
//! glossa lexicon versions "αἷμα"
//! glossa lexicon delete "αἷμα" --yes
//! ```
//!
//! Corpus state is rebuilt per invocation from `--source` files; search
//! snapshots, lexical task records, and lexicon entries persist under
//! `--data-dir` so `page` and `lexicon status` work across invocations.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Validates that a page size is at least 1.
fn validate_page_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        Err("page size must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

/// Top-level CLI for `glossa`.
#[derive(Debug, Parser)]
#[command(
    name = "glossa",
    about = "Citation-aware search and lexicon generation for Greek corpora",
    version
)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence all logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding CLI state (the lexicon store)
    #[arg(long, global = true, default_value = ".glossa")]
    pub data_dir: PathBuf,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a TLG-cited source file
    Ingest(IngestArgs),
    /// Search ingested sentences with cached pagination
    Search(SearchArgs),
    /// Fetch a page from an earlier search's cached snapshot
    Page(PageArgs),
    /// Manage lexical values
    Lexicon {
        /// Lexicon operation
        #[command(subcommand)]
        command: LexiconCommands,
    },
}

/// Arguments for `glossa ingest`.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Source file to ingest
    pub file: PathBuf,

    /// Work structure descriptor table (TOML)
    #[arg(long)]
    pub structures: Option<PathBuf>,
}

/// Arguments for `glossa search`.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Query term
    pub query: String,

    /// Source files to ingest before searching
    #[arg(long)]
    pub source: Vec<PathBuf>,

    /// Work structure descriptor table (TOML)
    #[arg(long)]
    pub structures: Option<PathBuf>,

    /// Match token lemmas instead of surface forms
    #[arg(long)]
    pub lemma: bool,

    /// Restrict to these categories (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Results per page
    #[arg(long, value_parser = validate_page_size)]
    pub page_size: Option<usize>,

    /// Page to print (1-based)
    #[arg(long, default_value_t = 1, value_parser = validate_page_size)]
    pub page: usize,
}

/// Arguments for `glossa page`.
#[derive(Debug, Args)]
pub struct PageArgs {
    /// Results id printed by a previous `search`
    pub results_id: String,

    /// Page to fetch (1-based)
    #[arg(value_parser = validate_page_size)]
    pub page: usize,

    /// Results per page; defaults to the configured page size
    #[arg(long, value_parser = validate_page_size)]
    pub page_size: Option<usize>,
}

/// Subcommands of `glossa lexicon`.
#[derive(Debug, Subcommand)]
pub enum LexiconCommands {
    /// Generate or update a lexical value
    Create {
        /// The lemma
        lemma: String,

        /// Source files to ingest for citation context
        #[arg(long)]
        source: Vec<PathBuf>,

        /// Work structure descriptor table (TOML)
        #[arg(long)]
        structures: Option<PathBuf>,

        /// Language code for the entry
        #[arg(long, default_value = "grc")]
        language: String,

        /// Match surface forms instead of lemmas when gathering citations
        #[arg(long)]
        surface: bool,

        /// Skip the LLM analysis; record citations only
        #[arg(long)]
        no_analyze: bool,
    },
    /// Poll the status of a generation task
    Status {
        /// Task id printed by `lexicon create`
        task: String,
    },
    /// Print a lexical value
    Get {
        /// The lemma
        lemma: String,

        /// Specific version; latest when omitted
        #[arg(long)]
        version: Option<String>,
    },
    /// List version strings for a lemma, newest first
    Versions {
        /// The lemma
        lemma: String,
    },
    /// Delete the latest lexical value (two-phase)
    Delete {
        /// The lemma
        lemma: String,

        /// Confirm the deletion without prompting
        #[arg(long)]
        yes: bool,
    },
}

//! glossa CLI - citation-aware search and lexicon generation for Greek
//! corpora.
//!
//! Entry point for the `glossa` command-line interface. Command
//! implementations live in [`commands`]; argument parsing in [`cli`];
//! cross-invocation state (lexicon entries, search snapshots, task
//! records) in [`store`].

use anyhow::Result;
use clap::Parser;

pub mod cli;
pub mod commands;
mod logging;
pub mod store;

use cli::{Cli, Commands, LexiconCommands};
use commands::Context;

/// Execute the glossa CLI with the current environment.
///
/// # Errors
///
/// Returns an error if configuration loading or command execution fails.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.verbose, cli.quiet)?;

    let ctx = Context {
        config: commands::load_config(cli.config.as_deref())?,
        json: cli.json,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Ingest(args) => commands::ingest(args, &ctx).await,
        Commands::Search(args) => commands::search(args, &ctx).await.map(|_| ()),
        Commands::Page(args) => commands::page(args, &ctx).await,
        Commands::Lexicon { command } => match command {
            LexiconCommands::Create {
                lemma,
                source,
                structures,
                language,
                surface,
                no_analyze,
            } => commands::lexicon_create(
                &lemma, &source, structures, language, surface, no_analyze, &ctx,
            )
            .await
            .map(|_| ()),
            LexiconCommands::Status { task } => commands::lexicon_status(&task, &ctx).await,
            LexiconCommands::Get { lemma, version } => {
                commands::lexicon_get(&lemma, version.as_deref(), &ctx).await
            },
            LexiconCommands::Versions { lemma } => {
                commands::lexicon_versions(&lemma, &ctx).await
            },
            LexiconCommands::Delete { lemma, yes } => {
                commands::lexicon_delete(&lemma, yes, &ctx).await
            },
        },
    }
}

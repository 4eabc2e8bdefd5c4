//! End-to-end CLI flows: argument parsing, command wiring, and the
//! cross-invocation state that backs `page` and `lexicon status`.

use std::path::{Path, PathBuf};

use clap::Parser;
use glossa_cli::cli::{Cli, Commands, LexiconCommands};
use glossa_cli::commands::{self, Context};
use glossa_core::{Config, TaskState};
use tempfile::TempDir;

const CORPUS: &str = "[0627][010]\n\
    -Z//1/1\tπρῶτον περὶ ἄρθρων εἴρηται.\n\
    -Z//1/2\tδεύτερον περὶ ἄρθρων εἴρηται.\n\
    -Z//1/3\tτρίτον περὶ ἄρθρων εἴρηται.\n\
    -Z//1/4\tτέταρτον περὶ ἄρθρων εἴρηται.\n\
    -Z//1/5\tπέμπτον περὶ ἄρθρων εἴρηται.\n";

fn corpus_file(dir: &Path) -> PathBuf {
    let path = dir.join("corpus.txt");
    std::fs::write(&path, CORPUS).expect("write corpus");
    path
}

/// A fresh context over the same data directory, as a new process
/// invocation would build.
fn context(data_dir: &Path) -> Context {
    Context {
        config: Config::default(),
        json: false,
        data_dir: data_dir.to_path_buf(),
    }
}

#[test]
fn parse_search_arguments() {
    let cli = Cli::try_parse_from([
        "glossa", "search", "ἄρθρον", "--source", "corpus.txt", "--lemma", "--page-size", "50",
        "--category", "anatomy",
    ])
    .expect("valid arguments");

    match cli.command {
        Commands::Search(args) => {
            assert_eq!(args.query, "ἄρθρον");
            assert!(args.lemma);
            assert_eq!(args.page_size, Some(50));
            assert_eq!(args.categories, vec!["anatomy".to_string()]);
            assert_eq!(args.page, 1);
        },
        other => panic!("expected search command, got {other:?}"),
    }
}

#[test]
fn parse_page_arguments() {
    let cli = Cli::try_parse_from(["glossa", "page", "rs_1a2b3c4d5e6f", "2"])
        .expect("valid arguments");
    match cli.command {
        Commands::Page(args) => {
            assert_eq!(args.results_id, "rs_1a2b3c4d5e6f");
            assert_eq!(args.page, 2);
            assert_eq!(args.page_size, None);
        },
        other => panic!("expected page command, got {other:?}"),
    }
}

#[test]
fn parse_lexicon_status_arguments() {
    let cli = Cli::try_parse_from(["glossa", "lexicon", "status", "tk_1a2b3c4d5e6f"])
        .expect("valid arguments");
    match cli.command {
        Commands::Lexicon {
            command: LexiconCommands::Status { task },
        } => assert_eq!(task, "tk_1a2b3c4d5e6f"),
        other => panic!("expected lexicon status command, got {other:?}"),
    }
}

#[test]
fn zero_page_size_is_rejected_at_parse_time() {
    assert!(Cli::try_parse_from(["glossa", "page", "rs_abc", "0"]).is_err());
    assert!(
        Cli::try_parse_from(["glossa", "search", "q", "--page-size", "0"]).is_err()
    );
}

#[tokio::test]
async fn ingest_command_reports() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(dir.path());
    let args = match Cli::try_parse_from([
        "glossa",
        "ingest",
        corpus_file(dir.path()).to_str().expect("utf-8 path"),
    ])
    .expect("valid arguments")
    .command
    {
        Commands::Ingest(args) => args,
        other => panic!("expected ingest command, got {other:?}"),
    };

    commands::ingest(args, &ctx).await.expect("ingest succeeds");
}

#[tokio::test]
async fn search_then_page_across_invocations() {
    let dir = TempDir::new().expect("tempdir");
    let source = corpus_file(dir.path());

    let ctx = context(dir.path());
    let args = match Cli::try_parse_from([
        "glossa",
        "search",
        "ἄρθρων",
        "--source",
        source.to_str().expect("utf-8 path"),
        "--page-size",
        "2",
    ])
    .expect("valid arguments")
    .command
    {
        Commands::Search(args) => args,
        other => panic!("expected search command, got {other:?}"),
    };
    let results_id = commands::search(args, &ctx).await.expect("search succeeds");
    assert!(results_id.starts_with("rs_"));

    // A later invocation reopens the persisted snapshot by id alone.
    let later = context(dir.path());
    let page_args =
        match Cli::try_parse_from(["glossa", "page", &results_id, "3", "--page-size", "2"])
            .expect("valid arguments")
            .command
        {
            Commands::Page(args) => args,
            other => panic!("expected page command, got {other:?}"),
        };
    commands::page(page_args, &later).await.expect("page succeeds");

    // An unknown id reports the snapshot as expired.
    let missing = match Cli::try_parse_from(["glossa", "page", "rs_missing", "1"])
        .expect("valid arguments")
        .command
    {
        Commands::Page(args) => args,
        other => panic!("expected page command, got {other:?}"),
    };
    let err = commands::page(missing, &later)
        .await
        .expect_err("unknown id fails");
    assert!(err.to_string().contains("expired"));
}

#[tokio::test]
async fn lexicon_lifecycle_across_invocations() {
    let dir = TempDir::new().expect("tempdir");
    let source = corpus_file(dir.path());
    let sources = vec![source];

    // Create without LLM analysis; citations only.
    let ctx = context(dir.path());
    let task_id = commands::lexicon_create(
        "ἄρθρων",
        &sources,
        None,
        "grc".to_string(),
        true, // surface match; the stand-in annotator folds diacritics
        true, // no_analyze
        &ctx,
    )
    .await
    .expect("create succeeds");
    assert!(task_id.starts_with("tk_"));

    // A later invocation polls the recorded task and reads the entry.
    let later = context(dir.path());
    commands::lexicon_status(&task_id, &later)
        .await
        .expect("status readable");
    commands::lexicon_get("ἄρθρων", None, &later)
        .await
        .expect("entry readable");
    commands::lexicon_versions("ἄρθρων", &later)
        .await
        .expect("versions listed");

    // Unknown tasks and lemmas fail cleanly.
    assert!(commands::lexicon_status("tk_missing", &later).await.is_err());
    assert!(commands::lexicon_get("ἄγνωστον", None, &later).await.is_err());

    // Two-phase delete: dry run keeps the entry, --yes removes it.
    commands::lexicon_delete("ἄρθρων", false, &later)
        .await
        .expect("dry run succeeds");
    commands::lexicon_get("ἄρθρων", None, &later)
        .await
        .expect("entry still present");
    commands::lexicon_delete("ἄρθρων", true, &later)
        .await
        .expect("delete succeeds");
    assert!(commands::lexicon_get("ἄρθρων", None, &later).await.is_err());
}

#[tokio::test]
async fn recorded_task_status_is_terminal() {
    let dir = TempDir::new().expect("tempdir");
    let source = corpus_file(dir.path());

    let ctx = context(dir.path());
    let task_id = commands::lexicon_create(
        "εἴρηται",
        &[source],
        None,
        "grc".to_string(),
        true,
        true,
        &ctx,
    )
    .await
    .expect("create succeeds");

    let tasks = glossa_cli::store::TaskFile::new(dir.path());
    let status = tasks
        .get(&task_id)
        .expect("task file readable")
        .expect("task recorded");
    assert_eq!(status.status, TaskState::Completed);
    assert!(status.entry.is_some());
}

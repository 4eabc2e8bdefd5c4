//! Command implementations for the glossa CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use glossa_core::{
    Config, FoldingAnnotator, HttpLlmClient, IngestPipeline, IngestReport, LexiconOptions,
    LexiconService, MemoryCache, MemoryStorage, ResultsPage, SearchOptions, SearchResult,
    SearchService, Storage, TaskState, TaskStatus, WorkStructures,
};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cli::{IngestArgs, PageArgs, SearchArgs};
use crate::store::{LexiconFile, ResultCacheFile, TaskFile};

/// Shared command context derived from global CLI flags.
pub struct Context {
    /// Loaded configuration.
    pub config: Config,
    /// Emit JSON instead of text.
    pub json: bool,
    /// Directory holding CLI state.
    pub data_dir: PathBuf,
}

/// Load configuration from the given path or defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn load_structures(path: Option<&Path>) -> Result<WorkStructures> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading structures from {}", path.display()))?;
            Ok(WorkStructures::from_toml(&raw)?)
        },
        None => Ok(WorkStructures::new()),
    }
}

fn live() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Ingest the given sources into a fresh in-memory store.
async fn ingest_sources(
    sources: &[PathBuf],
    structures: Option<&Path>,
    config: &Config,
) -> Result<(Arc<MemoryStorage>, Vec<IngestReport>)> {
    let storage = Arc::new(MemoryStorage::new());
    let pipeline = IngestPipeline::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(FoldingAnnotator),
        load_structures(structures)?,
        config.ingest.clone(),
    );
    let mut reports = Vec::new();
    for source in sources {
        let report = pipeline
            .ingest_file(source, live())
            .await
            .with_context(|| format!("ingesting {}", source.display()))?;
        debug!(source = %source.display(), sentences = report.sentences, "source ingested");
        reports.push(report);
    }
    Ok((storage, reports))
}

fn print_report(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} authors, {} texts, {} divisions, {} lines, {} sentences",
        report.authors, report.texts, report.divisions, report.lines, report.sentences
    );
    if report.issues.is_empty() {
        println!("no issues");
    } else {
        println!("{} issues:", report.issues.len());
        for issue in &report.issues {
            match issue.line {
                Some(line) => println!("  [{}] line {}: {}", issue.kind, line, issue.message),
                None => println!("  [{}] {}", issue.kind, issue.message),
            }
        }
    }
    Ok(())
}

/// `glossa ingest`
pub async fn ingest(args: IngestArgs, ctx: &Context) -> Result<()> {
    let (_storage, reports) =
        ingest_sources(&[args.file], args.structures.as_deref(), &ctx.config).await?;
    for report in &reports {
        print_report(report, ctx.json)?;
    }
    Ok(())
}

fn print_results(
    results_id: &str,
    query: Option<&str>,
    total: usize,
    page: usize,
    results: &[SearchResult],
    json: bool,
) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "resultsId": results_id,
                "total": total,
                "page": page,
                "results": results,
            }))?
        );
        return Ok(());
    }
    match query {
        Some(query) => println!(
            "{total} results for '{query}' (page {page}, results id {results_id})"
        ),
        None => println!("page {page} of {total} results ({results_id})"),
    }
    for result in results {
        println!("  {}", result.citation_string);
        println!("    {}", result.sentence_text);
    }
    Ok(())
}

/// `glossa search`
///
/// Snapshots land in the file-backed result cache under the data
/// directory, so the printed `results_id` stays consumable by `page`
/// until its TTL elapses. Returns the results id.
pub async fn search(args: SearchArgs, ctx: &Context) -> Result<String> {
    if args.source.is_empty() {
        bail!("search needs at least one --source file to ingest");
    }
    let (storage, _) =
        ingest_sources(&args.source, args.structures.as_deref(), &ctx.config).await?;
    let service = SearchService::new(
        storage,
        Arc::new(ResultCacheFile::new(&ctx.data_dir)),
        ctx.config.search.clone(),
    );

    let response = service
        .search(
            &args.query,
            SearchOptions {
                search_lemma: args.lemma,
                categories: args.categories.clone(),
                page_size: args.page_size,
                ttl_seconds: None,
            },
        )
        .await?;

    let page: Option<ResultsPage> = if args.page == 1 {
        None
    } else {
        let page_size = args
            .page_size
            .unwrap_or(ctx.config.search.default_page_size);
        Some(service.get_page(&response.results_id, args.page, page_size).await?)
    };

    let (results, page_number) =
        page.as_ref().map_or((&response.first_page, 1), |p| (&p.results, p.page));
    print_results(
        &response.results_id,
        Some(&args.query),
        response.total,
        page_number,
        results,
        ctx.json,
    )?;
    if !ctx.json {
        println!(
            "fetch more with: glossa page {} <page>",
            response.results_id
        );
    }
    Ok(response.results_id)
}

/// `glossa page`
///
/// Pure cache read: reopens the persisted snapshot, no corpus needed.
pub async fn page(args: PageArgs, ctx: &Context) -> Result<()> {
    let service = SearchService::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(ResultCacheFile::new(&ctx.data_dir)),
        ctx.config.search.clone(),
    );
    let page_size = args
        .page_size
        .unwrap_or(ctx.config.search.default_page_size);
    let page = service
        .get_page(&args.results_id, args.page, page_size)
        .await?;
    print_results(
        &args.results_id,
        None,
        page.total,
        page.page,
        &page.results,
        ctx.json,
    )
}

async fn lexicon_storage(ctx: &Context) -> Result<(Arc<MemoryStorage>, LexiconFile)> {
    let storage = Arc::new(MemoryStorage::new());
    let file = LexiconFile::new(&ctx.data_dir);
    file.load_into(&storage).await?;
    Ok((storage, file))
}

fn lexicon_service(storage: Arc<MemoryStorage>, config: &Config) -> Result<Arc<LexiconService>> {
    let search = Arc::new(SearchService::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(MemoryCache::new()),
        config.search.clone(),
    ));
    let llm = Arc::new(HttpLlmClient::new(&config.llm)?);
    Ok(Arc::new(LexiconService::new(
        storage,
        search,
        llm,
        config.lexicon.clone(),
        config.llm.clone(),
    )))
}

fn print_lexical(value: &glossa_core::LexicalValue, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    }
    println!("{} [{}] version {}", value.lemma, value.language_code, value.version);
    if !value.translation.is_empty() {
        println!("  translation: {}", value.translation);
    }
    if !value.short_description.is_empty() {
        println!("  {}", value.short_description);
    }
    if !value.related_terms.is_empty() {
        println!("  related: {}", value.related_terms.join(", "));
    }
    println!("  citations used: {}", value.citations_used.len());
    Ok(())
}

fn print_task_status(task_id: &str, status: &TaskStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    let state = match status.status {
        TaskState::InProgress => "in progress",
        TaskState::Completed => "completed",
        TaskState::Error => "error",
    };
    println!("task {task_id}: {state}");
    println!("  {}", status.message);
    if let Some(entry) = &status.entry {
        print_lexical(entry, false)?;
    }
    Ok(())
}

/// `glossa lexicon create`
///
/// Prints the task id as soon as the task starts, records its status
/// under the data directory for `lexicon status`, then waits for the
/// task to settle. Returns the task id.
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
pub async fn lexicon_create(
    lemma: &str,
    sources: &[PathBuf],
    structures: Option<PathBuf>,
    language: String,
    surface: bool,
    no_analyze: bool,
    ctx: &Context,
) -> Result<String> {
    if sources.is_empty() {
        bail!("lexicon create needs at least one --source file for citation context");
    }
    let (storage, _) = ingest_sources(sources, structures.as_deref(), &ctx.config).await?;

    // Corpus was just ingested fresh; layer the persisted lexicon on top.
    let file = LexiconFile::new(&ctx.data_dir);
    file.load_into(&storage).await?;

    let service = lexicon_service(Arc::clone(&storage), &ctx.config)?;
    let task_id = service
        .create_or_update(
            lemma,
            LexiconOptions {
                search_lemma: !surface,
                language_code: language,
                categories: Vec::new(),
                analyze: !no_analyze,
            },
        )
        .await?;
    info!(task_id = %task_id, lemma, "lexical value task started");
    println!("task {task_id} started");

    let tasks = TaskFile::new(&ctx.data_dir);
    tasks.put(&task_id, &service.task_status(&task_id).await?)?;

    let status = loop {
        let status = service.task_status(&task_id).await?;
        if status.status != TaskState::InProgress {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    tasks.put(&task_id, &status)?;

    match status.status {
        TaskState::Completed => {
            let entry = status
                .entry
                .ok_or_else(|| anyhow!("completed task carried no entry"))?;
            file.save_from(&storage).await?;
            print_lexical(&entry, ctx.json)?;
            Ok(task_id)
        },
        _ => bail!("lexical value task failed: {}", status.message),
    }
}

/// `glossa lexicon status`
pub async fn lexicon_status(task_id: &str, ctx: &Context) -> Result<()> {
    let tasks = TaskFile::new(&ctx.data_dir);
    let status = tasks
        .get(task_id)?
        .ok_or_else(|| anyhow!("no task '{task_id}'"))?;
    print_task_status(task_id, &status, ctx.json)
}

/// `glossa lexicon get`
pub async fn lexicon_get(lemma: &str, version: Option<&str>, ctx: &Context) -> Result<()> {
    let (storage, _file) = lexicon_storage(ctx).await?;
    let found = match version {
        Some(v) => storage.lexical_version(lemma, v).await?,
        None => storage.latest_lexical(lemma).await?,
    };
    let value = found.ok_or_else(|| anyhow!("no lexical value for '{lemma}'"))?;
    print_lexical(&value, ctx.json)
}

/// `glossa lexicon versions`
pub async fn lexicon_versions(lemma: &str, ctx: &Context) -> Result<()> {
    let (storage, _file) = lexicon_storage(ctx).await?;
    let versions = storage.list_lexical_versions(lemma).await?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }
    if versions.is_empty() {
        println!("no versions for '{lemma}'");
    } else {
        for version in versions {
            println!("{version}");
        }
    }
    Ok(())
}

/// `glossa lexicon delete`
pub async fn lexicon_delete(lemma: &str, yes: bool, ctx: &Context) -> Result<()> {
    let (storage, file) = lexicon_storage(ctx).await?;
    let service = lexicon_service(Arc::clone(&storage), &ctx.config)?;

    let trigger = service.trigger_delete(lemma).await?;
    if !yes {
        println!("would delete latest version of '{lemma}':");
        print_lexical(&trigger.entry, ctx.json)?;
        println!("re-run with --yes to confirm (trigger {})", trigger.trigger_id);
        return Ok(());
    }

    service.delete(lemma, &trigger.trigger_id).await?;
    file.save_from(&storage).await?;
    println!("deleted latest version of '{lemma}' ({})", trigger.trigger_id);
    Ok(())
}

//! End-to-end flows over an ingested corpus: paginated search snapshots
//! and lexical value generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use glossa_core::{
    Config, FoldingAnnotator, IngestPipeline, LexiconOptions, LexiconService, LlmClient,
    MemoryCache, MemoryStorage, Result, SearchOptions, SearchService, Storage, TaskState,
    WorkStructures,
};
use tokio::sync::watch;

fn corpus(sentences: usize) -> String {
    let mut source = String::from("[0627][010]\n");
    for n in 1..=sentences {
        source.push_str(&format!("-Z//1/{n}\tπρότασις {n} περὶ ἄρθρων εἴρηται.\n"));
    }
    source
}

async fn ingested_storage(sentences: usize) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let pipeline = IngestPipeline::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(FoldingAnnotator),
        WorkStructures::new(),
        Config::default().ingest,
    );
    pipeline
        .ingest_bytes(corpus(sentences).as_bytes(), watch::channel(false).1)
        .await
        .expect("ingest succeeds");
    storage
}

#[tokio::test]
async fn paginated_search_over_ingested_corpus() {
    let storage = ingested_storage(234).await;
    let service = SearchService::new(
        storage,
        Arc::new(MemoryCache::new()),
        Config::default().search,
    );

    let response = service
        .search(
            "ἄρθρων",
            SearchOptions {
                search_lemma: false,
                page_size: Some(100),
                ..SearchOptions::default()
            },
        )
        .await
        .expect("search succeeds");
    assert_eq!(response.total, 234);
    assert_eq!(response.first_page.len(), 100);

    let page3 = service
        .get_page(&response.results_id, 3, 100)
        .await
        .expect("page 3");
    assert_eq!(page3.results.len(), 34);
    assert_eq!(page3.total, 234);

    // Past the end while the snapshot is alive: empty list, not an error.
    let page4 = service
        .get_page(&response.results_id, 4, 100)
        .await
        .expect("page 4");
    assert!(page4.results.is_empty());

    // Deterministic ordering across repeated reads.
    let again = service
        .get_page(&response.results_id, 3, 100)
        .await
        .expect("page 3 again");
    assert_eq!(page3.results, again.results);

    // Results carry citation strings built from the ingested hierarchy.
    assert!(page3.results[0]
        .citation_string
        .contains("(Chapter 1, Line"));
}

#[tokio::test]
async fn lemma_search_folds_diacritics() {
    let storage = ingested_storage(3).await;
    let service = SearchService::new(
        storage,
        Arc::new(MemoryCache::new()),
        Config::default().search,
    );

    // The folding annotator lemmatizes "ἄρθρων" to "αρθρων"; a lemma
    // search for the bare form finds it.
    let response = service
        .search(
            "αρθρων",
            SearchOptions {
                search_lemma: true,
                ..SearchOptions::default()
            },
        )
        .await
        .expect("search succeeds");
    assert_eq!(response.total, 3);
}

struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        // Echo the first offered citation back, plus one fabrication the
        // service must drop.
        let cited = prompt
            .lines()
            .find_map(|l| l.strip_prefix("- "))
            .unwrap_or_default();
        Ok(format!(
            r#"{{"translation": "joint",
                "short_description": "A joint of the body.",
                "long_description": "Articulation between bones.",
                "related_terms": ["ὀστέον"],
                "citations_used": ["{cited}", "Nobody, Nothing (Chapter 0, Line 0)"]}}"#
        ))
    }
}

#[tokio::test]
async fn lexical_value_versioning_end_to_end() {
    let storage = ingested_storage(5).await;
    let config = Config::default();
    let search = Arc::new(SearchService::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(MemoryCache::new()),
        config.search.clone(),
    ));
    let service = Arc::new(LexiconService::new(
        storage,
        search,
        Arc::new(CannedLlm),
        config.lexicon,
        config.llm,
    ));

    let opts = LexiconOptions {
        search_lemma: false,
        ..LexiconOptions::default()
    };
    let mut versions = Vec::new();
    for _ in 0..2 {
        let task = service
            .create_or_update("ἄρθρων", opts.clone())
            .await
            .expect("task starts");
        let status = loop {
            let status = service.task_status(&task).await.expect("status readable");
            if status.status != TaskState::InProgress {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(status.status, TaskState::Completed, "{}", status.message);
        versions.push(status.entry.expect("entry").version);
    }

    // Strictly increasing versions, listed newest first.
    assert!(versions[1] > versions[0]);
    let listed = service.list_versions("ἄρθρων").await.expect("versions");
    assert_eq!(listed, vec![versions[1].clone(), versions[0].clone()]);

    let latest = service.get("ἄρθρων", None).await.expect("latest");
    assert_eq!(latest.version, versions[1]);
    assert_eq!(latest.translation, "joint");
    // The fabricated citation was dropped; the real one survived.
    assert_eq!(latest.citations_used.len(), 1);
    assert!(latest.citations_used[0].contains("Chapter 1"));

    let older = service
        .get("ἄρθρων", Some(&versions[0]))
        .await
        .expect("older version");
    assert_eq!(older.version, versions[0]);

    // Two-phase delete removes only the latest pointer.
    let trigger = service.trigger_delete("ἄρθρων").await.expect("trigger");
    service
        .delete("ἄρθρων", &trigger.trigger_id)
        .await
        .expect("delete");
    assert!(service.get("ἄρθρων", None).await.is_err());
    assert!(service.get("ἄρθρων", Some(&versions[0])).await.is_ok());
}

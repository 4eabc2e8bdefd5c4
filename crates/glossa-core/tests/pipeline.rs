//! End-to-end ingestion scenarios: citation parsing through persisted
//! sentences with line provenance.

use std::sync::Arc;

use glossa_core::{
    FoldingAnnotator, HierarchyLevel, IngestConfig, IngestPipeline, MemoryStorage, Sentence,
    SentenceLineLink, Storage, WorkStructure, WorkStructures,
};
use tokio::sync::watch;

fn hippocrates_pipeline(storage: Arc<MemoryStorage>) -> IngestPipeline {
    let mut structures = WorkStructures::new();
    structures.insert(WorkStructure {
        author_id: "0627".to_string(),
        work_id: "010".to_string(),
        levels: vec![HierarchyLevel::Chapter, HierarchyLevel::Line],
    });
    IngestPipeline::new(
        storage,
        Arc::new(FoldingAnnotator),
        structures,
        IngestConfig::default(),
    )
}

fn live() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Rebuild a sentence from its links: ranges concatenate in order, a
/// trailing hyphen elides at the join, other joins take a single space.
async fn reconstruct(storage: &MemoryStorage, sentence: &Sentence) -> String {
    let links: Vec<SentenceLineLink> = storage.links_for_sentence(sentence.id).await;
    let mut out = String::new();
    for link in links {
        let line = storage.line(link.line_id).await.expect("line exists");
        let piece = &line.content[link.position_start..link.position_end];
        if let Some(stem) = out.strip_suffix('-') {
            out = format!("{stem}{piece}");
        } else if out.is_empty() {
            out.push_str(piece);
        } else {
            out.push(' ');
            out.push_str(piece);
        }
    }
    out
}

#[tokio::test]
async fn hyphenated_join_preserves_provenance() {
    let source = "[0627][010]\n\
        -Z//1/1\tὨμου δὲ ἄρθρον ἕνα τρόπον οἶδα ὀλισθάνον, τὸν ἐς τὴν μα-\n\
        -Z//1/2\tσχάλην· ἄνω δὲ οὐδέποτε εἶδον, οὐδὲ ἐς τὸ ἔξω·\n";

    let storage = Arc::new(MemoryStorage::new());
    let report = hippocrates_pipeline(Arc::clone(&storage))
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("ingest succeeds");

    assert_eq!(report.sentences, 2);

    let mut sentences = Vec::new();
    for id in 1..=20 {
        if let Some(sentence) = storage.sentence(id).await {
            sentences.push(sentence);
        }
    }
    assert_eq!(sentences.len(), 2);

    let first = sentences
        .iter()
        .find(|s| s.content.starts_with("Ὠμου"))
        .expect("first sentence");
    assert_eq!(
        first.content,
        "Ὠμου δὲ ἄρθρον ἕνα τρόπον οἶδα ὀλισθάνον, τὸν ἐς τὴν μασχάλην·"
    );
    assert_eq!(storage.links_for_sentence(first.id).await.len(), 2);

    let second = sentences
        .iter()
        .find(|s| s.content.starts_with("ἄνω"))
        .expect("second sentence");
    assert_eq!(second.content, "ἄνω δὲ οὐδέποτε εἶδον, οὐδὲ ἐς τὸ ἔξω·");
    assert_eq!(storage.links_for_sentence(second.id).await.len(), 1);

    // Replaying every sentence's line ranges reproduces its content.
    for sentence in &sentences {
        assert_eq!(reconstruct(&storage, sentence).await, sentence.content);
    }
}

#[tokio::test]
async fn title_parts_accumulate_into_title_division() {
    let source = "[0627][010]\n\
        -Z//641a/t\tΠΕΡΙ\n\
        -Z//641a/t1\tΑΡΘΡΩΝ\n\
        -Z//641a/1\tΤὸ μὲν οὖν ἄρθρον τόδε.\n";

    let storage = Arc::new(MemoryStorage::new());
    let mut structures = WorkStructures::new();
    structures.insert(WorkStructure {
        author_id: "0627".to_string(),
        work_id: "010".to_string(),
        levels: vec![HierarchyLevel::Section, HierarchyLevel::Line],
    });
    let pipeline = IngestPipeline::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(FoldingAnnotator),
        structures,
        IngestConfig::default(),
    );
    pipeline
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("ingest succeeds");

    let divisions = storage.divisions_for_text(2).await;
    assert_eq!(divisions.len(), 2);

    let title = divisions.iter().find(|d| d.is_title).expect("title division");
    assert_eq!(title.title_text.as_deref(), Some("ΠΕΡΙ ΑΡΘΡΩΝ"));
    assert_eq!(title.section.as_deref(), Some("641a"));
    assert!(storage.lines_for_division(title.id).await.is_empty());

    let body = divisions.iter().find(|d| !d.is_title).expect("body division");
    let lines = storage.lines_for_division(body.id).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].line_number, 1);
}

#[tokio::test]
async fn division_boundary_change_resets_line_numbers() {
    let source = "[0627][010]\n\
        -Z//1/1\tπρῶτον κεφάλαιον ἄρχεται.\n\
        -Z//1/2\tκαὶ συνεχίζεται.\n\
        -Z//2/1\tδεύτερον κεφάλαιον ἄρχεται.\n";

    let storage = Arc::new(MemoryStorage::new());
    hippocrates_pipeline(Arc::clone(&storage))
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("ingest succeeds");

    let divisions = storage.divisions_for_text(2).await;
    assert_eq!(divisions.len(), 2);
    assert_eq!(divisions[0].chapter.as_deref(), Some("1"));
    assert_eq!(divisions[1].chapter.as_deref(), Some("2"));

    // Line numbers are contiguous from 1 within each division.
    for division in &divisions {
        let lines = storage.lines_for_division(division.id).await;
        let numbers: Vec<u32> = lines.iter().map(|l| l.line_number).collect();
        let expected: Vec<u32> = (1..=u32::try_from(lines.len()).unwrap()).collect();
        assert_eq!(numbers, expected);
    }
}

#[tokio::test]
async fn sentences_span_division_boundaries() {
    // The sentence starts in chapter 1 and terminates in chapter 2.
    let source = "[0627][010]\n\
        -Z//1/1\tἡ πρότασις ἄρχεται ὧδε\n\
        -Z//2/1\tκαὶ τελευτᾷ ἐνθάδε.\n";

    let storage = Arc::new(MemoryStorage::new());
    let report = hippocrates_pipeline(Arc::clone(&storage))
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("ingest succeeds");

    assert_eq!(report.divisions, 2);
    assert_eq!(report.sentences, 1);

    let mut sentence = None;
    for id in 1..=20 {
        if let Some(s) = storage.sentence(id).await {
            sentence = Some(s);
        }
    }
    let sentence = sentence.expect("one sentence");
    let links = storage.links_for_sentence(sentence.id).await;
    assert_eq!(links.len(), 2);
    assert_eq!(reconstruct(&storage, &sentence).await, sentence.content);
}

#[tokio::test]
async fn reingest_produces_identical_corpus() {
    let source = "[0627][010]\n\
        -Z//1/1\tπρῶτον. δεύτερον ἄρχεται ἐν τῇ μα-\n\
        -Z//1/2\tκρᾷ γραμμῇ.\n\
        -Z//2/1\tτρίτον τέλος.\n";

    let storage = Arc::new(MemoryStorage::new());
    let pipeline = hippocrates_pipeline(Arc::clone(&storage));

    let first = pipeline
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("first ingest");
    let first_contents = collect_sentence_contents(&storage).await;

    let second = pipeline
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("second ingest");
    let second_contents = collect_sentence_contents(&storage).await;

    assert_eq!(first.divisions, second.divisions);
    assert_eq!(first.lines, second.lines);
    assert_eq!(first.sentences, second.sentences);
    assert_eq!(storage.division_count().await, first.divisions);
    assert_eq!(storage.line_count().await, first.lines);
    assert_eq!(storage.sentence_count().await, first.sentences);
    // Same sentence set modulo ids.
    assert_eq!(first_contents, second_contents);
}

async fn collect_sentence_contents(storage: &MemoryStorage) -> Vec<String> {
    let mut contents = Vec::new();
    for id in 1..=200 {
        if let Some(sentence) = storage.sentence(id).await {
            contents.push(sentence.content);
        }
    }
    contents.sort();
    contents
}

#[tokio::test]
async fn multiple_works_in_one_file() {
    let source = "[0627][010]\n\
        -Z//1/1\tπρῶτον ἔργον.\n\
        [0627][012]\n\
        -Z//1/1\tδεύτερον ἔργον.\n";

    let storage = Arc::new(MemoryStorage::new());
    let report = hippocrates_pipeline(Arc::clone(&storage))
        .ingest_bytes(source.as_bytes(), live())
        .await
        .expect("ingest succeeds");

    assert_eq!(report.authors, 1);
    assert_eq!(report.texts, 2);
    assert_eq!(report.divisions, 2);
    assert_eq!(report.sentences, 2);
}

#[tokio::test]
async fn ingest_file_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("corpus.txt");
    std::fs::write(&path, "[0627][010]\n-Z//1/1\tἓν μόνον.\n").expect("write");

    let storage = Arc::new(MemoryStorage::new());
    let report = hippocrates_pipeline(Arc::clone(&storage))
        .ingest_file(&path, live())
        .await
        .expect("ingest succeeds");
    assert_eq!(report.sentences, 1);
}

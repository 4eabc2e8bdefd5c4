//! Ingestion driver: source file to persisted corpus.
//!
//! Wires the synchronous pipeline stages together under async control:
//! the citation parser decodes each line, the division ingestor groups
//! lines into divisions, and the sentence reconstructor assembles
//! sentences once lines have storage ids. Sentences are annotated through
//! the NLP pool and persisted in emission order.
//!
//! Parsing and integrity failures are collected into the returned
//! [`IngestReport`] instead of halting the job, up to a configured error
//! rate. Re-ingesting the same file is idempotent: each text's content is
//! cleared before its divisions are written. A cancellation signal is
//! honored at every suspension point; state is left at the last completed
//! sentence/division boundary.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::citation::{CitationParser, ParsedLine};
use crate::config::IngestConfig;
use crate::division::{CompletedDivision, DivisionIngestor};
use crate::nlp::{AnnotationPool, NlpAnnotator};
use crate::sentence::{AssembledSentence, SentenceReconstructor};
use crate::storage::{NewDivision, NewLine, NewLink, NewSentence, Storage};
use crate::types::{Citation, HierarchyValue, TextId, WorkStructures};
use crate::util::with_timeout;
use crate::{Error, Result};

/// Minimum lines processed before the error-rate threshold can abort.
const ERROR_RATE_GRACE: usize = 10;

/// One collected ingestion problem.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    /// Error kind identifier (`citation_format`, `encoding`,
    /// `division_integrity`).
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// 1-based source file line, when attributable.
    pub line: Option<usize>,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Source lines read (excluding blanks).
    pub source_lines: usize,
    /// Distinct authors touched.
    pub authors: usize,
    /// Distinct texts touched.
    pub texts: usize,
    /// Divisions written.
    pub divisions: usize,
    /// Lines written.
    pub lines: usize,
    /// Sentences written.
    pub sentences: usize,
    /// Collected problems.
    pub issues: Vec<IngestIssue>,
}

/// Per-text ingestion state.
struct TextState {
    text_id: TextId,
    reconstructor: SentenceReconstructor,
}

/// The ingestion driver.
///
/// Owns its collaborators explicitly; nothing here is process-global.
pub struct IngestPipeline {
    storage: Arc<dyn Storage>,
    nlp: AnnotationPool,
    structures: WorkStructures,
    config: IngestConfig,
}

impl IngestPipeline {
    /// Create a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        annotator: Arc<dyn NlpAnnotator>,
        structures: WorkStructures,
        config: IngestConfig,
    ) -> Self {
        let nlp = AnnotationPool::new(annotator, config.nlp_concurrency);
        Self {
            storage,
            nlp,
            structures,
            config,
        }
    }

    /// Ingest a UTF-8 source file.
    pub async fn ingest_file(
        &self,
        path: &Path,
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestReport> {
        let bytes = tokio::fs::read(path).await?;
        info!(path = %path.display(), bytes = bytes.len(), "ingesting source file");
        self.ingest_bytes(&bytes, cancel).await
    }

    /// Ingest raw source bytes.
    ///
    /// Lines with invalid UTF-8 are skipped with an `encoding` issue; they
    /// contribute to no sentence and leave a logged gap.
    #[allow(clippy::too_many_lines)]
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestReport> {
        let mut parser = CitationParser::new(self.structures.clone());
        let mut ingestor = DivisionIngestor::new();
        let mut report = IngestReport::default();
        let mut author_codes: HashSet<String> = HashSet::new();
        let mut text_codes: HashSet<(String, String)> = HashSet::new();
        let mut state: Option<TextState> = None;

        for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let source_line = index + 1;
            let Ok(line) = std::str::from_utf8(raw) else {
                warn!(source_line, "skipping line with invalid UTF-8");
                report.issues.push(IngestIssue {
                    kind: "encoding".to_string(),
                    message: "invalid UTF-8 in source line".to_string(),
                    line: Some(source_line),
                });
                report.source_lines += 1;
                self.check_error_rate(&report)?;
                continue;
            };

            match parser.parse_line(line) {
                Ok(ParsedLine::Blank) => {},
                Ok(ParsedLine::Header { author_id, work_id }) => {
                    report.source_lines += 1;
                    // Flush the previous text before switching works.
                    self.flush_text(&mut ingestor, &mut state, &mut report, &cancel)
                        .await?;
                    author_codes.insert(author_id.clone());
                    text_codes.insert((author_id.clone(), work_id.clone()));
                    let text_id = self.open_text(&author_id, &work_id, &cancel).await?;
                    state = Some(TextState {
                        text_id,
                        reconstructor: SentenceReconstructor::new(
                            self.config.abbreviations.clone(),
                        ),
                    });
                },
                Ok(ParsedLine::Content(content)) => {
                    report.source_lines += 1;
                    let closed = ingestor.push(&content.citation, &content.text);
                    if let Some(title) = &content.inline_title {
                        ingestor.attach_inline_title(title);
                    }
                    for division in closed {
                        self.persist_division(division, &mut state, &mut report, &cancel)
                            .await?;
                    }
                },
                Ok(ParsedLine::Plain(text)) => {
                    report.source_lines += 1;
                    // A line without markup continues the previous citation.
                    if let Some(citation) = parser.last_citation().map(Citation::clone) {
                        let mut inherited = citation;
                        inherited.is_title = false;
                        inherited.title_number = None;
                        let closed = ingestor.push(&inherited, &text);
                        for division in closed {
                            self.persist_division(division, &mut state, &mut report, &cancel)
                                .await?;
                        }
                    } else {
                        report.issues.push(IngestIssue {
                            kind: "citation_format".to_string(),
                            message: "line carries no citation and none precedes it"
                                .to_string(),
                            line: Some(source_line),
                        });
                        self.check_error_rate(&report)?;
                    }
                },
                Err(e) => {
                    report.source_lines += 1;
                    warn!(source_line, error = %e, "skipping malformed line");
                    report.issues.push(IngestIssue {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        line: Some(source_line),
                    });
                    self.check_error_rate(&report)?;
                },
            }
        }

        self.flush_text(&mut ingestor, &mut state, &mut report, &cancel)
            .await?;

        report.authors = author_codes.len();
        report.texts = text_codes.len();
        info!(
            lines = report.lines,
            sentences = report.sentences,
            issues = report.issues.len(),
            "ingestion complete"
        );
        Ok(report)
    }

    /// Abort when the collected error rate exceeds the configured
    /// threshold.
    fn check_error_rate(&self, report: &IngestReport) -> Result<()> {
        if report.source_lines < ERROR_RATE_GRACE {
            return Ok(());
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = report.issues.len() as f64 / report.source_lines as f64;
        if rate > self.config.error_rate_threshold {
            return Err(Error::Validation(format!(
                "ingestion error rate {rate:.2} exceeds threshold {:.2} after {} lines",
                self.config.error_rate_threshold, report.source_lines
            )));
        }
        Ok(())
    }

    async fn open_text(
        &self,
        author_code: &str,
        work_code: &str,
        cancel: &watch::Receiver<bool>,
    ) -> Result<TextId> {
        ensure_live(cancel)?;
        let timeout = Duration::from_secs(self.config.storage_timeout_seconds);
        let author_id = with_timeout(
            timeout,
            "author upsert",
            self.storage
                .upsert_author(author_code, author_code, &self.config.language_code),
        )
        .await?;
        let text_id = with_timeout(
            timeout,
            "text upsert",
            self.storage
                .upsert_text(author_id, work_code, work_code, BTreeMap::new()),
        )
        .await?;
        with_timeout(
            timeout,
            "text content clear",
            self.storage.clear_text_content(text_id),
        )
        .await?;
        Ok(text_id)
    }

    /// Flush the reconstructor's trailing sentence for the current text.
    async fn flush_text(
        &self,
        ingestor: &mut DivisionIngestor,
        state: &mut Option<TextState>,
        report: &mut IngestReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        if let Some(division) = ingestor.finish() {
            self.persist_division(division, state, report, cancel).await?;
        }
        if let Some(text_state) = state.as_mut() {
            if let Some(sentence) = text_state.reconstructor.finish() {
                let text_id = text_state.text_id;
                self.persist_sentence(text_id, sentence, report, cancel).await?;
            }
        }
        *state = None;
        Ok(())
    }

    async fn persist_division(
        &self,
        division: CompletedDivision,
        state: &mut Option<TextState>,
        report: &mut IngestReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        ensure_live(cancel)?;
        let Some(text_state) = state.as_mut() else {
            // Divisions can only arise from content lines, which require a
            // header; an orphan here means the caller lost the text state.
            return Err(Error::Storage(
                "division completed outside any text".to_string(),
            ));
        };
        let text_id = text_state.text_id;

        for issue in &division.issues {
            report.issues.push(IngestIssue {
                kind: "division_integrity".to_string(),
                message: issue.clone(),
                line: None,
            });
        }
        self.check_error_rate(report)?;

        let timeout = Duration::from_secs(self.config.storage_timeout_seconds);
        let hierarchy: Vec<HierarchyValue> = division
            .key
            .coords
            .iter()
            .map(|(level, value)| HierarchyValue {
                level: *level,
                value: value.clone(),
            })
            .collect();
        let division_id = with_timeout(
            timeout,
            "division insert",
            self.storage.insert_division(
                text_id,
                NewDivision {
                    author_id_field: division.key.author_id.clone(),
                    work_number_field: division.key.work_id.clone(),
                    epithet_field: division.key.epithet.clone(),
                    fragment_field: division.key.fragment.clone(),
                    hierarchy,
                    line: division.line_field.clone(),
                    is_title: division.is_title,
                    title_number: division.title_number,
                    title_text: division.title_text.clone(),
                },
            ),
        )
        .await?;
        report.divisions += 1;

        if division.lines.is_empty() {
            return Ok(());
        }

        ensure_live(cancel)?;
        let new_lines: Vec<NewLine> = division
            .lines
            .iter()
            .map(|l| NewLine {
                line_number: l.number,
                content: l.content.clone(),
            })
            .collect();
        let line_ids = with_timeout(
            timeout,
            "line insert",
            self.storage.insert_lines(division_id, new_lines),
        )
        .await?;
        report.lines += line_ids.len();

        for (pending, line_id) in division.lines.iter().zip(line_ids) {
            let sentences = text_state
                .reconstructor
                .push_line(line_id, &pending.content);
            for sentence in sentences {
                self.persist_sentence(text_id, sentence, report, cancel).await?;
            }
        }
        Ok(())
    }

    async fn persist_sentence(
        &self,
        text_id: TextId,
        sentence: AssembledSentence,
        report: &mut IngestReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        ensure_live(cancel)?;
        // Categories are re-derived from the joined text, not unioned from
        // the source lines.
        let annotation = self.nlp.annotate(&sentence.content).await?;
        let mut categories = annotation.categories;
        categories.dedup();

        ensure_live(cancel)?;
        let links: Vec<NewLink> = sentence
            .spans
            .iter()
            .map(|span| NewLink {
                line_id: span.line_id,
                position_start: span.position_start,
                position_end: span.position_end,
            })
            .collect();
        with_timeout(
            Duration::from_secs(self.config.storage_timeout_seconds),
            "sentence insert",
            self.storage.insert_sentence(
                text_id,
                NewSentence {
                    content: sentence.content.clone(),
                    start_position: sentence.start_position(),
                    end_position: sentence.end_position(),
                    tokens: annotation.tokens,
                    categories,
                },
                links,
            ),
        )
        .await?;
        report.sentences += 1;
        Ok(())
    }
}

fn ensure_live(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        Err(Error::Cancelled("ingestion cancelled".to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::nlp::FoldingAnnotator;
    use crate::storage::MemoryStorage;
    use crate::types::{HierarchyLevel, WorkStructure};

    fn pipeline(storage: Arc<MemoryStorage>) -> IngestPipeline {
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

    fn not_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    const HYPHEN_SOURCE: &str = "[0627][010]\n\
        -Z//1/1\tὨμου δὲ ἄρθρον ἕνα τρόπον οἶδα ὀλισθάνον, τὸν ἐς τὴν μα-\n\
        -Z//1/2\tσχάλην· ἄνω δὲ οὐδέποτε εἶδον, οὐδὲ ἐς τὸ ἔξω·\n";

    #[tokio::test]
    async fn test_hyphenated_ingest_end_to_end() {
        let storage = Arc::new(MemoryStorage::new());
        let report = pipeline(Arc::clone(&storage))
            .ingest_bytes(HYPHEN_SOURCE.as_bytes(), not_cancelled())
            .await
            .unwrap();

        assert_eq!(report.authors, 1);
        assert_eq!(report.texts, 1);
        assert_eq!(report.divisions, 1);
        assert_eq!(report.lines, 2);
        assert_eq!(report.sentences, 2);
        assert!(report.issues.is_empty());

        assert_eq!(storage.sentence_count().await, 2);
        // The first sentence joined the hyphenated word and spans both lines.
        let mut found_join = false;
        for id in 1..=10 {
            if let Some(sentence) = storage.sentence(id).await {
                if sentence.content.contains("μασχάλην") {
                    found_join = true;
                    let links = storage.links_for_sentence(id).await;
                    assert_eq!(links.len(), 2);
                }
            }
        }
        assert!(found_join, "hyphen join missing from persisted sentences");
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = pipeline(Arc::clone(&storage));

        pipeline
            .ingest_bytes(HYPHEN_SOURCE.as_bytes(), not_cancelled())
            .await
            .unwrap();
        let first = (
            storage.division_count().await,
            storage.line_count().await,
            storage.sentence_count().await,
        );

        pipeline
            .ingest_bytes(HYPHEN_SOURCE.as_bytes(), not_cancelled())
            .await
            .unwrap();
        let second = (
            storage.division_count().await,
            storage.line_count().await,
            storage.sentence_count().await,
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_collected_not_fatal() {
        let source = "[0627][010]\n\
            -Z//1/1\tκαλὴ πρότασις.\n\
            -Z/broken no tab\n\
            -Z//1/2\tἄλλη πρότασις.\n";
        let storage = Arc::new(MemoryStorage::new());
        let report = pipeline(Arc::clone(&storage))
            .ingest_bytes(source.as_bytes(), not_cancelled())
            .await
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, "citation_format");
        assert_eq!(report.issues[0].line, Some(3));
        assert_eq!(report.sentences, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let mut source = b"[0627][010]\n".to_vec();
        source.extend_from_slice(b"-Z//1/1\t\xff\xfe broken\n");
        source.extend_from_slice("-Z//1/2\tκαλὴ πρότασις.\n".as_bytes());

        let storage = Arc::new(MemoryStorage::new());
        let report = pipeline(Arc::clone(&storage))
            .ingest_bytes(&source, not_cancelled())
            .await
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, "encoding");
        assert_eq!(report.lines, 1);
    }

    #[tokio::test]
    async fn test_error_rate_threshold_aborts() {
        let mut source = String::from("[0627][010]\n");
        for _ in 0..20 {
            source.push_str("-Z/broken no tab\n");
        }
        let storage = Arc::new(MemoryStorage::new());
        let err = pipeline(storage)
            .ingest_bytes(source.as_bytes(), not_cancelled())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_cancellation_stops_ingestion() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let storage = Arc::new(MemoryStorage::new());
        let err = pipeline(storage)
            .ingest_bytes(HYPHEN_SOURCE.as_bytes(), rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn test_title_division_flow() {
        let source = "[0627][010]\n\
            -Z//641a/t\tΠΕΡΙ\n\
            -Z//641a/t1\tΑΡΘΡΩΝ\n\
            -Z//641a/1\tΤὸ μὲν οὖν ἄρθρον.\n";
        let storage = Arc::new(MemoryStorage::new());

        // A section-only structure exercises the chapter defaulting rule.
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

        let report = pipeline
            .ingest_bytes(source.as_bytes(), not_cancelled())
            .await
            .unwrap();
        assert_eq!(report.divisions, 2);

        let divisions = storage.divisions_for_text(2).await;
        assert_eq!(divisions.len(), 2);
        let title = divisions.iter().find(|d| d.is_title).unwrap();
        assert_eq!(title.title_text.as_deref(), Some("ΠΕΡΙ ΑΡΘΡΩΝ"));
        assert!(title.section.as_deref() == Some("641a"));
        let body = divisions.iter().find(|d| !d.is_title).unwrap();
        assert_eq!(body.section.as_deref(), Some("641a"));
    }

    #[tokio::test]
    async fn test_plain_line_inherits_citation() {
        let source = "[0627][010]\n\
            -Z//1/1\tπρῶτος στίχος\n\
            δεύτερος στίχος.\n";
        let storage = Arc::new(MemoryStorage::new());
        let report = pipeline(Arc::clone(&storage))
            .ingest_bytes(source.as_bytes(), not_cancelled())
            .await
            .unwrap();

        assert!(report.issues.is_empty());
        assert_eq!(report.lines, 2);
        assert_eq!(report.sentences, 1);
    }
}

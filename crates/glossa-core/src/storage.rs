//! Storage boundary for the corpus data model.
//!
//! The relational engine is an external collaborator; glossa talks to it
//! through the [`Storage`] trait, which realizes the corpus entities
//! (author, text, division, line, sentence, sentence-line association) and
//! the versioned lexicon store. [`MemoryStorage`] is the built-in
//! implementation used by tests and the CLI.
//!
//! Ingestion writes are idempotent at the text level: the driver clears a
//! text's content before re-ingesting it, so running the same source file
//! twice produces the same division/line/sentence set.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::nlp::fold_lemma;
use crate::types::{
    Author, AuthorId, Citation, Division, DivisionId, HierarchyLevel, HierarchyValue,
    LexicalValue, Line, LineId, ResultContext, ResultLocation, ResultSource, SearchResult,
    Sentence, SentenceId, SentenceLineLink, TextId, TextRecord, Token,
};
use crate::{Error, Result};

/// A division ready for insertion.
#[derive(Debug, Clone)]
pub struct NewDivision {
    /// Citation author field.
    pub author_id_field: String,
    /// Citation work field.
    pub work_number_field: String,
    /// Optional citation epithet.
    pub epithet_field: Option<String>,
    /// Optional citation fragment.
    pub fragment_field: Option<String>,
    /// Structural coordinates, line excluded, in descriptor order.
    pub hierarchy: Vec<HierarchyValue>,
    /// Citation-declared line value of the first line.
    pub line: Option<String>,
    /// Whether this is a title division.
    pub is_title: bool,
    /// Title part number, for title divisions.
    pub title_number: Option<u32>,
    /// Finalized title text.
    pub title_text: Option<String>,
}

/// A content line ready for insertion.
#[derive(Debug, Clone)]
pub struct NewLine {
    /// 1-based number within the division.
    pub line_number: u32,
    /// Cleaned line text.
    pub content: String,
}

/// A sentence ready for insertion.
#[derive(Debug, Clone)]
pub struct NewSentence {
    /// Joined sentence text.
    pub content: String,
    /// Offset within the first source line.
    pub start_position: usize,
    /// Offset within the last source line (exclusive).
    pub end_position: usize,
    /// Token annotations from the joined text.
    pub tokens: Vec<Token>,
    /// Deduplicated categories from the joined text.
    pub categories: Vec<String>,
}

/// A sentence-line association ready for insertion.
#[derive(Debug, Clone)]
pub struct NewLink {
    /// Contributing line.
    pub line_id: LineId,
    /// Start of the contributed range within the line.
    pub position_start: usize,
    /// End of the contributed range within the line (exclusive).
    pub position_end: usize,
}

/// A sentence search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Term to match.
    pub query: String,
    /// Match token lemmas instead of surface forms.
    pub search_lemma: bool,
    /// Restrict to sentences sharing at least one of these categories.
    pub categories: Vec<String>,
}

/// Persistent store boundary.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create or fetch an author by reference code. Only `name` may change
    /// on subsequent calls.
    async fn upsert_author(
        &self,
        reference_code: &str,
        name: &str,
        language_code: &str,
    ) -> Result<AuthorId>;

    /// Create or fetch a text by `(author, work_reference_code)`.
    async fn upsert_text(
        &self,
        author_id: AuthorId,
        reference_code: &str,
        title: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<TextId>;

    /// Remove a text's divisions, lines, sentences, and links ahead of
    /// re-ingestion.
    async fn clear_text_content(&self, text_id: TextId) -> Result<()>;

    /// Insert a division.
    async fn insert_division(&self, text_id: TextId, division: NewDivision)
        -> Result<DivisionId>;

    /// Insert a division's lines in order, returning their ids.
    async fn insert_lines(
        &self,
        division_id: DivisionId,
        lines: Vec<NewLine>,
    ) -> Result<Vec<LineId>>;

    /// Insert a sentence with its line associations.
    async fn insert_sentence(
        &self,
        text_id: TextId,
        sentence: NewSentence,
        links: Vec<NewLink>,
    ) -> Result<SentenceId>;

    /// Search persisted sentences.
    ///
    /// Results are ordered by `(author code, text code, division order,
    /// first source line number, start position)`, ties broken by sentence
    /// id, so repeated searches return identical lists.
    async fn search_sentences(&self, query: &SearchQuery) -> Result<Vec<SearchResult>>;

    /// Latest lexical value for a lemma, if any.
    async fn latest_lexical(&self, lemma: &str) -> Result<Option<LexicalValue>>;

    /// A specific lexical value version.
    async fn lexical_version(&self, lemma: &str, version: &str)
        -> Result<Option<LexicalValue>>;

    /// Version strings for a lemma, descending.
    async fn list_lexical_versions(&self, lemma: &str) -> Result<Vec<String>>;

    /// Append a lexical value version and move the latest pointer to it.
    async fn put_lexical(&self, value: LexicalValue) -> Result<()>;

    /// Remove the latest pointer for a lemma. Versions stay retrievable.
    async fn drop_latest_lexical(&self, lemma: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    authors: HashMap<AuthorId, Author>,
    author_codes: HashMap<String, AuthorId>,
    texts: HashMap<TextId, TextRecord>,
    text_codes: HashMap<(AuthorId, String), TextId>,
    divisions: HashMap<DivisionId, Division>,
    divisions_by_text: HashMap<TextId, Vec<DivisionId>>,
    lines: HashMap<LineId, Line>,
    lines_by_division: HashMap<DivisionId, Vec<LineId>>,
    sentences: HashMap<SentenceId, Sentence>,
    sentences_by_text: HashMap<TextId, Vec<SentenceId>>,
    links_by_sentence: HashMap<SentenceId, Vec<SentenceLineLink>>,
    lexical_versions: HashMap<String, BTreeMap<String, LexicalValue>>,
    lexical_latest: HashMap<String, String>,
}

impl Inner {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory reference implementation of [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted divisions, for inspection.
    pub async fn division_count(&self) -> usize {
        self.inner.read().await.divisions.len()
    }

    /// Number of persisted lines, for inspection.
    pub async fn line_count(&self) -> usize {
        self.inner.read().await.lines.len()
    }

    /// Number of persisted sentences, for inspection.
    pub async fn sentence_count(&self) -> usize {
        self.inner.read().await.sentences.len()
    }

    /// Fetch a sentence by id, for inspection.
    pub async fn sentence(&self, id: SentenceId) -> Option<Sentence> {
        self.inner.read().await.sentences.get(&id).cloned()
    }

    /// Fetch a line by id, for inspection.
    pub async fn line(&self, id: LineId) -> Option<Line> {
        self.inner.read().await.lines.get(&id).cloned()
    }

    /// Links for a sentence in contribution order, for inspection.
    pub async fn links_for_sentence(&self, id: SentenceId) -> Vec<SentenceLineLink> {
        self.inner
            .read()
            .await
            .links_by_sentence
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Divisions of a text in source order, for inspection.
    pub async fn divisions_for_text(&self, text_id: TextId) -> Vec<Division> {
        let inner = self.inner.read().await;
        inner
            .divisions_by_text
            .get(&text_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.divisions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot every lexical version and the latest pointers.
    ///
    /// Supports external persistence of the lexicon store; versions come
    /// back in ascending version order per lemma.
    pub async fn lexical_state(&self) -> (Vec<LexicalValue>, BTreeMap<String, String>) {
        let inner = self.inner.read().await;
        let versions = inner
            .lexical_versions
            .values()
            .flat_map(|m| m.values().cloned())
            .collect();
        let latest = inner
            .lexical_latest
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (versions, latest)
    }

    /// Lines of a division in number order, for inspection.
    pub async fn lines_for_division(&self, division_id: DivisionId) -> Vec<Line> {
        let inner = self.inner.read().await;
        inner
            .lines_by_division
            .get(&division_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.lines.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Whether a sentence matches the query term.
fn sentence_matches(sentence: &Sentence, folded_query: &str, search_lemma: bool) -> bool {
    if search_lemma {
        sentence
            .tokens
            .iter()
            .any(|t| fold_lemma(&t.lemma) == folded_query)
    } else {
        sentence
            .tokens
            .iter()
            .any(|t| fold_lemma(&t.text) == folded_query)
    }
}

fn categories_intersect(sentence: &Sentence, requested: &[String]) -> bool {
    requested.is_empty()
        || sentence
            .categories
            .iter()
            .any(|c| requested.iter().any(|r| r == c))
}

/// Rebuild the citation for a sentence from its division plus the first
/// contributing line's per-division number.
fn citation_for(division: &Division, first_line_number: u32) -> Citation {
    let mut hierarchy: Vec<HierarchyValue> = division
        .hierarchy
        .iter()
        .filter(|h| h.level != HierarchyLevel::Line)
        .cloned()
        .collect();
    hierarchy.push(HierarchyValue {
        level: HierarchyLevel::Line,
        value: first_line_number.to_string(),
    });
    Citation {
        author_id: division.author_id_field.clone(),
        work_id: division.work_number_field.clone(),
        epithet: division.epithet_field.clone(),
        fragment: division.fragment_field.clone(),
        hierarchy,
        is_title: division.is_title,
        title_number: division.title_number,
        title_parts: BTreeMap::new(),
        title_text: division.title_text.clone(),
    }
}

fn location_for(citation: &Citation) -> ResultLocation {
    let get = |level| citation.level(level).map(str::to_string);
    ResultLocation {
        volume: get(HierarchyLevel::Volume),
        chapter: get(HierarchyLevel::Chapter),
        section: get(HierarchyLevel::Section),
        book: get(HierarchyLevel::Book),
        page: get(HierarchyLevel::Page),
        fragment: citation
            .fragment
            .clone()
            .or_else(|| get(HierarchyLevel::Fragment)),
        line: get(HierarchyLevel::Line),
        epistle: get(HierarchyLevel::Epistle),
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_author(
        &self,
        reference_code: &str,
        name: &str,
        language_code: &str,
    ) -> Result<AuthorId> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.author_codes.get(reference_code).copied() {
            if let Some(author) = inner.authors.get_mut(&id) {
                author.name = name.to_string();
            }
            return Ok(id);
        }
        let id = inner.next();
        inner.authors.insert(
            id,
            Author {
                id,
                reference_code: reference_code.to_string(),
                name: name.to_string(),
                language_code: language_code.to_string(),
            },
        );
        inner.author_codes.insert(reference_code.to_string(), id);
        debug!(code = reference_code, id, "created author");
        Ok(id)
    }

    async fn upsert_text(
        &self,
        author_id: AuthorId,
        reference_code: &str,
        title: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<TextId> {
        let mut inner = self.inner.write().await;
        if !inner.authors.contains_key(&author_id) {
            return Err(Error::Storage(format!("unknown author id {author_id}")));
        }
        let key = (author_id, reference_code.to_string());
        if let Some(id) = inner.text_codes.get(&key).copied() {
            if let Some(text) = inner.texts.get_mut(&id) {
                text.title = title.to_string();
                if !metadata.is_empty() {
                    text.metadata = metadata;
                }
            }
            return Ok(id);
        }
        let id = inner.next();
        inner.texts.insert(
            id,
            TextRecord {
                id,
                author_id,
                reference_code: reference_code.to_string(),
                title: title.to_string(),
                metadata,
            },
        );
        inner.text_codes.insert(key, id);
        debug!(code = reference_code, id, "created text");
        Ok(id)
    }

    async fn clear_text_content(&self, text_id: TextId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let division_ids = inner.divisions_by_text.remove(&text_id).unwrap_or_default();
        for division_id in division_ids {
            inner.divisions.remove(&division_id);
            for line_id in inner
                .lines_by_division
                .remove(&division_id)
                .unwrap_or_default()
            {
                inner.lines.remove(&line_id);
            }
        }
        for sentence_id in inner.sentences_by_text.remove(&text_id).unwrap_or_default() {
            inner.sentences.remove(&sentence_id);
            inner.links_by_sentence.remove(&sentence_id);
        }
        Ok(())
    }

    async fn insert_division(
        &self,
        text_id: TextId,
        division: NewDivision,
    ) -> Result<DivisionId> {
        let mut inner = self.inner.write().await;
        if !inner.texts.contains_key(&text_id) {
            return Err(Error::Storage(format!("unknown text id {text_id}")));
        }
        let id = inner.next();
        let find = |level: HierarchyLevel| {
            division
                .hierarchy
                .iter()
                .find(|h| h.level == level)
                .map(|h| h.value.clone())
        };
        let record = Division {
            id,
            text_id,
            author_id_field: division.author_id_field,
            work_number_field: division.work_number_field,
            epithet_field: division.epithet_field,
            fragment_field: division.fragment_field,
            volume: find(HierarchyLevel::Volume),
            chapter: find(HierarchyLevel::Chapter),
            section: find(HierarchyLevel::Section),
            line: division.line,
            is_title: division.is_title,
            title_number: division.title_number,
            title_text: division.title_text,
            hierarchy: division.hierarchy,
        };
        inner.divisions.insert(id, record);
        inner.divisions_by_text.entry(text_id).or_default().push(id);
        Ok(id)
    }

    async fn insert_lines(
        &self,
        division_id: DivisionId,
        lines: Vec<NewLine>,
    ) -> Result<Vec<LineId>> {
        let mut inner = self.inner.write().await;
        if !inner.divisions.contains_key(&division_id) {
            return Err(Error::Storage(format!(
                "unknown division id {division_id}"
            )));
        }
        let mut ids = Vec::with_capacity(lines.len());
        for line in lines {
            let id = inner.next();
            inner.lines.insert(
                id,
                Line {
                    id,
                    division_id,
                    line_number: line.line_number,
                    content: line.content,
                    tokens: Vec::new(),
                    categories: Vec::new(),
                },
            );
            inner
                .lines_by_division
                .entry(division_id)
                .or_default()
                .push(id);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_sentence(
        &self,
        text_id: TextId,
        sentence: NewSentence,
        links: Vec<NewLink>,
    ) -> Result<SentenceId> {
        let mut inner = self.inner.write().await;
        if !inner.texts.contains_key(&text_id) {
            return Err(Error::Storage(format!("unknown text id {text_id}")));
        }
        for link in &links {
            if !inner.lines.contains_key(&link.line_id) {
                return Err(Error::Storage(format!("unknown line id {}", link.line_id)));
            }
        }
        let id = inner.next();
        inner.sentences.insert(
            id,
            Sentence {
                id,
                content: sentence.content,
                start_position: sentence.start_position,
                end_position: sentence.end_position,
                tokens: sentence.tokens,
                categories: sentence.categories,
            },
        );
        inner.sentences_by_text.entry(text_id).or_default().push(id);
        inner.links_by_sentence.insert(
            id,
            links
                .into_iter()
                .map(|l| SentenceLineLink {
                    sentence_id: id,
                    line_id: l.line_id,
                    position_start: l.position_start,
                    position_end: l.position_end,
                })
                .collect(),
        );
        Ok(id)
    }

    #[allow(clippy::too_many_lines)]
    async fn search_sentences(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let inner = self.inner.read().await;
        let folded = fold_lemma(&query.query);

        // Sort key per result: author code, text code, division order in
        // the text, first line number, start position, sentence id.
        type SortKey = (String, String, usize, u32, usize, SentenceId);
        let mut matches: Vec<(SortKey, SearchResult)> = Vec::new();

        for (text_id, sentence_ids) in &inner.sentences_by_text {
            let Some(text) = inner.texts.get(text_id) else {
                continue;
            };
            let Some(author) = inner.authors.get(&text.author_id) else {
                continue;
            };
            let division_order: HashMap<DivisionId, usize> = inner
                .divisions_by_text
                .get(text_id)
                .map(|ids| ids.iter().enumerate().map(|(i, id)| (*id, i)).collect())
                .unwrap_or_default();

            for (position, sentence_id) in sentence_ids.iter().enumerate() {
                let Some(sentence) = inner.sentences.get(sentence_id) else {
                    continue;
                };
                if !sentence_matches(sentence, &folded, query.search_lemma)
                    || !categories_intersect(sentence, &query.categories)
                {
                    continue;
                }
                let links = inner
                    .links_by_sentence
                    .get(sentence_id)
                    .cloned()
                    .unwrap_or_default();
                let Some(first_link) = links.first() else {
                    continue;
                };
                let Some(first_line) = inner.lines.get(&first_link.line_id) else {
                    continue;
                };
                let Some(division) = inner.divisions.get(&first_line.division_id) else {
                    continue;
                };

                let citation = citation_for(division, first_line.line_number);
                let citation_string = citation.render(&author.name, &text.title);
                let line_numbers = links
                    .iter()
                    .filter_map(|l| inner.lines.get(&l.line_id))
                    .map(|l| l.line_number)
                    .collect();

                let prev_sentence_text = position
                    .checked_sub(1)
                    .and_then(|p| sentence_ids.get(p))
                    .and_then(|id| inner.sentences.get(id))
                    .map(|s| s.content.clone());
                let next_sentence_text = sentence_ids
                    .get(position + 1)
                    .and_then(|id| inner.sentences.get(id))
                    .map(|s| s.content.clone());

                let key: SortKey = (
                    author.reference_code.clone(),
                    text.reference_code.clone(),
                    division_order.get(&division.id).copied().unwrap_or(0),
                    first_line.line_number,
                    sentence.start_position,
                    sentence.id,
                );
                matches.push((
                    key,
                    SearchResult {
                        sentence_id: sentence.id,
                        sentence_text: sentence.content.clone(),
                        prev_sentence_text,
                        next_sentence_text,
                        citation_string,
                        source: ResultSource {
                            author: author.name.clone(),
                            work: text.title.clone(),
                            author_id: Some(author.reference_code.clone()),
                            work_id: Some(text.reference_code.clone()),
                        },
                        location: location_for(&citation),
                        context: ResultContext {
                            line_id: first_line.id,
                            line_text: first_line.content.clone(),
                            line_numbers,
                        },
                    },
                ));
            }
        }

        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.into_iter().map(|(_, r)| r).collect())
    }

    async fn latest_lexical(&self, lemma: &str) -> Result<Option<LexicalValue>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lexical_latest
            .get(lemma)
            .and_then(|version| inner.lexical_versions.get(lemma)?.get(version))
            .cloned())
    }

    async fn lexical_version(
        &self,
        lemma: &str,
        version: &str,
    ) -> Result<Option<LexicalValue>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lexical_versions
            .get(lemma)
            .and_then(|versions| versions.get(version))
            .cloned())
    }

    async fn list_lexical_versions(&self, lemma: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lexical_versions
            .get(lemma)
            .map(|versions| versions.keys().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_lexical(&self, value: LexicalValue) -> Result<()> {
        let mut inner = self.inner.write().await;
        let lemma = value.lemma.clone();
        let versions = inner.lexical_versions.entry(lemma.clone()).or_default();
        versions.insert(value.version.clone(), value);
        // The pointer tracks the highest version; version strings sort
        // lexicographically in timestamp order.
        if let Some(newest) = versions.keys().next_back().cloned() {
            inner.lexical_latest.insert(lemma, newest);
        }
        Ok(())
    }

    async fn drop_latest_lexical(&self, lemma: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.lexical_latest.remove(lemma).is_none() {
            return Err(Error::NotFound(format!("no lexical value for '{lemma}'")));
        }
        Ok(())
    }
}

//! Core data structures for the glossa corpus pipeline.
//!
//! This module defines the fundamental types used throughout glossa-core for
//! representing citations, text divisions, reconstructed sentences, lexicon
//! entries, and search results.
//!
//! ## Type Categories
//!
//! - **Citation model**: [`Citation`], [`HierarchyLevel`], [`WorkStructure`]
//! - **Corpus entities**: [`Author`], [`TextRecord`], [`Division`], [`Line`],
//!   [`Sentence`], [`SentenceLineLink`]
//! - **Lexicon**: [`LexicalValue`]
//! - **Search results**: [`SearchResult`], [`ResultsMeta`], [`ResultsPage`]
//!
//! ## Serialization
//!
//! All persisted and wire-facing types implement `Serialize`/`Deserialize`.
//! Records that cross the service boundary use `camelCase` field names.
//!
//! ## Examples
//!
//! ### Rendering a canonical citation string:
//!
//! ```rust
//! use glossa_core::{Citation, HierarchyLevel};
//!
//! let mut citation = Citation::new("0627", "010");
//! citation.push_level(HierarchyLevel::Chapter, "1");
//! citation.push_level(HierarchyLevel::Line, "2");
//!
//! let rendered = citation.render("Hippocrates", "De articulis");
//! assert_eq!(rendered, "Hippocrates, De articulis (Chapter 1, Line 2)");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque identifier assigned by the storage boundary.
pub type AuthorId = u64;
/// Identifier for a [`TextRecord`].
pub type TextId = u64;
/// Identifier for a [`Division`].
pub type DivisionId = u64;
/// Identifier for a [`Line`].
pub type LineId = u64;
/// Identifier for a [`Sentence`].
pub type SentenceId = u64;

/// A named structural coordinate of a line inside a work.
///
/// The set is closed: every hierarchy position in a work structure
/// descriptor names one of these levels. Section values may carry letter
/// suffixes (`847a`); the value stays a single verbatim token and is never
/// split by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    /// Volume of a multi-volume edition.
    Volume,
    /// Book within a work.
    Book,
    /// Chapter within a book or work.
    Chapter,
    /// Section, possibly with a letter suffix (e.g. `847a`).
    Section,
    /// Page of the reference edition.
    Page,
    /// Line within the innermost unit.
    Line,
    /// Epistle number for epistolary works.
    Epistle,
    /// Fragment number for fragmentary works.
    Fragment,
}

impl HierarchyLevel {
    /// Lowercase identifier used in structure descriptors and cache records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Book => "book",
            Self::Chapter => "chapter",
            Self::Section => "section",
            Self::Page => "page",
            Self::Line => "line",
            Self::Epistle => "epistle",
            Self::Fragment => "fragment",
        }
    }

    /// Capitalized name used in canonical citation strings.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Volume => "Volume",
            Self::Book => "Book",
            Self::Chapter => "Chapter",
            Self::Section => "Section",
            Self::Page => "Page",
            Self::Line => "Line",
            Self::Epistle => "Epistle",
            Self::Fragment => "Fragment",
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "volume" => Ok(Self::Volume),
            "book" => Ok(Self::Book),
            "chapter" => Ok(Self::Chapter),
            "section" => Ok(Self::Section),
            "page" => Ok(Self::Page),
            "line" => Ok(Self::Line),
            "epistle" => Ok(Self::Epistle),
            "fragment" => Ok(Self::Fragment),
            other => Err(Error::Validation(format!(
                "unknown hierarchy level '{other}'"
            ))),
        }
    }
}

/// One hierarchy coordinate of a citation: a level name and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyValue {
    /// Level name from the work structure descriptor.
    pub level: HierarchyLevel,
    /// Verbatim value, including any letter suffix.
    pub value: String,
}

/// Ordered list of level names for one work.
///
/// Maps hierarchy positions in a TLG reference to level names. Loaded from
/// a TOML descriptor table and consulted by the citation parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkStructure {
    /// TLG author identifier (e.g. `0627`).
    pub author_id: String,
    /// TLG work identifier (e.g. `010`).
    pub work_id: String,
    /// Ordered level names for hierarchy positions in this work.
    pub levels: Vec<HierarchyLevel>,
}

/// Registry of work structure descriptors keyed by `(author_id, work_id)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkStructures {
    /// Descriptor entries.
    #[serde(default)]
    pub structures: Vec<WorkStructure>,
}

impl WorkStructures {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            structures: Vec::new(),
        }
    }

    /// Register a descriptor, replacing any previous entry for the same work.
    pub fn insert(&mut self, structure: WorkStructure) {
        self.structures.retain(|s| {
            !(s.author_id == structure.author_id && s.work_id == structure.work_id)
        });
        self.structures.push(structure);
    }

    /// Look up the level names for a work.
    ///
    /// Returns the default `[chapter, line]` shape when the work has no
    /// registered descriptor, which matches the most common two-level
    /// citation layout in the corpus.
    #[must_use]
    pub fn levels_for(&self, author_id: &str, work_id: &str) -> Vec<HierarchyLevel> {
        self.structures
            .iter()
            .find(|s| s.author_id == author_id && s.work_id == work_id)
            .map_or_else(
                || vec![HierarchyLevel::Chapter, HierarchyLevel::Line],
                |s| s.levels.clone(),
            )
    }

    /// Load descriptors from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// A decoded TLG citation.
///
/// Citations are immutable value objects: the parser produces them, the
/// division ingestor groups by them, and search results render them. The
/// hierarchy preserves descriptor order so canonical strings come out in
/// the right shape without consulting the descriptor again.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Citation {
    /// TLG author identifier inherited from the file header.
    pub author_id: String,
    /// TLG work identifier inherited from the file header.
    pub work_id: String,
    /// Optional epithet attached to the work reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epithet: Option<String>,
    /// Fragment number extracted from `(fr. N)` notation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    /// Ordered hierarchy coordinates.
    pub hierarchy: Vec<HierarchyValue>,
    /// Whether this citation marks a title line.
    pub is_title: bool,
    /// Title part number for `tN` marks; unnumbered `t` maps to `0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_number: Option<u32>,
    /// Accumulated title parts keyed by part number (as strings).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub title_parts: BTreeMap<String, String>,
    /// Finalized title text joined from parts in ascending numeric order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_text: Option<String>,
}

impl Citation {
    /// Create a citation with empty hierarchy for the given work.
    #[must_use]
    pub fn new(author_id: &str, work_id: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            work_id: work_id.to_string(),
            ..Self::default()
        }
    }

    /// Append a hierarchy coordinate.
    pub fn push_level(&mut self, level: HierarchyLevel, value: &str) {
        self.hierarchy.push(HierarchyValue {
            level,
            value: value.to_string(),
        });
    }

    /// Look up a hierarchy value by level name.
    #[must_use]
    pub fn level(&self, level: HierarchyLevel) -> Option<&str> {
        self.hierarchy
            .iter()
            .find(|h| h.level == level)
            .map(|h| h.value.as_str())
    }

    /// Render the canonical citation string.
    ///
    /// Format: `"<Author>, <Work> (<Level1> <V1>, <Level2> <V2>, …)"` with
    /// capitalized level names in descriptor order. A fragment that is not
    /// already a hierarchy coordinate is appended as a trailing level.
    #[must_use]
    pub fn render(&self, author_name: &str, work_title: &str) -> String {
        let mut parts: Vec<String> = self
            .hierarchy
            .iter()
            .map(|h| format!("{} {}", h.level.display_name(), h.value))
            .collect();
        if let Some(fragment) = &self.fragment {
            if self.level(HierarchyLevel::Fragment).is_none() {
                parts.push(format!("Fragment {fragment}"));
            }
        }
        if parts.is_empty() {
            format!("{author_name}, {work_title}")
        } else {
            format!("{author_name}, {work_title} ({})", parts.join(", "))
        }
    }
}

/// An author of one or more texts in the corpus.
///
/// Created once per unique reference code during ingestion; only `name`
/// is ever updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Storage-assigned identifier.
    pub id: AuthorId,
    /// Unique TLG reference code (e.g. `0086`).
    pub reference_code: String,
    /// Display name.
    pub name: String,
    /// ISO language code of the author's texts.
    pub language_code: String,
}

/// A single work owned by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// Storage-assigned identifier.
    pub id: TextId,
    /// Owning author.
    pub author_id: AuthorId,
    /// Work reference code, unique within the author.
    pub reference_code: String,
    /// Display title.
    pub title: String,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// A logical unit of a text: citation fields plus structural coordinates.
///
/// A division is either content-bearing or a title division. Lines within a
/// division carry contiguous ascending `line_number` values starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    /// Storage-assigned identifier.
    pub id: DivisionId,
    /// Owning text.
    pub text_id: TextId,
    /// Citation author field.
    pub author_id_field: String,
    /// Citation work field.
    pub work_number_field: String,
    /// Optional citation epithet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epithet_field: Option<String>,
    /// Optional citation fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_field: Option<String>,
    /// Structural volume coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Structural chapter coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    /// Structural section coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Citation-declared line value, preserved verbatim.
    ///
    /// Does not override the per-division `line_number` counters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Whether this is a title division.
    pub is_title: bool,
    /// Title part number of the first title mark, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_number: Option<u32>,
    /// Finalized title text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_text: Option<String>,
    /// Full hierarchy as decoded from the citation, in descriptor order.
    pub hierarchy: Vec<HierarchyValue>,
}

/// One source line of a division.
///
/// Immutable after ingestion except by explicit re-ingestion. Content keeps
/// a trailing hyphen when the source line breaks a word across lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Storage-assigned identifier.
    pub id: LineId,
    /// Owning division.
    pub division_id: DivisionId,
    /// 1-based position within the division.
    pub line_number: u32,
    /// Normalized text, trailing hyphen intact if present.
    pub content: String,
    /// Per-token NLP annotations, when annotated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
    /// Category labels, when annotated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// A single NLP token with its annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Surface form as it appears in the text.
    pub text: String,
    /// Lemma (dictionary form).
    pub lemma: String,
    /// Part-of-speech tag.
    pub pos: String,
    /// Semantic category label, if the tagger assigned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A reconstructed sentence spanning one or more source lines.
///
/// The atomic unit of NLP annotation and search. `start_position` is the
/// character offset within the first source line where the sentence begins;
/// `end_position` is the offset within the last source line where it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// Storage-assigned identifier.
    pub id: SentenceId,
    /// Joined sentence text with hyphenations resolved.
    pub content: String,
    /// Character offset within the first source line.
    pub start_position: usize,
    /// Character offset within the last source line (exclusive).
    pub end_position: usize,
    /// Token annotations derived from the joined text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
    /// Deduplicated category labels derived from the joined text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// Association between a sentence and one contributing line.
///
/// `(position_start, position_end)` mark the byte range within the line's
/// content that flowed into the sentence. Concatenating a sentence's ranges
/// in order, eliding each trailing hyphen at a join, reconstructs the
/// sentence content. Neither side owns the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceLineLink {
    /// The sentence.
    pub sentence_id: SentenceId,
    /// The contributing line.
    pub line_id: LineId,
    /// Start of the contributed range within the line content.
    pub position_start: usize,
    /// End of the contributed range within the line content (exclusive).
    pub position_end: usize,
}

/// A versioned lexicon entry for a lemma.
///
/// New creations and updates append a new version; older versions are
/// retained and retrievable by explicit version string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexicalValue {
    /// The lemma, unique within its language.
    pub lemma: String,
    /// ISO language code.
    pub language_code: String,
    /// Short translation gloss.
    pub translation: String,
    /// One-sentence description.
    pub short_description: String,
    /// Extended description with usage notes.
    pub long_description: String,
    /// Related lemmas.
    #[serde(default)]
    pub related_terms: Vec<String>,
    /// Canonical citation strings the analysis drew on.
    ///
    /// Always a subset of the citations sampled for the generation prompt.
    #[serde(default)]
    pub citations_used: Vec<String>,
    /// Full result records for the citations used.
    #[serde(default)]
    pub references: Vec<SearchResult>,
    /// Creation timestamp of this version.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp of this version.
    pub updated_at: DateTime<Utc>,
    /// Monotonic version string, `YYYYMMDD_HHMMSS` at commit time.
    pub version: String,
}

/// Source identification for one search result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSource {
    /// Author display name.
    pub author: String,
    /// Work title.
    pub work: String,
    /// TLG author identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// TLG work identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_id: Option<String>,
}

/// Structural location of one search result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLocation {
    /// Volume coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Chapter coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    /// Section coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Book coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<String>,
    /// Page coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Fragment coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    /// Line coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Epistle coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epistle: Option<String>,
}

/// Line-level context for one search result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultContext {
    /// First source line of the sentence.
    pub line_id: LineId,
    /// Content of that line.
    pub line_text: String,
    /// Line numbers of all contributing lines, in source order.
    pub line_numbers: Vec<u32>,
}

/// A single citation-bearing search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Matched sentence.
    pub sentence_id: SentenceId,
    /// Sentence text.
    pub sentence_text: String,
    /// Preceding sentence in the same text, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_sentence_text: Option<String>,
    /// Following sentence in the same text, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sentence_text: Option<String>,
    /// Canonical citation string.
    pub citation_string: String,
    /// Source identification.
    pub source: ResultSource,
    /// Structural location.
    pub location: ResultLocation,
    /// Line-level context.
    pub context: ResultContext,
}

/// Metadata record stored alongside a chunked result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsMeta {
    /// Total number of results in the set.
    pub total: usize,
    /// Page size requested at search time.
    pub page_size_hint: usize,
    /// Snapshot creation time.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub ttl_seconds: u64,
}

/// One page of a cached result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsPage {
    /// Results for this page.
    pub results: Vec<SearchResult>,
    /// 1-based page number.
    pub page: usize,
    /// Page size used for chunk arithmetic.
    pub page_size: usize,
    /// Total results in the set.
    pub total: usize,
}

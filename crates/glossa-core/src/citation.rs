//! TLG citation parsing.
//!
//! Decodes the citation markup used by the source corpus into structured
//! [`Citation`] records. Each file declares its author and work in a header
//! line (`[0627][010]`); content lines carry a citation prefix followed by a
//! literal tab and the line text:
//!
//! ```text
//! -Z//1/2\tσχάλην· ἄνω δὲ οὐδέποτε εἶδον
//! ```
//!
//! The hierarchy between `//` and the tab is a slash- or dot-separated list
//! of values whose positional meaning comes from the per-work structure
//! descriptor. A trailing `t` or `tN` segment marks a title line. Values
//! keep letter suffixes verbatim (`847a` is one token).
//!
//! The parser is a plain synchronous state machine driven line by line; it
//! never suspends. File-level state (current work, last citation for level
//! inheritance) lives in the parser and resets on each header.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::types::{Citation, HierarchyLevel, HierarchyValue, WorkStructures};
use crate::{Error, Result};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\[([0-9A-Za-z]+)\]\[([0-9A-Za-z]+)\]\s*$").expect("valid header regex")
});

static TITLE_MARK_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^t(\d*)$").expect("valid title mark regex")
});

static FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\(fr\.\s*([^\s)]+)\)").expect("valid fragment regex")
});

static INLINE_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{([^}]*)\}").expect("valid inline title regex")
});

/// One decoded source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A file header declaring the author and work for subsequent lines.
    Header {
        /// TLG author identifier.
        author_id: String,
        /// TLG work identifier.
        work_id: String,
    },
    /// A content line with its decoded citation.
    Content(ContentLine),
    /// A line carrying no citation markup.
    ///
    /// The ingestor attaches these to the open division, inheriting the
    /// previous citation wholesale.
    Plain(String),
    /// An empty line.
    Blank,
}

/// A content line: citation, cleaned text, and any inline title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Decoded citation for this line.
    pub citation: Citation,
    /// Line text with all citation markup stripped.
    pub text: String,
    /// Title text found in inline `{ … }` markers, if any.
    pub inline_title: Option<String>,
}

/// Streaming parser for TLG-cited source files.
///
/// Feed lines in source order via [`parse_line`](Self::parse_line). The
/// parser tracks the current work (from headers) and the last decoded
/// citation so absent hierarchy levels inherit from the most recently seen
/// line in the same work.
#[derive(Debug)]
pub struct CitationParser {
    structures: WorkStructures,
    author_id: Option<String>,
    work_id: Option<String>,
    previous: Option<Citation>,
}

impl CitationParser {
    /// Create a parser with the given work structure registry.
    #[must_use]
    pub const fn new(structures: WorkStructures) -> Self {
        Self {
            structures,
            author_id: None,
            work_id: None,
            previous: None,
        }
    }

    /// The author declared by the most recent header, if any.
    #[must_use]
    pub fn current_author(&self) -> Option<&str> {
        self.author_id.as_deref()
    }

    /// The work declared by the most recent header, if any.
    #[must_use]
    pub fn current_work(&self) -> Option<&str> {
        self.work_id.as_deref()
    }

    /// The most recently decoded citation, for lines without markup.
    #[must_use]
    pub const fn last_citation(&self) -> Option<&Citation> {
        self.previous.as_ref()
    }

    /// Decode a single raw source line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CitationFormat`] when the line carries a malformed
    /// citation prefix, or appears before any header. The caller reports
    /// the line and continues; a parse failure never halts ingestion.
    pub fn parse_line(&mut self, raw: &str) -> Result<ParsedLine> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            return Ok(ParsedLine::Blank);
        }

        if let Some(captures) = HEADER_RE.captures(line) {
            let author_id = captures[1].to_string();
            let work_id = captures[2].to_string();
            debug!(author = %author_id, work = %work_id, "file header");
            self.author_id = Some(author_id.clone());
            self.work_id = Some(work_id.clone());
            self.previous = None;
            return Ok(ParsedLine::Header { author_id, work_id });
        }

        if !line.starts_with('-') {
            return Ok(ParsedLine::Plain(normalize(line)));
        }

        self.parse_content(line).map(ParsedLine::Content)
    }

    fn parse_content(&mut self, line: &str) -> Result<ContentLine> {
        let (author_id, work_id) = match (&self.author_id, &self.work_id) {
            (Some(a), Some(w)) => (a.clone(), w.clone()),
            _ => {
                return Err(Error::CitationFormat(
                    "content line before any [author][work] header".to_string(),
                ));
            },
        };

        let Some((prefix, content)) = line.split_once('\t') else {
            return Err(Error::CitationFormat(format!(
                "missing tab separator in '{}'",
                truncate(line)
            )));
        };

        let Some((work_token, hierarchy_path)) = prefix[1..].split_once("//") else {
            return Err(Error::CitationFormat(format!(
                "missing '//' in citation prefix '{prefix}'"
            )));
        };

        let epithet = parse_epithet(work_token);

        let mut segments: Vec<&str> = if hierarchy_path.is_empty() {
            Vec::new()
        } else {
            hierarchy_path.split(['/', '.']).collect()
        };

        let mut is_title = false;
        let mut title_number = None;
        let title_digits: Option<String> = segments
            .last()
            .and_then(|last| TITLE_MARK_RE.captures(last))
            .map(|captures| captures[1].to_string());
        if let Some(digits) = title_digits {
            is_title = true;
            title_number = Some(if digits.is_empty() {
                0
            } else {
                digits.parse::<u32>().map_err(|_| {
                    Error::CitationFormat(format!("title mark out of range in '{prefix}'"))
                })?
            });
            segments.pop();
        }

        let levels = self.structures.levels_for(&author_id, &work_id);
        if segments.len() > levels.len() {
            return Err(Error::CitationFormat(format!(
                "hierarchy '{hierarchy_path}' has {} values but work {author_id}.{work_id} \
                 declares {} levels",
                segments.len(),
                levels.len()
            )));
        }

        let hierarchy = self.resolve_hierarchy(&levels, &segments);

        let (text, fragment, inline_title) = clean_content(content);

        let citation = Citation {
            author_id,
            work_id,
            epithet,
            fragment,
            hierarchy,
            is_title,
            title_number,
            title_parts: std::collections::BTreeMap::new(),
            title_text: None,
        };
        self.previous = Some(citation.clone());

        Ok(ContentLine {
            citation,
            text,
            inline_title,
        })
    }

    /// Map hierarchy values onto descriptor levels.
    ///
    /// Given values fill the leading positions; empty segments and missing
    /// trailing positions inherit from the most recent citation in the same
    /// work. A level with no given and no inherited value is omitted.
    fn resolve_hierarchy(
        &self,
        levels: &[HierarchyLevel],
        segments: &[&str],
    ) -> Vec<HierarchyValue> {
        let mut out = Vec::with_capacity(levels.len());
        for (position, level) in levels.iter().enumerate() {
            let given = segments.get(position).copied().filter(|s| !s.is_empty());
            let value = given.map(str::to_string).or_else(|| {
                self.previous
                    .as_ref()
                    .and_then(|p| p.level(*level))
                    .map(str::to_string)
            });
            if let Some(value) = value {
                out.push(HierarchyValue {
                    level: *level,
                    value,
                });
            }
        }
        out
    }
}

/// Strip fragment notation and inline title markers from line content.
///
/// Returns the cleaned NFC-normalized text, the fragment number from any
/// `(fr. N)` notation, and the joined text of inline `{ … }` title markers.
fn clean_content(content: &str) -> (String, Option<String>, Option<String>) {
    let mut fragment = None;
    let without_fragment = FRAGMENT_RE.replace_all(content, |captures: &regex::Captures<'_>| {
        fragment = Some(captures[1].to_string());
        String::new()
    });

    let mut title_parts: Vec<String> = Vec::new();
    let without_titles =
        INLINE_TITLE_RE.replace_all(&without_fragment, |captures: &regex::Captures<'_>| {
            let inner = captures[1].trim();
            if !inner.is_empty() {
                title_parts.push(inner.to_string());
            }
            String::new()
        });

    let inline_title = if title_parts.is_empty() {
        None
    } else {
        Some(title_parts.join(" "))
    };

    // Collapse any doubled spaces the removals left behind, then normalize.
    let mut cleaned = String::with_capacity(without_titles.len());
    let mut last_was_space = false;
    for c in without_titles.trim_start().chars() {
        if c == ' ' {
            if !last_was_space {
                cleaned.push(c);
            }
            last_was_space = true;
        } else {
            cleaned.push(c);
            last_was_space = false;
        }
    }

    (normalize(cleaned.trim_end()), fragment, inline_title)
}

/// Extract an epithet from a work token of the form `Z(Epithet)`.
fn parse_epithet(work_token: &str) -> Option<String> {
    let open = work_token.find('(')?;
    let close = work_token.rfind(')')?;
    if close <= open + 1 {
        return None;
    }
    Some(work_token[open + 1..close].to_string())
}

fn normalize(text: &str) -> String {
    text.nfc().collect()
}

fn truncate(line: &str) -> String {
    let mut out: String = line.chars().take(40).collect();
    if out.len() < line.len() {
        out.push('…');
    }
    out
}

//! Division ingestion: grouping cited lines into logical text divisions.
//!
//! A division is identified by its citation fields plus every structural
//! coordinate except the line. The ingestor consumes `(Citation, text)`
//! pairs in source order, opens a new division whenever the key changes,
//! numbers content lines from 1 within each division, and accumulates
//! multi-line titles (`t`, `t1`, …) into title divisions.
//!
//! Validation runs when a division closes: line-number contiguity, at most
//! one value per title part. Violations are recorded on the emitted
//! division and never halt ingestion.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{Citation, HierarchyLevel};

/// Identity of one division: citation fields plus structural coordinates,
/// excluding the line level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DivisionKey {
    /// TLG author identifier.
    pub author_id: String,
    /// TLG work identifier.
    pub work_id: String,
    /// Optional epithet.
    pub epithet: Option<String>,
    /// Optional fragment.
    pub fragment: Option<String>,
    /// Structural coordinates in descriptor order, line excluded.
    pub coords: Vec<(HierarchyLevel, String)>,
}

impl DivisionKey {
    /// Build the key for a citation.
    ///
    /// Content divisions with neither a chapter nor a section coordinate
    /// get `chapter = "1"` defaulted in, so undivided works still produce
    /// a well-formed key.
    #[must_use]
    pub fn from_citation(citation: &Citation, default_chapter: bool) -> Self {
        let mut coords: Vec<(HierarchyLevel, String)> = citation
            .hierarchy
            .iter()
            .filter(|h| h.level != HierarchyLevel::Line)
            .map(|h| (h.level, h.value.clone()))
            .collect();

        let has_chapter_or_section = coords
            .iter()
            .any(|(l, _)| matches!(l, HierarchyLevel::Chapter | HierarchyLevel::Section));
        if default_chapter && !has_chapter_or_section {
            coords.push((HierarchyLevel::Chapter, "1".to_string()));
        }

        Self {
            author_id: citation.author_id.clone(),
            work_id: citation.work_id.clone(),
            epithet: citation.epithet.clone(),
            fragment: citation.fragment.clone(),
            coords,
        }
    }

    /// Structural coordinate by level.
    #[must_use]
    pub fn coord(&self, level: HierarchyLevel) -> Option<&str> {
        self.coords
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, v)| v.as_str())
    }
}

/// One content line pending persistence, numbered within its division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLine {
    /// 1-based number within the division.
    pub number: u32,
    /// Cleaned line text.
    pub content: String,
    /// Citation decoded for this line.
    pub citation: Citation,
}

/// A closed division ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDivision {
    /// Division identity.
    pub key: DivisionKey,
    /// Whether this is a title division (no content lines).
    pub is_title: bool,
    /// First title part number seen, for title divisions.
    pub title_number: Option<u32>,
    /// Accumulated title parts keyed by part number.
    pub title_parts: BTreeMap<String, String>,
    /// Title text: parts joined in ascending numeric order.
    pub title_text: Option<String>,
    /// Citation-declared line value of the first content line, if any.
    pub line_field: Option<String>,
    /// Content lines in source order, numbered from 1.
    pub lines: Vec<PendingLine>,
    /// Integrity violations found at close.
    pub issues: Vec<String>,
}

#[derive(Debug)]
struct OpenDivision {
    key: DivisionKey,
    is_title: bool,
    title_number: Option<u32>,
    title_parts: BTreeMap<String, String>,
    inline_title: Option<String>,
    line_field: Option<String>,
    lines: Vec<PendingLine>,
    issues: Vec<String>,
}

impl OpenDivision {
    fn close(mut self) -> CompletedDivision {
        // Contiguity check; guaranteed by construction but re-ingestion
        // paths have violated it before, so the close re-verifies.
        for (index, line) in self.lines.iter().enumerate() {
            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if line.number != expected {
                self.issues.push(format!(
                    "line number {} at position {} (expected {})",
                    line.number,
                    index + 1,
                    expected
                ));
            }
        }

        let title_text = if self.title_parts.is_empty() {
            self.inline_title
        } else {
            let mut keyed: Vec<(u32, &String)> = self
                .title_parts
                .iter()
                .map(|(k, v)| (k.parse::<u32>().unwrap_or(u32::MAX), v))
                .collect();
            keyed.sort_by_key(|(n, _)| *n);
            Some(
                keyed
                    .into_iter()
                    .map(|(_, v)| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        };

        CompletedDivision {
            key: self.key,
            is_title: self.is_title,
            title_number: self.title_number,
            title_parts: self.title_parts,
            title_text,
            line_field: self.line_field,
            lines: self.lines,
            issues: self.issues,
        }
    }
}

/// State machine grouping a citation stream into divisions.
///
/// Push pairs in source order; each push returns the divisions it closed
/// (at most one). Call [`finish`](Self::finish) at end-of-file.
#[derive(Debug, Default)]
pub struct DivisionIngestor {
    current: Option<OpenDivision>,
}

impl DivisionIngestor {
    /// Create an ingestor in its initial state.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Consume one cited line.
    ///
    /// Title lines accumulate into a title division; content lines open or
    /// extend a content division. Returns any division this line closed.
    pub fn push(&mut self, citation: &Citation, text: &str) -> Vec<CompletedDivision> {
        if citation.is_title {
            self.push_title(citation, text)
        } else {
            self.push_content(citation, text)
        }
    }

    /// Attach a title found inline in content (`{ … }` markers) to the
    /// open division, unless it already has title parts.
    pub fn attach_inline_title(&mut self, title: &str) {
        if let Some(open) = self.current.as_mut() {
            if open.title_parts.is_empty() && open.inline_title.is_none() {
                open.inline_title = Some(title.to_string());
            }
        }
    }

    /// Close the open division at end-of-file.
    pub fn finish(&mut self) -> Option<CompletedDivision> {
        self.current.take().map(OpenDivision::close)
    }

    fn push_title(&mut self, citation: &Citation, text: &str) -> Vec<CompletedDivision> {
        let key = DivisionKey::from_citation(citation, false);
        let mut closed = Vec::new();

        let reuse = self
            .current
            .as_ref()
            .is_some_and(|open| open.is_title && open.key == key);
        if !reuse {
            if let Some(open) = self.current.take() {
                closed.push(open.close());
            }
            debug!(?key, "opening title division");
            self.current = Some(OpenDivision {
                key,
                is_title: true,
                title_number: citation.title_number,
                title_parts: BTreeMap::new(),
                inline_title: None,
                line_field: None,
                lines: Vec::new(),
                issues: Vec::new(),
            });
        }

        if let Some(open) = self.current.as_mut() {
            let part = citation.title_number.unwrap_or(0).to_string();
            if open
                .title_parts
                .insert(part.clone(), text.to_string())
                .is_some()
            {
                open.issues.push(format!("duplicate title part {part}"));
            }
        }
        closed
    }

    fn push_content(&mut self, citation: &Citation, text: &str) -> Vec<CompletedDivision> {
        let key = DivisionKey::from_citation(citation, true);
        let mut closed = Vec::new();

        let reuse = self
            .current
            .as_ref()
            .is_some_and(|open| !open.is_title && open.key == key);
        if !reuse {
            if let Some(open) = self.current.take() {
                closed.push(open.close());
            }
            debug!(?key, "opening division");
            self.current = Some(OpenDivision {
                key,
                is_title: false,
                title_number: None,
                title_parts: BTreeMap::new(),
                inline_title: None,
                line_field: citation.level(HierarchyLevel::Line).map(str::to_string),
                lines: Vec::new(),
                issues: Vec::new(),
            });
        }

        if let Some(open) = self.current.as_mut() {
            let number = u32::try_from(open.lines.len() + 1).unwrap_or(u32::MAX);
            open.lines.push(PendingLine {
                number,
                content: text.to_string(),
                citation: citation.clone(),
            });
        }
        closed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Citation;

    fn citation(section: &str, line: Option<&str>) -> Citation {
        let mut c = Citation::new("0627", "010");
        c.push_level(HierarchyLevel::Section, section);
        if let Some(l) = line {
            c.push_level(HierarchyLevel::Line, l);
        }
        c
    }

    fn title_citation(section: &str, number: Option<u32>) -> Citation {
        let mut c = citation(section, None);
        c.is_title = true;
        c.title_number = Some(number.unwrap_or(0));
        c
    }

    #[test]
    fn test_title_accumulation() {
        let mut ingestor = DivisionIngestor::new();

        assert!(ingestor
            .push(&title_citation("641a", None), "ΠΕΡΙ")
            .is_empty());
        assert!(ingestor
            .push(&title_citation("641a", Some(1)), "ΑΡΘΡΩΝ")
            .is_empty());

        let closed = ingestor.push(&citation("641a", Some("1")), "Τὸ μὲν οὖν");
        assert_eq!(closed.len(), 1);
        let title = &closed[0];
        assert!(title.is_title);
        assert_eq!(title.title_parts.get("0"), Some(&"ΠΕΡΙ".to_string()));
        assert_eq!(title.title_parts.get("1"), Some(&"ΑΡΘΡΩΝ".to_string()));
        assert_eq!(title.title_text, Some("ΠΕΡΙ ΑΡΘΡΩΝ".to_string()));
        assert!(title.lines.is_empty());
        assert!(title.issues.is_empty());

        let body = ingestor.finish().unwrap();
        assert!(!body.is_title);
        assert_eq!(body.lines.len(), 1);
        assert_eq!(body.lines[0].number, 1);
        // Section present, so no chapter defaulting.
        assert_eq!(body.key.coord(HierarchyLevel::Chapter), None);
        assert_eq!(body.key.coord(HierarchyLevel::Section), Some("641a"));
    }

    #[test]
    fn test_division_boundary_resets_numbering() {
        let mut chapter1 = Citation::new("0627", "010");
        chapter1.push_level(HierarchyLevel::Chapter, "1");
        let mut chapter2 = Citation::new("0627", "010");
        chapter2.push_level(HierarchyLevel::Chapter, "2");

        let mut ingestor = DivisionIngestor::new();
        assert!(ingestor.push(&chapter1, "πρῶτος").is_empty());
        assert!(ingestor.push(&chapter1, "δεύτερος").is_empty());

        let closed = ingestor.push(&chapter2, "τρίτος");
        assert_eq!(closed.len(), 1);
        assert_eq!(
            closed[0]
                .lines
                .iter()
                .map(|l| l.number)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );

        let second = ingestor.finish().unwrap();
        assert_eq!(second.lines.len(), 1);
        assert_eq!(second.lines[0].number, 1);
        assert_eq!(second.key.coord(HierarchyLevel::Chapter), Some("2"));
    }

    #[test]
    fn test_chapter_defaulted_when_absent() {
        let citation = Citation::new("0627", "010");
        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&citation, "κείμενον");
        let division = ingestor.finish().unwrap();
        assert_eq!(division.key.coord(HierarchyLevel::Chapter), Some("1"));
    }

    #[test]
    fn test_line_level_does_not_split_divisions() {
        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&citation("2", Some("1")), "first");
        ingestor.push(&citation("2", Some("2")), "second");
        let division = ingestor.finish().unwrap();
        assert_eq!(division.lines.len(), 2);
        // The citation-declared line value of the first line is preserved.
        assert_eq!(division.line_field, Some("1".to_string()));
    }

    #[test]
    fn test_fragment_changes_key() {
        let mut with_fragment = citation("2", Some("1"));
        with_fragment.fragment = Some("7".to_string());

        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&citation("2", Some("1")), "plain");
        let closed = ingestor.push(&with_fragment, "fragmentary");
        assert_eq!(closed.len(), 1);
        let second = ingestor.finish().unwrap();
        assert_eq!(second.key.fragment, Some("7".to_string()));
    }

    #[test]
    fn test_duplicate_title_part_is_an_issue() {
        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&title_citation("641a", Some(1)), "ΠΕΡΙ");
        ingestor.push(&title_citation("641a", Some(1)), "ΑΡΘΡΩΝ");
        let division = ingestor.finish().unwrap();
        assert_eq!(division.issues.len(), 1);
        assert!(division.issues[0].contains("duplicate title part"));
        // Latest value wins.
        assert_eq!(division.title_parts.get("1"), Some(&"ΑΡΘΡΩΝ".to_string()));
    }

    #[test]
    fn test_inline_title_attaches_once() {
        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&citation("3", Some("1")), "κείμενον");
        ingestor.attach_inline_title("ΠΕΡΙ ΑΓΜΩΝ");
        ingestor.attach_inline_title("ΑΛΛΟ");
        let division = ingestor.finish().unwrap();
        assert_eq!(division.title_text, Some("ΠΕΡΙ ΑΓΜΩΝ".to_string()));
    }

    #[test]
    fn test_finish_with_nothing_open() {
        let mut ingestor = DivisionIngestor::new();
        assert!(ingestor.finish().is_none());
    }

    #[test]
    fn test_title_after_content_closes_content_division() {
        let mut ingestor = DivisionIngestor::new();
        ingestor.push(&citation("1", Some("1")), "σῶμα");
        let closed = ingestor.push(&title_citation("2", None), "ΠΕΡΙ");
        assert_eq!(closed.len(), 1);
        assert!(!closed[0].is_title);
        let title = ingestor.finish().unwrap();
        assert!(title.is_title);
    }
}

//! Sentence reconstruction across source-line boundaries.
//!
//! Cited source lines break sentences arbitrarily, including mid-word with a
//! trailing hyphen. [`SentenceReconstructor`] consumes lines in source order
//! and emits complete sentences, each carrying the byte range every source
//! line contributed. The ranges let callers rebuild the sentence from line
//! content and persist line-level provenance.
//!
//! ## Assembly rules
//!
//! - A fragment ending in `-` joins the next line with the hyphen elided and
//!   no intervening space (mid-word break).
//! - Otherwise a single space separates fragments.
//! - A sentence ends at `.`, `;`, `·`, or `!` when the terminator is not
//!   preceded by a configured abbreviation and not inside a quotation.
//! - Whatever remains at end-of-input is emitted as a final sentence.
//!
//! The reconstructor is a plain synchronous algorithm; the async driver
//! feeds it between suspension points.

use std::collections::HashSet;

use crate::types::LineId;

/// Sentence terminators: full stop, Greek question marks, Greek middle
/// dot / ano teleia, exclamation mark.
const TERMINATORS: [char; 6] = ['.', '!', ';', '\u{037E}', '\u{00B7}', '\u{0387}'];

/// The byte range a single source line contributed to a sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    /// The contributing line.
    pub line_id: LineId,
    /// Start offset within the line content.
    pub position_start: usize,
    /// End offset within the line content (exclusive).
    ///
    /// Includes a trailing hyphen when the line broke a word; the hyphen is
    /// elided from the sentence content at the join.
    pub position_end: usize,
}

/// A complete reconstructed sentence with per-line provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSentence {
    /// Joined sentence text, hyphenations resolved.
    pub content: String,
    /// Contributing line ranges in source order.
    ///
    /// Every line that contributed text appears exactly once.
    pub spans: Vec<LineSpan>,
}

impl AssembledSentence {
    /// Offset within the first source line where the sentence begins.
    #[must_use]
    pub fn start_position(&self) -> usize {
        self.spans.first().map_or(0, |s| s.position_start)
    }

    /// Offset within the last source line where the sentence ends.
    #[must_use]
    pub fn end_position(&self) -> usize {
        self.spans.last().map_or(0, |s| s.position_end)
    }
}

/// One line's live contribution to the assembly buffer.
#[derive(Debug, Clone)]
struct Contribution {
    line_id: LineId,
    /// Range within the line content.
    line_start: usize,
    line_end: usize,
    /// Range within the buffer. Excludes an elided trailing hyphen, which
    /// stays inside `line_end` but leaves the buffer.
    buf_start: usize,
    buf_end: usize,
}

/// Streaming sentence assembler for one text.
///
/// Feed lines via [`push_line`](Self::push_line); call
/// [`finish`](Self::finish) at end-of-input to flush the final sentence.
#[derive(Debug)]
pub struct SentenceReconstructor {
    buffer: String,
    contributions: Vec<Contribution>,
    abbreviations: HashSet<String>,
    /// Nesting depth of «…» and \u{201C}…\u{201D} quotations.
    quote_depth: usize,
    /// Whether a straight double quote is currently open.
    straight_quote_open: bool,
    /// Buffer offset up to which terminator scanning has run.
    scan_pos: usize,
}

impl SentenceReconstructor {
    /// Create a reconstructor with the configured abbreviation set.
    ///
    /// Abbreviation entries are compared without their trailing dot.
    #[must_use]
    pub fn new<I, S>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buffer: String::new(),
            contributions: Vec::new(),
            abbreviations: abbreviations
                .into_iter()
                .map(|s| s.into().trim_end_matches('.').to_string())
                .collect(),
            quote_depth: 0,
            straight_quote_open: false,
            scan_pos: 0,
        }
    }

    /// Whether the buffer currently holds any pending text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append one source line and emit any sentences it completes.
    pub fn push_line(&mut self, line_id: LineId, content: &str) -> Vec<AssembledSentence> {
        let text = content.trim_end();
        if text.is_empty() {
            return Vec::new();
        }

        if self.buffer.ends_with('-') {
            // Mid-word break: elide the hyphen and join without a space.
            // The contributing line keeps the hyphen inside its range.
            self.buffer.pop();
            if let Some(last) = self.contributions.last_mut() {
                last.buf_end -= 1;
            }
            self.scan_pos = self.scan_pos.min(self.buffer.len());
        } else if !self.buffer.is_empty()
            && !self.buffer.ends_with(char::is_whitespace)
            && !text.starts_with(char::is_whitespace)
        {
            self.buffer.push(' ');
        }

        let buf_start = self.buffer.len();
        self.buffer.push_str(text);
        self.contributions.push(Contribution {
            line_id,
            line_start: 0,
            line_end: text.len(),
            buf_start,
            buf_end: self.buffer.len(),
        });

        self.drain_complete()
    }

    /// Flush the remaining buffer as a final sentence, if any.
    pub fn finish(&mut self) -> Option<AssembledSentence> {
        if self.buffer.trim().is_empty() {
            self.reset();
            return None;
        }
        let sentence = AssembledSentence {
            content: self.buffer.trim_end().to_string(),
            spans: self
                .contributions
                .iter()
                .map(|c| LineSpan {
                    line_id: c.line_id,
                    position_start: c.line_start,
                    position_end: c.line_end,
                })
                .collect(),
        };
        self.reset();
        Some(sentence)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.contributions.clear();
        self.quote_depth = 0;
        self.straight_quote_open = false;
        self.scan_pos = 0;
    }

    /// Scan forward from the last position and emit every completed
    /// sentence in the buffer.
    fn drain_complete(&mut self) -> Vec<AssembledSentence> {
        let mut emitted = Vec::new();
        while let Some(end) = self.next_terminator() {
            emitted.push(self.emit_until(end));
        }
        self.scan_pos = self.buffer.len();
        emitted
    }

    /// Find the byte offset just past the next valid terminator.
    ///
    /// Advances quotation state over everything scanned. Returns `None`
    /// when the remaining buffer holds no sentence boundary; scanning will
    /// resume where it left off on the next append.
    fn next_terminator(&mut self) -> Option<usize> {
        let buffer = std::mem::take(&mut self.buffer);
        let mut found = None;
        for (pos, c) in buffer[self.scan_pos..].char_indices() {
            let at = self.scan_pos + pos;
            match c {
                '\u{00AB}' | '\u{201C}' => self.quote_depth += 1,
                '\u{00BB}' | '\u{201D}' => self.quote_depth = self.quote_depth.saturating_sub(1),
                '"' => self.straight_quote_open = !self.straight_quote_open,
                _ if TERMINATORS.contains(&c)
                    && self.quote_depth == 0
                    && !self.straight_quote_open =>
                {
                    if c == '.' && self.is_abbreviation_dot(&buffer, at) {
                        continue;
                    }
                    found = Some(at + c.len_utf8());
                    break;
                },
                _ => {},
            }
        }
        self.buffer = buffer;
        if let Some(end) = found {
            self.scan_pos = end;
        }
        found
    }

    /// Whether the word immediately before a `.` is a configured
    /// abbreviation.
    fn is_abbreviation_dot(&self, buffer: &str, dot_pos: usize) -> bool {
        if self.abbreviations.is_empty() {
            return false;
        }
        let word: String = buffer[..dot_pos]
            .chars()
            .rev()
            .take_while(|c| c.is_alphabetic())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        !word.is_empty() && self.abbreviations.contains(&word)
    }

    /// Emit the sentence ending at buffer offset `end` and rebase the
    /// buffer and contribution list onto the remainder.
    fn emit_until(&mut self, end: usize) -> AssembledSentence {
        let content = self.buffer[..end].to_string();
        let mut spans = Vec::new();
        for c in &self.contributions {
            if c.buf_start >= end {
                break;
            }
            let position_end = if c.buf_end <= end {
                c.line_end
            } else {
                c.line_start + (end - c.buf_start)
            };
            spans.push(LineSpan {
                line_id: c.line_id,
                position_start: c.line_start,
                position_end,
            });
        }

        // Rebase past the terminator and any following whitespace; the
        // skipped whitespace advances its owner's line offset too.
        let mut cut = end;
        while let Some(c) = self.buffer[cut..].chars().next() {
            if c.is_whitespace() {
                cut += c.len_utf8();
            } else {
                break;
            }
        }

        self.buffer = self.buffer.split_off(cut);
        self.contributions.retain_mut(|c| {
            if c.buf_end <= cut {
                return false;
            }
            let consumed = cut.max(c.buf_start) - c.buf_start;
            c.line_start += consumed;
            c.buf_start = c.buf_start.max(cut) - cut;
            c.buf_end -= cut;
            true
        });
        self.scan_pos = 0;

        AssembledSentence { content, spans }
    }
}

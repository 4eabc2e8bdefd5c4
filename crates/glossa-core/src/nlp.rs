//! NLP annotation boundary.
//!
//! The tagger itself (a spaCy-style Greek pipeline) is an external
//! collaborator; glossa talks to it through [`NlpAnnotator`]. Annotation is
//! CPU-heavy, so the driver runs it through [`AnnotationPool`], which bounds
//! concurrency and collapses duplicate in-flight work: the same sentence
//! text never has two concurrent annotations running.
//!
//! [`FoldingAnnotator`] is the built-in stand-in implementation: whitespace
//! tokenization with diacritic-folded lowercase lemmas. It keeps the
//! pipeline runnable without an external model and is what the tests use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::types::Token;
use crate::util::opaque_id;
use crate::{Error, Result};

/// Token and category annotations for one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Annotation {
    /// Per-token annotations in surface order.
    pub tokens: Vec<Token>,
    /// Deduplicated category labels.
    pub categories: Vec<String>,
}

/// External NLP boundary: tokenize, lemmatize, and category-tag a sentence.
#[async_trait]
pub trait NlpAnnotator: Send + Sync {
    /// Annotate one sentence of text.
    async fn annotate(&self, text: &str) -> Result<Annotation>;
}

/// Bounded, deduplicating wrapper around an annotator.
///
/// Work items are keyed by a hash of the input text; a second request for
/// an in-flight input awaits the first result instead of spawning another
/// annotation.
pub struct AnnotationPool {
    inner: Arc<dyn NlpAnnotator>,
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Annotation>>>>,
}

impl AnnotationPool {
    /// Wrap an annotator with a concurrency bound.
    #[must_use]
    pub fn new(inner: Arc<dyn NlpAnnotator>, concurrency: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Annotate through the pool.
    pub async fn annotate(&self, text: &str) -> Result<Annotation> {
        let key = opaque_id("nl", text);
        let cell = {
            let mut map = self.in_flight.lock().await;
            Arc::clone(map.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_try_init(|| async {
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::Cancelled("annotation pool closed".to_string()))?;
                self.inner.annotate(text).await
            })
            .await
            .cloned();

        let mut map = self.in_flight.lock().await;
        map.remove(&key);
        result
    }
}

/// Fold a surface form to a naive lemma: NFD, strip combining marks,
/// lowercase, NFC.
#[must_use]
pub fn fold_lemma(surface: &str) -> String {
    surface
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .nfc()
        .collect()
}

/// Stand-in annotator: whitespace tokens, folded lemmas, no categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldingAnnotator;

#[async_trait]
impl NlpAnnotator for FoldingAnnotator {
    async fn annotate(&self, text: &str) -> Result<Annotation> {
        let tokens = text
            .split_whitespace()
            .filter_map(|raw| {
                let surface = raw.trim_matches(|c: char| !c.is_alphanumeric());
                if surface.is_empty() {
                    return None;
                }
                Some(Token {
                    text: surface.to_string(),
                    lemma: fold_lemma(surface),
                    pos: "word".to_string(),
                    category: None,
                })
            })
            .collect();
        Ok(Annotation {
            tokens,
            categories: Vec::new(),
        })
    }
}

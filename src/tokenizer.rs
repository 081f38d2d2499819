use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

lazy_static::lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = {
        [
            "a", "about", "above", "after", "again", "against", "all", "am", "an", "and",
            "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
            "between", "both", "but", "by", "cannot", "could", "did", "do", "does", "doing",
            "down", "during", "each", "few", "for", "from", "further", "had", "has", "have",
            "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
            "i", "if", "in", "into", "is", "it", "its", "itself", "me", "more", "most", "my",
            "myself", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
            "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
            "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
            "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
            "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
            "where", "which", "while", "who", "whom", "why", "with", "would", "you", "your",
            "yours", "yourself", "yourselves",
        ]
        .iter()
        .copied()
        .collect()
    };
}

/// Optional filters applied after splitting and lowercasing.
///
/// Persisted with the index at creation time; an index is always queried
/// with the configuration it was built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Drop common English stopwords.
    pub stopwords: bool,
    /// Reduce terms to their English stem.
    pub stemming: bool,
}

/// A normalized term together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Offset in the surviving token stream.
    pub position: u32,
    /// Byte range of the original word in the analyzed text.
    pub span: Range<usize>,
}

/// The single analyzer shared by indexing, querying and highlighting.
pub struct Tokenizer {
    config: AnalyzerConfig,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            stemmer: config
                .stemming
                .then(|| Stemmer::create(Algorithm::English)),
        }
    }

    pub fn config(&self) -> AnalyzerConfig {
        self.config
    }

    /// Byte ranges of maximal alphanumeric runs
    fn word_spans(text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut start = None;

        for (idx, c) in text.char_indices() {
            match (c.is_alphanumeric(), start) {
                (true, None) => start = Some(idx),
                (false, Some(s)) => {
                    spans.push(s..idx);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(s..text.len());
        }

        spans
    }

    /// Normalize one word. `None` means the word is filtered out.
    pub fn normalize(&self, word: &str) -> Option<String> {
        // Case folding can yield non-alphanumeric chars (e.g. combining marks).
        let lowered: String = word
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        if lowered.is_empty() {
            return None;
        }
        if self.config.stopwords && STOPWORDS.contains(lowered.as_str()) {
            return None;
        }

        match &self.stemmer {
            Some(stemmer) => Some(stemmer.stem(&lowered).into_owned()),
            None => Some(lowered),
        }
    }

    /// Full analysis pipeline, keeping positions and source spans
    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();

        for span in Self::word_spans(text) {
            if let Some(term) = self.normalize(&text[span.clone()]) {
                tokens.push(Token {
                    term,
                    position: tokens.len() as u32,
                    span,
                });
            }
        }

        tokens
    }

    /// Full analysis pipeline
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.tokens(text).into_iter().map(|t| t.term).collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

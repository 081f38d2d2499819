use crate::tokenizer::Tokenizer;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_OPEN_MARK: &str = "<mark>";
pub const DEFAULT_CLOSE_MARK: &str = "</mark>";
pub const DEFAULT_ELLIPSIS: &str = "...";

/// Builds bounded excerpts of a document body with query matches marked.
///
/// Words are recognized with the index's own tokenizer, so a term matches
/// its original-case, punctuated occurrence in the body.
pub struct Highlighter<'a> {
    tokenizer: &'a Tokenizer,
    open: String,
    close: String,
    ellipsis: String,
}

impl<'a> Highlighter<'a> {
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            open: DEFAULT_OPEN_MARK.to_string(),
            close: DEFAULT_CLOSE_MARK.to_string(),
            ellipsis: DEFAULT_ELLIPSIS.to_string(),
        }
    }

    pub fn with_marks(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.open = open.into();
        self.close = close.into();
        self
    }

    pub fn with_ellipsis(mut self, ellipsis: impl Into<String>) -> Self {
        self.ellipsis = ellipsis.into();
        self
    }

    /// Excerpt of the start of `body`, at most `max_length` chars (marks
    /// included) plus the ellipsis when the body was cut. Every match inside
    /// the excerpt is marked; the excerpt ends before a match whose marks do
    /// not fit. Never splits a grapheme cluster.
    pub fn highlight(&self, body: &str, matched_terms: &BTreeSet<String>, max_length: usize) -> String {
        let boundaries: Vec<usize> = body
            .grapheme_indices(true)
            .map(|(idx, _)| idx)
            .chain(std::iter::once(body.len()))
            .collect();
        let align_start = |pos: usize| boundaries[boundaries.partition_point(|&b| b <= pos) - 1];
        let align_end = |pos: usize| boundaries[boundaries.partition_point(|&b| b < pos)];

        let mut excerpt = Excerpt::new(max_length);
        let mut cursor = 0;

        for token in self.tokenizer.tokens(body) {
            if !matched_terms.contains(&token.term) {
                continue;
            }
            let start = align_start(token.span.start);
            let end = align_end(token.span.end);
            if start < cursor {
                continue;
            }

            if !excerpt.push_plain(&body[cursor..start]) {
                return excerpt.finish(Some(&self.ellipsis));
            }

            let word = &body[start..end];
            let cost = char_len(&self.open) + char_len(word) + char_len(&self.close);
            // A match is either marked or cut off, never shown plain.
            if !excerpt.fits(cost) {
                return excerpt.finish(Some(&self.ellipsis));
            }
            excerpt.push_raw(&format!("{}{}{}", self.open, word, self.close), cost);
            cursor = end;
        }

        if excerpt.push_plain(&body[cursor..]) {
            excerpt.finish(None)
        } else {
            excerpt.finish(Some(&self.ellipsis))
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

struct Excerpt {
    out: String,
    used: usize,
    max_length: usize,
}

impl Excerpt {
    fn new(max_length: usize) -> Self {
        Self {
            out: String::new(),
            used: 0,
            max_length,
        }
    }

    fn fits(&self, chars: usize) -> bool {
        self.used + chars <= self.max_length
    }

    fn push_raw(&mut self, text: &str, chars: usize) {
        self.out.push_str(text);
        self.used += chars;
    }

    /// Append whole graphemes while they fit. False if `text` had to be cut.
    fn push_plain(&mut self, text: &str) -> bool {
        for grapheme in text.graphemes(true) {
            let chars = char_len(grapheme);
            if !self.fits(chars) {
                return false;
            }
            self.push_raw(grapheme, chars);
        }
        true
    }

    fn finish(mut self, ellipsis: Option<&str>) -> String {
        if let Some(ellipsis) = ellipsis {
            self.out.push_str(ellipsis);
        }
        self.out
    }
}

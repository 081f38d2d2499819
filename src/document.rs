use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A document as handed over by the crawler/extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Stable, unique identifier (e.g. the file path). Re-indexing the same id replaces.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: String,
}

impl SourceDocument {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            url: url.into(),
        }
    }
}

/// Stored metadata of an indexed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    /// Number of terms in title and body
    pub length: u32,
    /// Leading positions of the term stream that belong to the title
    pub title_length: u32,
}

/// Per-document statistics used for scoring and for replacing documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStats {
    pub length: u32,
    pub title_length: u32,
    /// Distinct terms of the document, so a replace can drop its postings
    pub terms: BTreeSet<String>,
}

/// A scored match for one query. Never persisted.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub record: DocumentRecord,
    pub matched_terms: BTreeSet<String>,
}

/// What the presentation layer renders for one hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
}

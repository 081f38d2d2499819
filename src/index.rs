use serde::{Deserialize, Serialize};

/// Occurrences of one term in one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: String,
    pub term_frequency: u32,
    /// How many of the occurrences fall inside the title
    pub title_frequency: u32,
    /// Ascending, unique offsets in the document's term stream
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            term_frequency: 0,
            title_frequency: 0,
            positions: Vec::new(),
        }
    }

    /// Record one occurrence. Positions must arrive in ascending order.
    pub fn push(&mut self, position: u32, in_title: bool) {
        debug_assert!(self.positions.last().map_or(true, |&last| last < position));
        self.positions.push(position);
        self.term_frequency += 1;
        if in_title {
            self.title_frequency += 1;
        }
    }
}

/// All postings of one term, sorted by document id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingsList {
    postings: Vec<Posting>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the posting for `posting.doc_id`
    pub fn upsert(&mut self, posting: Posting) {
        match self
            .postings
            .binary_search_by(|p| p.doc_id.as_str().cmp(&posting.doc_id))
        {
            Ok(idx) => self.postings[idx] = posting,
            Err(idx) => self.postings.insert(idx, posting),
        }
    }

    /// Remove the posting of a document, if present
    pub fn remove(&mut self, doc_id: &str) -> Option<Posting> {
        self.postings
            .binary_search_by(|p| p.doc_id.as_str().cmp(doc_id))
            .ok()
            .map(|idx| self.postings.remove(idx))
    }

    pub fn get(&self, doc_id: &str) -> Option<&Posting> {
        self.postings
            .binary_search_by(|p| p.doc_id.as_str().cmp(doc_id))
            .ok()
            .map(|idx| &self.postings[idx])
    }

    /// Number of documents containing the term (for IDF calculation)
    pub fn doc_frequency(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.postings.iter()
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a Posting;
    type IntoIter = std::slice::Iter<'a, Posting>;

    fn into_iter(self) -> Self::IntoIter {
        self.postings.iter()
    }
}

/// Corpus-wide aggregates kept alongside the postings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregates {
    pub document_count: u64,
    pub total_length: u64,
}

impl Aggregates {
    pub fn average_document_length(&self) -> f64 {
        if self.document_count == 0 {
            0.0
        } else {
            self.total_length as f64 / self.document_count as f64
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: u64,
    pub total_terms: usize,
    pub avg_document_length: f64,
}

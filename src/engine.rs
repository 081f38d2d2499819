use crate::document::{DocumentRecord, SearchHit, SearchResult};
use crate::error::{Error, Result};
use crate::highlight::Highlighter;
use crate::index::IndexStats;
use crate::ranking::{rank_documents, Bm25Params, ScoredDocument, BM25};
use crate::storage::IndexStore;
use crate::tokenizer::Tokenizer;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// A query string and the terms it analyzes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub raw: String,
    pub terms: Vec<String>,
}

impl Query {
    /// Analyze `raw` with the index's tokenizer
    pub fn parse(raw: &str, tokenizer: &Tokenizer) -> Self {
        Self {
            raw: raw.to_string(),
            terms: tokenizer.analyze(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in query order with repeats removed
    pub fn unique_terms(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.terms
            .iter()
            .map(String::as_str)
            .filter(|term| seen.insert(*term))
            .collect()
    }
}

/// Search settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub scoring: Bm25Params,
    /// Snippet budget in characters
    pub snippet_length: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            scoring: Bm25Params::default(),
            snippet_length: 150,
        }
    }
}

struct Candidate {
    length: u32,
    scored: ScoredDocument,
}

/// Read-only query engine over an [`IndexStore`].
///
/// Safe to share between threads; every search reads one committed state.
pub struct Searcher {
    store: Arc<IndexStore>,
    bm25: BM25,
    settings: SearchSettings,
}

impl Searcher {
    pub fn new(store: Arc<IndexStore>, settings: SearchSettings) -> Self {
        Self {
            store,
            bm25: BM25::new(settings.scoring),
            settings,
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Documents matching any query term, best first. `limit == 0` returns all.
    pub fn search(&self, raw: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let query = Query::parse(raw, self.store.tokenizer());
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let reader = self.store.reader();
        let aggregates = reader.aggregates()?;
        let avg_doc_length = aggregates.average_document_length();

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for term in query.unique_terms() {
            let postings = reader.postings(term)?;
            if postings.is_empty() {
                continue;
            }
            let idf = self.bm25.idf(aggregates.document_count, postings.doc_frequency());

            for posting in &postings {
                let candidate = match candidates.entry(posting.doc_id.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let (length, _) = reader.document_length(&posting.doc_id)?.ok_or_else(|| {
                            Error::format(format!(
                                "term '{term}' references unknown document '{}'",
                                posting.doc_id
                            ))
                        })?;
                        entry.insert(Candidate {
                            length,
                            scored: ScoredDocument {
                                doc_id: posting.doc_id.clone(),
                                score: 0.0,
                                matched_terms: BTreeSet::new(),
                            },
                        })
                    }
                };

                candidate.scored.score +=
                    self.bm25
                        .term_score(idf, posting, candidate.length, avg_doc_length);
                candidate.scored.matched_terms.insert(term.to_string());
            }
        }

        let total = candidates.len();
        let ranked = rank_documents(
            candidates.into_values().map(|c| c.scored).collect(),
            limit,
        );

        let hits = ranked
            .into_iter()
            .map(|scored| {
                Ok(SearchHit {
                    record: reader.document(&scored.doc_id)?,
                    doc_id: scored.doc_id,
                    score: scored.score,
                    matched_terms: scored.matched_terms,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            query = raw,
            terms = query.terms.len(),
            total,
            returned = hits.len(),
            elapsed = ?start.elapsed(),
            "search"
        );

        Ok(hits)
    }

    /// Search and render each hit for presentation, snippet included
    pub fn search_results(&self, raw: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.search(raw, limit)?;
        let highlighter = Highlighter::new(self.store.tokenizer());

        Ok(hits
            .into_iter()
            .map(|hit| {
                let snippet = highlighter.highlight(
                    &hit.record.body,
                    &hit.matched_terms,
                    self.settings.snippet_length,
                );
                SearchResult {
                    id: hit.doc_id,
                    url: hit.record.url,
                    title: hit.record.title,
                    snippet,
                    score: hit.score,
                }
            })
            .collect())
    }

    /// Get a document by ID
    pub fn document(&self, id: &str) -> Result<DocumentRecord> {
        self.store.get_document(id)
    }

    /// Get index statistics
    pub fn stats(&self) -> Result<IndexStats> {
        self.store.stats()
    }
}

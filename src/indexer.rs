use crate::document::{DocumentRecord, SourceDocument};
use crate::error::Result;
use crate::index::Posting;
use crate::storage::{IndexBatch, IndexStore};
use crate::tokenizer::Tokenizer;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const PROGRESS_EVERY: usize = 10_000;

/// Tokenize a document into its stored record and per-term postings.
///
/// The term stream is title, then body, then URL. Positions below
/// `title_length` belong to the title; positions at or above `length`
/// belong to the URL, which is searchable but not part of the length.
pub fn analyze_document(
    tokenizer: &Tokenizer,
    doc: &SourceDocument,
) -> (DocumentRecord, BTreeMap<String, Posting>) {
    let title_tokens = tokenizer.tokens(&doc.title);
    let body_tokens = tokenizer.tokens(&doc.body);
    let url_tokens = tokenizer.tokens(&doc.url);
    let title_length = title_tokens.len() as u32;
    let length = title_length + body_tokens.len() as u32;

    let mut postings: BTreeMap<String, Posting> = BTreeMap::new();
    for token in title_tokens {
        postings
            .entry(token.term)
            .or_insert_with(|| Posting::new(&doc.id))
            .push(token.position, true);
    }
    for token in body_tokens {
        postings
            .entry(token.term)
            .or_insert_with(|| Posting::new(&doc.id))
            .push(title_length + token.position, false);
    }
    for token in url_tokens {
        postings
            .entry(token.term)
            .or_insert_with(|| Posting::new(&doc.id))
            .push(length + token.position, false);
    }

    let record = DocumentRecord {
        id: doc.id.clone(),
        title: doc.title.clone(),
        body: doc.body.clone(),
        url: doc.url.clone(),
        length,
        title_length,
    };

    (record, postings)
}

/// Result of one ingestion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub replaced: usize,
    pub terms: usize,
    pub elapsed: Duration,
}

/// Drives a document stream into the index as a single batch.
pub struct BatchIndexer<'a> {
    store: &'a IndexStore,
}

impl<'a> BatchIndexer<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Merge the stream into the existing index with one commit.
    ///
    /// The first error from the stream aborts the pass: nothing staged is
    /// committed and the previously committed index stays as it was.
    pub fn index<I>(&self, documents: I) -> Result<IndexReport>
    where
        I: IntoIterator<Item = Result<SourceDocument>>,
    {
        self.run(documents, false)
    }

    /// Replace the whole index with the stream's documents.
    pub fn rebuild<I>(&self, documents: I) -> Result<IndexReport>
    where
        I: IntoIterator<Item = Result<SourceDocument>>,
    {
        self.run(documents, true)
    }

    fn run<I>(&self, documents: I, rebuild: bool) -> Result<IndexReport>
    where
        I: IntoIterator<Item = Result<SourceDocument>>,
    {
        let start = Instant::now();
        let mut batch = self.store.begin_batch();
        if rebuild {
            batch.clear_existing();
        }

        if let Err(err) = self.stage_all(&mut batch, documents) {
            tracing::warn!(
                error = %err,
                staged = batch.len(),
                "ingestion failed, discarding batch"
            );
            return Err(err);
        }

        let summary = batch.commit()?;
        let report = IndexReport {
            documents: summary.documents,
            replaced: summary.replaced,
            terms: summary.terms_written,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            documents = report.documents,
            elapsed = ?report.elapsed,
            "indexed documents"
        );

        Ok(report)
    }

    fn stage_all<I>(&self, batch: &mut IndexBatch<'_>, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<SourceDocument>>,
    {
        for (n, item) in documents.into_iter().enumerate() {
            let doc = item?;
            let (record, postings) = analyze_document(self.store.tokenizer(), &doc);
            batch.add(record, postings)?;

            if (n + 1) % PROGRESS_EVERY == 0 {
                tracing::debug!(staged = n + 1, "staging documents");
            }
        }
        Ok(())
    }
}

use crate::document::{DocStats, DocumentRecord};
use crate::error::{Error, Result, StorageError};
use crate::index::{Aggregates, IndexStats, Posting, PostingsList};
use crate::tokenizer::{AnalyzerConfig, Tokenizer};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, Tree};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::Path;

const DOCS_TREE: &str = "documents";
const STATS_TREE: &str = "doc_stats";
const POSTINGS_TREE: &str = "postings";
const METADATA_TREE: &str = "metadata";

const FORMAT_KEY: &[u8] = b"format_version";
const ANALYZER_KEY: &[u8] = b"analyzer";
const AGGREGATES_KEY: &[u8] = b"aggregates";

const FORMAT_VERSION: u32 = 1;

/// Written by sled into every database directory it creates
const SLED_CONF_FILE: &str = "conf";

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Persistent inverted index: term -> postings, id -> document.
///
/// Reads go through [`IndexReader`], writes through a single [`IndexBatch`]
/// at a time. A commit becomes visible atomically; readers never observe a
/// partially applied batch.
pub struct IndexStore {
    db: Db,
    documents: Tree,
    doc_stats: Tree,
    postings: Tree,
    metadata: Tree,
    tokenizer: Tokenizer,
    writer: Mutex<()>,
    visibility: RwLock<()>,
}

impl IndexStore {
    /// Open an existing index. Fails with [`Error::IndexNotFound`] if nothing
    /// exists at `path`; any other failure is [`Error::StorageUnavailable`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::format(format!(
                    "{} is not an index directory",
                    path.display()
                )))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::IndexNotFound(path.to_path_buf()));
            }
            Err(err) => return Err(StorageError::Io(err).into()),
        }
        // sled::open would initialize an empty database in a foreign directory
        if !path.join(SLED_CONF_FILE).is_file() {
            return Err(Error::format(format!(
                "{} does not contain an index",
                path.display()
            )));
        }

        let db = sled::open(path)?;
        let metadata = db.open_tree(METADATA_TREE)?;

        let version: u32 = match metadata.get(FORMAT_KEY)? {
            Some(data) => decode(&data)?,
            None => {
                return Err(Error::format(format!(
                    "{} does not contain an index",
                    path.display()
                )))
            }
        };
        if version != FORMAT_VERSION {
            return Err(Error::format(format!(
                "unsupported index format version {version} (expected {FORMAT_VERSION})"
            )));
        }

        let analyzer: AnalyzerConfig = match metadata.get(ANALYZER_KEY)? {
            Some(data) => decode(&data)?,
            None => return Err(Error::format("index is missing its analyzer settings")),
        };

        tracing::debug!(path = %path.display(), ?analyzer, "opened index");
        Self::with_db(db, analyzer)
    }

    /// Create a fresh, empty index at `path`.
    pub fn create<P: AsRef<Path>>(path: P, analyzer: AnalyzerConfig) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        if db.open_tree(METADATA_TREE)?.contains_key(FORMAT_KEY)? {
            return Err(Error::format(format!(
                "an index already exists at {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), ?analyzer, "creating new index");
        Self::initialize(db, analyzer)
    }

    /// Open the index at `path`, creating it only if none exists.
    ///
    /// Returns the store and whether it was freshly created. An existing
    /// index keeps the analyzer it was built with.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        analyzer: AnalyzerConfig,
    ) -> Result<(Self, bool)> {
        match Self::open(&path) {
            Ok(store) => {
                if store.analyzer() != analyzer {
                    tracing::warn!(
                        stored = ?store.analyzer(),
                        requested = ?analyzer,
                        "existing index uses different analyzer settings; keeping stored ones"
                    );
                }
                Ok((store, false))
            }
            Err(Error::IndexNotFound(_)) => Ok((Self::create(path, analyzer)?, true)),
            Err(err) => Err(err),
        }
    }

    /// Create a temporary index (for testing)
    pub fn in_memory(analyzer: AnalyzerConfig) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::initialize(db, analyzer)
    }

    fn initialize(db: Db, analyzer: AnalyzerConfig) -> Result<Self> {
        let metadata = db.open_tree(METADATA_TREE)?;
        metadata.insert(ANALYZER_KEY, bincode::serialize(&analyzer)?)?;
        metadata.insert(AGGREGATES_KEY, bincode::serialize(&Aggregates::default())?)?;
        // Written last: its presence marks a complete index.
        metadata.insert(FORMAT_KEY, bincode::serialize(&FORMAT_VERSION)?)?;
        db.flush()?;

        Self::with_db(db, analyzer)
    }

    fn with_db(db: Db, analyzer: AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            documents: db.open_tree(DOCS_TREE)?,
            doc_stats: db.open_tree(STATS_TREE)?,
            postings: db.open_tree(POSTINGS_TREE)?,
            metadata: db.open_tree(METADATA_TREE)?,
            db,
            tokenizer: Tokenizer::new(analyzer),
            writer: Mutex::new(()),
            visibility: RwLock::new(()),
        })
    }

    /// The analyzer every document and query of this index goes through
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn analyzer(&self) -> AnalyzerConfig {
        self.tokenizer.config()
    }

    // ========== Raw Reads ==========

    fn read_postings(&self, term: &str) -> Result<PostingsList> {
        match self.postings.get(term.as_bytes())? {
            Some(data) => decode(&data),
            None => Ok(PostingsList::new()),
        }
    }

    fn read_doc_stats(&self, id: &str) -> Result<Option<DocStats>> {
        match self.doc_stats.get(id.as_bytes())? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }

    fn read_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        match self.documents.get(id.as_bytes())? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }

    fn read_aggregates(&self) -> Result<Aggregates> {
        match self.metadata.get(AGGREGATES_KEY)? {
            Some(data) => decode(&data),
            None => Err(Error::format("index is missing its aggregates")),
        }
    }

    // ========== Reads ==========

    /// A consistent view of the last committed state.
    ///
    /// Commits wait until every open reader is dropped, so keep readers short-lived.
    pub fn reader(&self) -> IndexReader<'_> {
        IndexReader {
            store: self,
            _guard: self.visibility.read(),
        }
    }

    /// Postings of a term; empty if the term was never indexed
    pub fn get_postings(&self, term: &str) -> Result<PostingsList> {
        self.reader().postings(term)
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> Result<DocumentRecord> {
        self.reader().document(id)
    }

    pub fn document_count(&self) -> Result<u64> {
        self.reader().document_count()
    }

    pub fn average_document_length(&self) -> Result<f64> {
        self.reader().average_document_length()
    }

    /// True while no document has been committed
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.document_count()? == 0)
    }

    /// Get index statistics
    pub fn stats(&self) -> Result<IndexStats> {
        let reader = self.reader();
        let aggregates = reader.aggregates()?;
        Ok(IndexStats {
            total_documents: aggregates.document_count,
            total_terms: reader.term_count(),
            avg_document_length: aggregates.average_document_length(),
        })
    }

    // ========== Writes ==========

    /// Start staging writes. Blocks while another batch is open.
    pub fn begin_batch(&self) -> IndexBatch<'_> {
        IndexBatch {
            store: self,
            _writer: self.writer.lock(),
            staged: BTreeMap::new(),
            clear_existing: false,
            committed: false,
        }
    }

    /// Flush all changes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Read access pinned to one committed state of the index
pub struct IndexReader<'a> {
    store: &'a IndexStore,
    _guard: RwLockReadGuard<'a, ()>,
}

impl IndexReader<'_> {
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.store.tokenizer
    }

    pub fn postings(&self, term: &str) -> Result<PostingsList> {
        self.store.read_postings(term)
    }

    /// Fails with [`Error::NotFound`] for unknown ids
    pub fn document(&self, id: &str) -> Result<DocumentRecord> {
        self.find_document(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn find_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        self.store.read_document(id)
    }

    /// Term count and title length of a document
    pub fn document_length(&self, id: &str) -> Result<Option<(u32, u32)>> {
        Ok(self
            .store
            .read_doc_stats(id)?
            .map(|stats| (stats.length, stats.title_length)))
    }

    pub fn aggregates(&self) -> Result<Aggregates> {
        self.store.read_aggregates()
    }

    pub fn document_count(&self) -> Result<u64> {
        Ok(self.aggregates()?.document_count)
    }

    pub fn average_document_length(&self) -> Result<f64> {
        Ok(self.aggregates()?.average_document_length())
    }

    /// Number of distinct terms in the index
    pub fn term_count(&self) -> usize {
        self.store.postings.len()
    }
}

struct StagedDocument {
    record: DocumentRecord,
    postings: BTreeMap<String, Posting>,
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub documents: usize,
    /// Staged documents that replaced an already indexed one
    pub replaced: usize,
    pub terms_written: usize,
    pub cleared: bool,
}

/// Writes staged for one atomic commit.
///
/// Holding a batch makes its owner the only writer. Dropping it without
/// calling [`IndexBatch::commit`] discards everything staged.
pub struct IndexBatch<'a> {
    store: &'a IndexStore,
    _writer: MutexGuard<'a, ()>,
    staged: BTreeMap<String, StagedDocument>,
    clear_existing: bool,
    committed: bool,
}

impl<'a> IndexBatch<'a> {
    /// Stage a document and its postings, replacing anything staged or
    /// committed under the same id.
    pub fn add(
        &mut self,
        record: DocumentRecord,
        postings: BTreeMap<String, Posting>,
    ) -> Result<()> {
        if record.id.is_empty() {
            return Err(Error::MalformedInput("document id must not be empty".into()));
        }
        if let Some(stray) = postings.values().find(|p| p.doc_id != record.id) {
            return Err(Error::MalformedInput(format!(
                "posting for '{}' staged with document '{}'",
                stray.doc_id, record.id
            )));
        }

        self.staged
            .insert(record.id.clone(), StagedDocument { record, postings });
        Ok(())
    }

    /// Make the commit replace the whole index instead of merging into it
    pub fn clear_existing(&mut self) {
        self.clear_existing = true;
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn touched<'m>(
        &self,
        lists: &'m mut HashMap<String, PostingsList>,
        term: &str,
    ) -> Result<&'m mut PostingsList> {
        match lists.entry(term.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let list = if self.clear_existing {
                    PostingsList::new()
                } else {
                    self.store.read_postings(term)?
                };
                Ok(entry.insert(list))
            }
        }
    }

    /// Atomically publish everything staged. On error nothing becomes visible.
    pub fn commit(mut self) -> Result<CommitSummary> {
        let store = self.store;
        let mut aggregates = if self.clear_existing {
            Aggregates::default()
        } else {
            store.read_aggregates()?
        };

        let mut docs_batch = Batch::default();
        let mut stats_batch = Batch::default();
        let mut postings_batch = Batch::default();
        let mut metadata_batch = Batch::default();

        if self.clear_existing {
            for (tree, target) in [
                (&store.documents, &mut docs_batch),
                (&store.doc_stats, &mut stats_batch),
                (&store.postings, &mut postings_batch),
            ] {
                for key in tree.iter().keys() {
                    target.remove(key?);
                }
            }
        }

        let mut lists: HashMap<String, PostingsList> = HashMap::new();
        let mut replaced = 0;

        for (id, staged) in &self.staged {
            if !self.clear_existing {
                if let Some(previous) = store.read_doc_stats(id)? {
                    replaced += 1;
                    aggregates.document_count = aggregates.document_count.saturating_sub(1);
                    aggregates.total_length = aggregates
                        .total_length
                        .saturating_sub(u64::from(previous.length));
                    for term in &previous.terms {
                        self.touched(&mut lists, term)?.remove(id);
                    }
                }
            }

            for (term, posting) in &staged.postings {
                self.touched(&mut lists, term)?.upsert(posting.clone());
            }

            let stats = DocStats {
                length: staged.record.length,
                title_length: staged.record.title_length,
                terms: staged.postings.keys().cloned().collect(),
            };
            docs_batch.insert(id.as_bytes(), bincode::serialize(&staged.record)?);
            stats_batch.insert(id.as_bytes(), bincode::serialize(&stats)?);

            aggregates.document_count += 1;
            aggregates.total_length += u64::from(staged.record.length);
        }

        for (term, list) in &lists {
            if list.is_empty() {
                postings_batch.remove(term.as_bytes());
            } else {
                postings_batch.insert(term.as_bytes(), bincode::serialize(list)?);
            }
        }
        metadata_batch.insert(AGGREGATES_KEY, bincode::serialize(&aggregates)?);

        {
            let _visible = store.visibility.write();
            (
                &store.documents,
                &store.doc_stats,
                &store.postings,
                &store.metadata,
            )
                .transaction(|(documents, doc_stats, postings, metadata)| {
                    documents.apply_batch(&docs_batch)?;
                    doc_stats.apply_batch(&stats_batch)?;
                    postings.apply_batch(&postings_batch)?;
                    metadata.apply_batch(&metadata_batch)?;
                    Ok::<_, ConflictableTransactionError<()>>(())
                })
                .map_err(|err| match err {
                    TransactionError::Storage(err) => Error::from(err),
                    TransactionError::Abort(()) => Error::format("index commit aborted"),
                })?;
        }
        store.flush()?;

        self.committed = true;
        let summary = CommitSummary {
            documents: self.staged.len(),
            replaced,
            terms_written: lists.len(),
            cleared: self.clear_existing,
        };
        tracing::info!(
            documents = summary.documents,
            replaced = summary.replaced,
            terms = summary.terms_written,
            cleared = summary.cleared,
            total_documents = aggregates.document_count,
            "committed index batch"
        );

        Ok(summary)
    }
}

impl Drop for IndexBatch<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.staged.is_empty() {
            tracing::debug!(staged = self.staged.len(), "discarding uncommitted index batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceDocument;
    use crate::indexer::analyze_document;

    fn stage(batch: &mut IndexBatch<'_>, id: &str, title: &str, body: &str) -> Result<()> {
        let doc = SourceDocument::new(id, title, body, format!("/{id}.html"));
        let (record, postings) = analyze_document(batch.store.tokenizer(), &doc);
        batch.add(record, postings)
    }

    fn doc_ids(store: &IndexStore, term: &str) -> Result<Vec<String>> {
        Ok(store
            .get_postings(term)?
            .iter()
            .map(|p| p.doc_id.clone())
            .collect())
    }

    #[test]
    fn test_batch_invisible_until_commit() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;
        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "Cats", "cats are great pets")?;

        // Reads of the committed state do not need the writer lock
        assert!(store.get_postings("cats")?.is_empty());
        assert_eq!(store.document_count()?, 0);

        let summary = batch.commit()?;
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.replaced, 0);
        assert_eq!(doc_ids(&store, "cats")?, vec!["a"]);
        assert_eq!(store.document_count()?, 1);
        assert_eq!(store.average_document_length()?, 5.0);

        Ok(())
    }

    #[test]
    fn test_dropped_batch_is_discarded() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;
        {
            let mut batch = store.begin_batch();
            stage(&mut batch, "a", "", "dropped")?;
        }

        assert!(store.get_postings("dropped")?.is_empty());
        assert!(matches!(store.get_document("a"), Err(Error::NotFound(_))));

        // The writer lock was released with the batch
        let mut batch = store.begin_batch();
        stage(&mut batch, "b", "", "kept")?;
        batch.commit()?;
        assert_eq!(doc_ids(&store, "kept")?, vec!["b"]);

        Ok(())
    }

    #[test]
    fn test_reindex_replaces_postings() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "cat cat")?;
        stage(&mut batch, "b", "", "cat")?;
        batch.commit()?;

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "dog")?;
        let summary = batch.commit()?;

        assert_eq!(summary.replaced, 1);
        assert_eq!(doc_ids(&store, "cat")?, vec!["b"]);
        assert_eq!(doc_ids(&store, "dog")?, vec!["a"]);
        assert_eq!(store.get_document("a")?.body, "dog");
        assert_eq!(store.document_count()?, 2);
        assert_eq!(store.average_document_length()?, 1.0);

        Ok(())
    }

    #[test]
    fn test_vanished_term_is_removed() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "unique words")?;
        batch.commit()?;
        // "a" and "html" come from the URL
        assert_eq!(store.stats()?.total_terms, 4);

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "words")?;
        batch.commit()?;

        assert!(store.get_postings("unique")?.is_empty());
        assert_eq!(store.stats()?.total_terms, 3);

        Ok(())
    }

    #[test]
    fn test_last_staged_version_wins() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "first")?;
        stage(&mut batch, "a", "", "second")?;
        assert_eq!(batch.len(), 1);
        batch.commit()?;

        assert!(store.get_postings("first")?.is_empty());
        assert_eq!(doc_ids(&store, "second")?, vec!["a"]);

        Ok(())
    }

    #[test]
    fn test_clear_existing_rebuilds() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;

        let mut batch = store.begin_batch();
        stage(&mut batch, "a", "", "old content")?;
        stage(&mut batch, "b", "", "shared content")?;
        batch.commit()?;

        let mut batch = store.begin_batch();
        batch.clear_existing();
        stage(&mut batch, "c", "", "shared fresh")?;
        let summary = batch.commit()?;

        assert!(summary.cleared);
        assert!(store.get_postings("old")?.is_empty());
        assert!(store.get_postings("content")?.is_empty());
        assert_eq!(doc_ids(&store, "shared")?, vec!["c"]);
        assert!(matches!(store.get_document("a"), Err(Error::NotFound(_))));
        assert_eq!(store.document_count()?, 1);

        Ok(())
    }

    #[test]
    fn test_add_rejects_foreign_postings() -> Result<()> {
        let store = IndexStore::in_memory(AnalyzerConfig::default())?;
        let tokenizer = Tokenizer::default();
        let (record, _) = analyze_document(&tokenizer, &SourceDocument::new("a", "", "x", ""));
        let (_, foreign) = analyze_document(&tokenizer, &SourceDocument::new("b", "", "x", ""));

        let mut batch = store.begin_batch();
        assert!(matches!(
            batch.add(record, foreign),
            Err(Error::MalformedInput(_))
        ));
        assert!(batch.is_empty());

        Ok(())
    }

    #[test]
    fn test_open_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = IndexStore::open(dir.path().join("missing"));
        assert!(matches!(result, Err(Error::IndexNotFound(_))));
    }

    #[test]
    fn test_open_directory_without_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an index").unwrap();

        match IndexStore::open(dir.path()) {
            Err(err) => assert!(err.is_storage_unavailable()),
            Ok(_) => panic!("opened a directory that holds no index"),
        }

        // The directory was not touched
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("notes.txt")]);
    }

    #[test]
    fn test_open_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "{}").unwrap();

        match IndexStore::open(&path) {
            Err(err) => assert!(err.is_storage_unavailable()),
            Ok(_) => panic!("opened a plain file as an index"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_persists_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        let analyzer = AnalyzerConfig {
            stopwords: true,
            stemming: false,
        };

        {
            let (store, created) = IndexStore::open_or_create(&path, analyzer)?;
            assert!(created);
            let mut batch = store.begin_batch();
            stage(&mut batch, "a", "The Title", "the body")?;
            batch.commit()?;
        }

        let (store, created) = IndexStore::open_or_create(&path, AnalyzerConfig::default())?;
        assert!(!created);
        assert_eq!(store.analyzer(), analyzer);
        assert_eq!(store.get_document("a")?.title, "The Title");
        assert_eq!(doc_ids(&store, "body")?, vec!["a"]);
        assert!(store.get_postings("the")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_create_refuses_existing_index() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        drop(IndexStore::create(&path, AnalyzerConfig::default())?);

        match IndexStore::create(&path, AnalyzerConfig::default()) {
            Err(err) => assert!(err.is_storage_unavailable()),
            Ok(_) => panic!("created over an existing index"),
        }

        Ok(())
    }
}

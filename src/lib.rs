// Re-export main components
pub mod api;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod highlight;
pub mod index;
pub mod indexer;
pub mod ranking;
pub mod source;
pub mod storage;
pub mod tokenizer;

// Re-export commonly used types
pub use config::Config;
pub use document::{DocumentRecord, SearchHit, SearchResult, SourceDocument};
pub use engine::{Query, SearchSettings, Searcher};
pub use error::{Error, Result, StorageError};
pub use highlight::Highlighter;
pub use index::{Posting, PostingsList};
pub use indexer::{BatchIndexer, IndexReport};
pub use storage::{IndexBatch, IndexReader, IndexStore};
pub use tokenizer::{AnalyzerConfig, Tokenizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

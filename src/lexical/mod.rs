//! Lexical side of the engine: per-file term statistics, BM25 ranked
//! search with regex/substring matching, and shard persistence.

pub mod bm25;
pub mod index;
pub mod language;
pub mod matcher;

pub use index::{CorpusStats, FileDoc, InvertedIndex, LexicalStats};
pub use language::detect_language;
pub use matcher::{CompiledQuery, QueryNode};

use crate::error::Result;
use crate::types::{CancelToken, SearchHit};
use std::path::{Path, PathBuf};

/// Options accepted by a lexical search.
#[derive(Debug, Clone, Default)]
pub struct LexicalSearchOptions {
    pub max_results: usize,
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub file_patterns: Vec<String>,
    pub languages: Vec<String>,
    /// Pre-built regex alternatives (e.g. generated import patterns) that
    /// replace term matching when present.
    pub extra_regexes: Vec<String>,
}

/// Result of an indexing batch. A batch with at least one success is a
/// success; per-file failures are reported here and via logs.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub indexed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Contract of the lexical indexer.
pub trait LexicalIndex: Send + Sync {
    fn index_files(&self, paths: &[PathBuf], token: &CancelToken) -> Result<IndexOutcome>;
    fn search(&self, query: &str, options: &LexicalSearchOptions) -> Result<Vec<SearchHit>>;
    fn delete_files(&self, paths: &[PathBuf]) -> Result<()>;
    fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
    fn stats(&self) -> Result<LexicalStats>;
    fn save(&self, path: &Path) -> Result<()>;
    fn load(&self, path: &Path) -> Result<()>;
    fn close(&self) -> Result<()>;
}

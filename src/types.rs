//! Shared data model: chunks, hits, requests and responses, plus the
//! cancellation token threaded through long-running operations.

use crate::constants::DEFAULT_TOP_K;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A contiguous byte range of one source file, the unit of embedding.
///
/// Chunk ids are the only interchange format between the two indexers:
/// `"<path>:<start>-<end>@<line>"`, where `<line>` is the 1-based line the
/// chunk starts on. Chunks of a file never overlap and are ordered by
/// `start_byte`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub file_path: PathBuf,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub language: String,
    /// SHA-1 over the chunk text, used for change detection.
    pub text_hash: String,
    pub text: String,
}

/// Parsed form of a chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub path: PathBuf,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based; 0 when the id carries no line suffix (legacy sidecars).
    pub start_line: usize,
}

/// Formats the canonical chunk id.
pub fn format_chunk_id(path: &std::path::Path, start: usize, end: usize, line: usize) -> String {
    format!("{}:{}-{}@{}", path.display(), start, end, line)
}

/// Parses a chunk id back into its parts.
///
/// Splits from the right so file paths containing `:` survive. Ids without
/// the `@<line>` suffix parse with `start_line = 0` rather than guessing.
pub fn parse_chunk_id(id: &str) -> Option<ChunkRef> {
    let (head, line) = match id.rsplit_once('@') {
        Some((head, line_str)) => (head, line_str.parse::<usize>().ok()?),
        None => (id, 0),
    };
    let (path_part, range) = head.rsplit_once(':')?;
    let (start_str, end_str) = range.split_once('-')?;
    let start = start_str.parse::<usize>().ok()?;
    let end = end_str.parse::<usize>().ok()?;
    if end <= start && !(start == 0 && end == 0) {
        return None;
    }
    Some(ChunkRef {
        path: PathBuf::from(path_part),
        start_byte: start,
        end_byte: end,
        start_line: line,
    })
}

/// Which side of the engine produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Lexical,
    Semantic,
    /// A lexical and a semantic candidate merged under the same key.
    Both,
}

impl HitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitSource::Lexical => "lexical",
            HitSource::Semantic => "semantic",
            HitSource::Both => "both",
        }
    }
}

/// One matching region: file, line, byte range, score, provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    /// 1-based; 0 means "no line context".
    pub line_number: usize,
    pub text: String,
    pub score: f32,
    pub source: HitSource,
    pub start_byte: usize,
    pub end_byte: usize,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl SearchHit {
    /// Merge key: hits from both sides that resolve to the same key are
    /// fused into a single `source = both` hit.
    pub fn key(&self) -> String {
        if self.line_number == 0 {
            self.file.clone()
        } else {
            format!("{}:{}", self.file, self.line_number)
        }
    }
}

/// Structural filters accompanying a search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub repos: Vec<String>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// A search request, shared by the CLI and the stdio surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k", alias = "k")]
    pub top_k: usize,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            language: None,
            filters: SearchFilters::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Response envelope for a search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total_hits: usize,
    pub query_time_ns: u64,
    pub lexical_hits: usize,
    pub semantic_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analytics: Option<crate::fusion::FusionAnalytics>,
}

/// Snapshot of indexing progress, served by `index_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub repository: String,
    pub lexical_progress_pct: f32,
    pub semantic_progress_pct: f32,
    pub total_files: usize,
    pub indexed_files: usize,
    #[serde(default)]
    pub failed_files: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Output of `explain`: how a query would be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExplanation {
    pub original: String,
    pub extracted_keywords: Vec<String>,
    pub is_regex: bool,
    pub strategy_label: String,
    pub bm25_weight: f32,
}

/// Cooperative cancellation token.
///
/// Cloned freely; any clone can cancel. Long-running operations call
/// `check()` at loop boundaries and before committing mutations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_chunk_id_round_trip() {
        let id = format_chunk_id(Path::new("src/auth/login.go"), 120, 540, 7);
        assert_eq!(id, "src/auth/login.go:120-540@7");
        let parsed = parse_chunk_id(&id).unwrap();
        assert_eq!(parsed.path, PathBuf::from("src/auth/login.go"));
        assert_eq!(parsed.start_byte, 120);
        assert_eq!(parsed.end_byte, 540);
        assert_eq!(parsed.start_line, 7);
    }

    #[test]
    fn test_chunk_id_with_colon_in_path() {
        let id = format_chunk_id(Path::new("C:/work/mod.rs"), 0, 10, 1);
        let parsed = parse_chunk_id(&id).unwrap();
        assert_eq!(parsed.path, PathBuf::from("C:/work/mod.rs"));
    }

    #[test]
    fn test_chunk_id_without_line_suffix() {
        let parsed = parse_chunk_id("lib/util.py:5-25").unwrap();
        assert_eq!(parsed.start_line, 0);
        assert_eq!(parsed.start_byte, 5);
    }

    #[test]
    fn test_chunk_id_rejects_inverted_range() {
        assert!(parse_chunk_id("a.rs:50-10@1").is_none());
    }

    #[test]
    fn test_hit_key_uses_line_when_present() {
        let mut hit = SearchHit {
            file: "a.rs".into(),
            line_number: 3,
            text: String::new(),
            score: 1.0,
            source: HitSource::Lexical,
            start_byte: 0,
            end_byte: 0,
            language: "rust".into(),
            last_modified: None,
        };
        assert_eq!(hit.key(), "a.rs:3");
        hit.line_number = 0;
        assert_eq!(hit.key(), "a.rs");
    }

    #[test]
    fn test_request_accepts_k_alias() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"foo","k":5}"#).unwrap();
        assert_eq!(req.top_k, 5);
        let req: SearchRequest = serde_json::from_str(r#"{"query":"foo"}"#).unwrap();
        assert_eq!(req.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        let clone = token.clone();
        clone.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}

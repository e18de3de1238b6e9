//! In-memory lexical index with bincode shard persistence.
//!
//! One reader/writer lock guards the document set and the corpus
//! statistics together, so readers always observe statistics consistent
//! with the live documents. No lock is ever held across file I/O: batches
//! are prepared lock-free and committed atomically under the writer lock.

use crate::constants::{INDEX_FORMAT_VERSION, MAX_FILE_SIZE_BYTES};
use crate::error::{Error, Result};
use crate::lexical::language::detect_language;
use crate::lexical::matcher::{with_file_patterns, CompiledQuery, QueryNode};
use crate::lexical::{IndexOutcome, LexicalIndex, LexicalSearchOptions};
use crate::tokenizer;
use crate::types::{CancelToken, HitSource, SearchHit};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// One indexed file with its term statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDoc {
    pub path: String,
    pub language: String,
    pub content: String,
    pub term_freqs: HashMap<String, u32>,
    /// Tokenized document length (same tokenization as queries).
    pub length: usize,
    pub last_modified: Option<DateTime<Utc>>,
    /// Derived, rebuilt after deserialization.
    #[serde(skip)]
    pub content_lower: String,
    /// Byte spans of each line, excluding the terminator. Derived.
    #[serde(skip)]
    pub line_spans: Vec<(usize, usize)>,
}

impl FileDoc {
    pub fn from_content(path: String, content: String, last_modified: Option<DateTime<Utc>>) -> Self {
        let language = detect_language(Path::new(&path));
        let tokens = tokenizer::tokenize(&content);
        let length = tokens.len();
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        let mut doc = Self {
            path,
            language,
            content,
            term_freqs,
            length,
            last_modified,
            content_lower: String::new(),
            line_spans: Vec::new(),
        };
        doc.rebuild_derived();
        doc
    }

    /// Rebuilds the fields skipped by serde.
    pub(crate) fn rebuild_derived(&mut self) {
        self.content_lower = self.content.to_lowercase();
        self.line_spans = compute_line_spans(&self.content);
    }

    pub fn basename(&self) -> &str {
        self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path)
    }
}

fn compute_line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for line in content.split_inclusive('\n') {
        let end = start + line.len();
        let visible = line.trim_end_matches(['\n', '\r']);
        spans.push((start, start + visible.len()));
        start = end;
    }
    spans
}

/// Corpus-wide statistics, consistent with the live document set after
/// every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_docs: usize,
    pub avg_doc_length: f32,
    pub doc_freqs: HashMap<String, u32>,
    pub total_terms: u64,
}

impl CorpusStats {
    fn recompute(docs: &HashMap<String, FileDoc>) -> Self {
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_terms: u64 = 0;
        for doc in docs.values() {
            total_terms += doc.length as u64;
            for term in doc.term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let total_docs = docs.len();
        let avg_doc_length = if total_docs > 0 {
            total_terms as f32 / total_docs as f32
        } else {
            0.0
        };
        Self {
            total_docs,
            avg_doc_length,
            doc_freqs,
            total_terms,
        }
    }
}

/// Point-in-time statistics surfaced by `stats()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalStats {
    pub total_docs: usize,
    pub unique_terms: usize,
    pub total_terms: u64,
    pub avg_doc_length: f32,
    pub last_index_time: Option<DateTime<Utc>>,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexState {
    Empty,
    Building,
    Ready,
    Mutating,
    Closed,
}

impl IndexState {
    fn as_str(&self) -> &'static str {
        match self {
            IndexState::Empty => "empty",
            IndexState::Building => "building",
            IndexState::Ready => "ready",
            IndexState::Mutating => "mutating",
            IndexState::Closed => "closed",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SerializedShard {
    version: u32,
    docs: HashMap<String, FileDoc>,
    stats: CorpusStats,
    last_index_time: Option<DateTime<Utc>>,
}

struct Inner {
    state: IndexState,
    docs: HashMap<String, FileDoc>,
    stats: CorpusStats,
    last_index_time: Option<DateTime<Utc>>,
}

/// The lexical index implementation.
pub struct InvertedIndex {
    inner: RwLock<Inner>,
    max_file_size: u64,
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::with_max_file_size(MAX_FILE_SIZE_BYTES)
    }

    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: IndexState::Empty,
                docs: HashMap::new(),
                stats: CorpusStats::default(),
                last_index_time: None,
            }),
            max_file_size,
        }
    }

    /// Reads and tokenizes one file, lock-free.
    fn prepare_doc(&self, path: &Path) -> Result<FileDoc> {
        let metadata = fs::metadata(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        if metadata.len() > self.max_file_size {
            return Err(Error::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }
        let content = fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(FileDoc::from_content(
            path.to_string_lossy().into_owned(),
            content,
            last_modified,
        ))
    }

    fn build_query_tree(query: &str, options: &LexicalSearchOptions) -> QueryNode {
        let content_node = if !options.extra_regexes.is_empty() {
            QueryNode::Or(
                options
                    .extra_regexes
                    .iter()
                    .map(|r| QueryNode::Regex(r.clone()))
                    .collect(),
            )
        } else if options.use_regex {
            QueryNode::Regex(query.to_string())
        } else {
            let terms = tokenizer::tokenize(query);
            if terms.is_empty() {
                QueryNode::Substring(query.trim().to_string())
            } else {
                QueryNode::And(terms.into_iter().map(QueryNode::Substring).collect())
            }
        };
        with_file_patterns(content_node, &options.file_patterns)
    }

    fn language_allowed(doc: &FileDoc, languages: &[String]) -> bool {
        languages.is_empty()
            || languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&doc.language))
    }

    /// Expands a matched document into per-line hits at the document
    /// score.
    fn expand_hits(doc: &FileDoc, score: f32, query: &CompiledQuery, out: &mut Vec<SearchHit>) {
        let mut matched_any = false;
        for (i, &(start, end)) in doc.line_spans.iter().enumerate() {
            let line = &doc.content[start..end];
            if query.line_matches(line) {
                matched_any = true;
                out.push(SearchHit {
                    file: doc.path.clone(),
                    line_number: i + 1,
                    text: line.to_string(),
                    score,
                    source: HitSource::Lexical,
                    start_byte: start,
                    end_byte: end,
                    language: doc.language.clone(),
                    last_modified: doc.last_modified,
                });
            }
        }
        // A document can match without any single line matching (pure
        // filename queries); emit one file-level hit so it is not lost.
        if !matched_any {
            out.push(SearchHit {
                file: doc.path.clone(),
                line_number: 0,
                text: String::new(),
                score,
                source: HitSource::Lexical,
                start_byte: 0,
                end_byte: doc.content.len(),
                language: doc.language.clone(),
                last_modified: doc.last_modified,
            });
        }
    }
}

impl LexicalIndex for InvertedIndex {
    fn index_files(&self, paths: &[PathBuf], token: &CancelToken) -> Result<IndexOutcome> {
        token.check()?;
        let mut prepared: Vec<FileDoc> = Vec::new();
        let mut failures: Vec<(PathBuf, Error)> = Vec::new();
        for path in paths {
            token.check()?;
            match self.prepare_doc(path) {
                Ok(doc) => prepared.push(doc),
                Err(e) => {
                    warn!("Failed to index {}: {}", path.display(), e);
                    failures.push((path.clone(), e));
                }
            }
        }

        if prepared.is_empty() && !paths.is_empty() {
            let (_, first) = failures.remove(0);
            return Err(first);
        }

        // Commit phase: everything below is batch-atomic under the writer
        // lock. The cancel check happens before the first mutation.
        token.check()?;
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        if inner.state == IndexState::Closed {
            return Err(Error::NotReady);
        }
        inner.state = if inner.state == IndexState::Empty {
            IndexState::Building
        } else {
            IndexState::Mutating
        };
        let indexed = prepared.len();
        for doc in prepared {
            inner.docs.insert(doc.path.clone(), doc);
        }
        inner.stats = CorpusStats::recompute(&inner.docs);
        inner.last_index_time = Some(Utc::now());
        inner.state = IndexState::Ready;
        debug!(
            "Indexed {} files ({} failures); corpus now {} docs / {} terms",
            indexed,
            failures.len(),
            inner.stats.total_docs,
            inner.stats.doc_freqs.len()
        );

        Ok(IndexOutcome {
            indexed,
            failed: failures
                .into_iter()
                .map(|(p, e)| (p, e.to_string()))
                .collect(),
        })
    }

    fn search(&self, query: &str, options: &LexicalSearchOptions) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        match inner.state {
            IndexState::Empty | IndexState::Building | IndexState::Closed => {
                return Err(Error::NotReady)
            }
            _ => {}
        }
        if query.trim().is_empty() && options.extra_regexes.is_empty() {
            return Err(Error::BadQuery("empty query".to_string()));
        }

        let tree = Self::build_query_tree(query, options);
        let compiled = CompiledQuery::compile(&tree, options.case_sensitive)?;

        let mut hits: Vec<SearchHit> = Vec::new();
        for doc in inner.docs.values() {
            if !Self::language_allowed(doc, &options.languages) {
                continue;
            }
            if let Some(score) = compiled.score(doc, &inner.stats) {
                if score > 0.0 {
                    Self::expand_hits(doc, score, &compiled, &mut hits);
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line_number.cmp(&b.line_number))
        });
        if options.max_results > 0 && hits.len() > options.max_results {
            hits.truncate(options.max_results);
        }
        debug!("Lexical search for {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    fn delete_files(&self, paths: &[PathBuf]) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        if inner.state == IndexState::Closed {
            return Err(Error::NotReady);
        }
        if inner.state != IndexState::Empty {
            inner.state = IndexState::Mutating;
        }
        let mut removed = 0usize;
        for path in paths {
            let key = path.to_string_lossy().into_owned();
            if inner.docs.remove(&key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            inner.stats = CorpusStats::recompute(&inner.docs);
        }
        inner.state = if inner.docs.is_empty() {
            IndexState::Empty
        } else {
            IndexState::Ready
        };
        debug!("Deleted {} of {} requested files", removed, paths.len());
        Ok(())
    }

    fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        let prefix_lower = prefix.to_lowercase();
        let mut candidates: Vec<(&String, u32)> = inner
            .stats
            .doc_freqs
            .iter()
            .filter(|(term, _)| term.starts_with(&prefix_lower))
            .map(|(term, &df)| (term, df))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|(term, _)| term.clone())
            .collect())
    }

    fn stats(&self) -> Result<LexicalStats> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        Ok(LexicalStats {
            total_docs: inner.stats.total_docs,
            unique_terms: inner.stats.doc_freqs.len(),
            total_terms: inner.stats.total_terms,
            avg_doc_length: inner.stats.avg_doc_length,
            last_index_time: inner.last_index_time,
            state: inner.state.as_str().to_string(),
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let shard = SerializedShard {
            version: INDEX_FORMAT_VERSION,
            docs: inner.docs.clone(),
            stats: inner.stats.clone(),
            last_index_time: inner.last_index_time,
        };
        let bytes = bincode::serialize(&shard)?;
        fs::write(path, bytes)?;
        debug!(
            "Saved lexical shard to {} ({} docs)",
            path.display(),
            shard.stats.total_docs
        );
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!("No lexical shard at {}, starting empty", path.display());
            return Ok(());
        }
        let bytes = fs::read(path)?;
        let shard: SerializedShard = match bincode::deserialize(&bytes) {
            Ok(shard) => shard,
            Err(e) => {
                warn!(
                    "Lexical shard {} is unreadable ({}); starting empty",
                    path.display(),
                    e
                );
                return Ok(());
            }
        };
        if shard.version != INDEX_FORMAT_VERSION {
            warn!(
                "Lexical shard version {} != {}; starting empty",
                shard.version, INDEX_FORMAT_VERSION
            );
            return Ok(());
        }
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        inner.docs = shard.docs;
        for doc in inner.docs.values_mut() {
            doc.rebuild_derived();
        }
        inner.stats = shard.stats;
        inner.last_index_time = shard.last_index_time;
        inner.state = if inner.docs.is_empty() {
            IndexState::Empty
        } else {
            IndexState::Ready
        };
        debug!(
            "Loaded lexical shard from {} ({} docs)",
            path.display(),
            inner.stats.total_docs
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Taking the writer lock waits for in-flight readers and writers.
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        inner.state = IndexState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn indexed(files: &[(&str, &str)]) -> (InvertedIndex, tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = files
            .iter()
            .map(|(name, content)| write_file(dir.path(), name, content))
            .collect();
        let index = InvertedIndex::new();
        index.index_files(&paths, &CancelToken::new()).unwrap();
        (index, dir, paths)
    }

    #[test]
    fn test_search_rejected_before_first_index() {
        let index = InvertedIndex::new();
        let err = index
            .search("anything", &LexicalSearchOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotReady));
    }

    #[test]
    fn test_index_and_search_by_term() {
        let (index, _dir, paths) = indexed(&[
            ("auth.go", "func authenticate(user string) bool {\n\treturn true\n}\n"),
            ("other.go", "func helper() {}\n"),
        ]);
        let hits = index
            .search(
                "authenticate",
                &LexicalSearchOptions {
                    max_results: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file, paths[0].to_string_lossy());
        assert_eq!(hits[0].line_number, 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].source, HitSource::Lexical);
    }

    #[test]
    fn test_line_numbers_and_byte_ranges() {
        let (index, _dir, _) = indexed(&[(
            "multi.py",
            "import os\n\ndef authenticate():\n    pass\n",
        )]);
        let hits = index
            .search("authenticate", &LexicalSearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_number, 3);
        let start = hits[0].start_byte;
        let end = hits[0].end_byte;
        assert_eq!(&hits[0].text, "def authenticate():");
        assert_eq!(end - start, hits[0].text.len());
    }

    #[test]
    fn test_missing_file_fails_batch_of_one() {
        let index = InvertedIndex::new();
        let err = index
            .index_files(&[PathBuf::from("/no/such/file.rs")], &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_partial_batch_succeeds() {
        let dir = tempdir().unwrap();
        let good = write_file(dir.path(), "ok.rs", "fn main() {}");
        let index = InvertedIndex::new();
        let outcome = index
            .index_files(
                &[good, PathBuf::from("/no/such/file.rs")],
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(outcome.indexed, 1);
        assert_eq!(outcome.failed.len(), 1);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = tempdir().unwrap();
        let big = write_file(dir.path(), "big.txt", &"x".repeat(2048));
        let index = InvertedIndex::with_max_file_size(1024);
        let err = index.index_files(&[big], &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
    }

    #[test]
    fn test_regex_search_fixed_score() {
        let (index, _dir, _) = indexed(&[("main.go", "func main() {\n}\n")]);
        let hits = index
            .search(
                r"func\s+\w+",
                &LexicalSearchOptions {
                    use_regex: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, crate::constants::REGEX_MATCH_SCORE);
    }

    #[test]
    fn test_invalid_regex_is_bad_query() {
        let (index, _dir, _) = indexed(&[("main.go", "func main() {}\n")]);
        let err = index
            .search(
                "([",
                &LexicalSearchOptions {
                    use_regex: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[test]
    fn test_language_filter() {
        let (index, _dir, _) = indexed(&[
            ("a.go", "authenticate here\n"),
            ("b.py", "authenticate there\n"),
        ]);
        let hits = index
            .search(
                "authenticate",
                &LexicalSearchOptions {
                    languages: vec!["GO".to_string()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].file.ends_with("a.go"));
    }

    #[test]
    fn test_file_pattern_filter() {
        let (index, _dir, _) = indexed(&[
            ("a.go", "authenticate here\n"),
            ("b.py", "authenticate there\n"),
        ]);
        let hits = index
            .search(
                "authenticate",
                &LexicalSearchOptions {
                    file_patterns: vec!["*.py".to_string()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].file.ends_with("b.py"));
    }

    #[test]
    fn test_delete_removes_from_search() {
        let (index, _dir, paths) = indexed(&[
            ("a.go", "authenticate here\n"),
            ("b.go", "authenticate there\n"),
        ]);
        index.delete_files(&paths[..1]).unwrap();
        let hits = index
            .search("authenticate", &LexicalSearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].file.ends_with("b.go"));
        let stats = index.stats().unwrap();
        assert_eq!(stats.total_docs, 1);
    }

    #[test]
    fn test_corpus_stats_consistent_after_mutations() {
        let (index, dir, paths) = indexed(&[("a.rs", "alpha beta gamma\n")]);
        let before = index.stats().unwrap();
        assert_eq!(before.total_docs, 1);

        let more = write_file(dir.path(), "b.rs", "alpha delta\n");
        index.index_files(&[more], &CancelToken::new()).unwrap();
        let after = index.stats().unwrap();
        assert_eq!(after.total_docs, 2);
        assert!(after.total_terms > before.total_terms);

        index.delete_files(&paths).unwrap();
        assert_eq!(index.stats().unwrap().total_docs, 1);
    }

    #[test]
    fn test_suggest_prefix() {
        let (index, _dir, _) = indexed(&[(
            "a.rs",
            "authenticate authorize authorize authorize nothing\n",
        )]);
        let suggestions = index.suggest("auth", 10).unwrap();
        assert!(suggestions.contains(&"authenticate".to_string()));
        assert!(suggestions.contains(&"authorize".to_string()));
        assert!(index.suggest("zzz", 10).unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let (index, dir, _) = indexed(&[("a.go", "func authenticate() {}\n")]);
        let shard = dir.path().join("lexical.bin");
        index.save(&shard).unwrap();

        let fresh = InvertedIndex::new();
        fresh.load(&shard).unwrap();
        let hits = fresh
            .search("authenticate", &LexicalSearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(fresh.stats().unwrap().total_docs, 1);
    }

    #[test]
    fn test_load_garbage_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let shard = write_file(dir.path(), "lexical.bin", "not a shard");
        let index = InvertedIndex::new();
        index.load(&shard).unwrap();
        assert_eq!(index.stats().unwrap().state, "empty");
    }

    #[test]
    fn test_cancelled_batch_leaves_index_unchanged() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.rs", "fn main() {}");
        let index = InvertedIndex::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            index.index_files(&[path], &token),
            Err(Error::Cancelled)
        ));
        assert_eq!(index.stats().unwrap().total_docs, 0);
    }

    #[test]
    fn test_close_rejects_further_writes() {
        let (index, dir, _) = indexed(&[("a.rs", "fn main() {}")]);
        index.close().unwrap();
        let path = write_file(dir.path(), "b.rs", "fn other() {}");
        assert!(index.index_files(&[path], &CancelToken::new()).is_err());
    }
}

//! The query service: request → parse → (lexical ∥ semantic) → fusion.
//!
//! Holds shared handles to both indexes and the embedder; the ingestion
//! coordinator receives clones of the same handles. The service itself is
//! stateless per request and fully reentrant.

use crate::config::{AppConfig, FusionStrategy};
use crate::constants::{CANDIDATE_MULTIPLIER, LEXICAL_SHARD_FILE, SUGGEST_LIMIT, SUGGEST_MIN_PREFIX, VECTOR_FILE};
use crate::embed::{build_embedder, CachingEmbedder};
use crate::error::{Error, Result};
use crate::fusion;
use crate::ingest::IngestCoordinator;
use crate::lexical::{detect_language, matcher, InvertedIndex, LexicalIndex, LexicalSearchOptions};
use crate::query::{self, ParsedQuery};
use crate::types::{
    parse_chunk_id, CancelToken, HitSource, IndexStatus, QueryExplanation, SearchHit,
    SearchRequest, SearchResponse,
};
use crate::vector::{FlatVectorIndex, VectorIndex, VectorSearchOptions};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The engine's request-facing surface.
pub struct SearchService {
    lexical: Arc<dyn LexicalIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<CachingEmbedder>,
    config: AppConfig,
    index_root: PathBuf,
    coordinator: RwLock<Option<Arc<IngestCoordinator>>>,
}

impl SearchService {
    /// Builds the service from configuration, loading any persisted index
    /// state from the index root.
    pub fn open(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let index_root = config.index_root()?;
        let embedder = build_embedder(&config)?;

        let lexical: Arc<dyn LexicalIndex> = Arc::new(InvertedIndex::new());
        let vectors: Arc<dyn VectorIndex> =
            Arc::new(FlatVectorIndex::new(config.embedding.dimension));

        lexical.load(&index_root.join(LEXICAL_SHARD_FILE))?;
        vectors.load(&index_root.join(VECTOR_FILE))?;
        info!(
            "Service open: index root {}, embedder {}",
            index_root.display(),
            embedder.backend_name()
        );

        Ok(Self {
            lexical,
            vectors,
            embedder,
            config,
            index_root,
            coordinator: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    pub fn lexical_handle(&self) -> Arc<dyn LexicalIndex> {
        Arc::clone(&self.lexical)
    }

    pub fn vector_handle(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.vectors)
    }

    pub fn embedder_handle(&self) -> Arc<CachingEmbedder> {
        Arc::clone(&self.embedder)
    }

    /// Creates an ingestion coordinator sharing this service's indexes
    /// and registers it as the status source.
    pub fn new_coordinator(&self, repository: String, token: CancelToken) -> Arc<IngestCoordinator> {
        let coordinator = Arc::new(IngestCoordinator::new(
            self.lexical_handle(),
            self.vector_handle(),
            self.embedder_handle(),
            &self.config,
            repository,
            token,
        ));
        if let Ok(mut slot) = self.coordinator.write() {
            *slot = Some(Arc::clone(&coordinator));
        }
        coordinator
    }

    /// Blocks until the embedding backend is usable.
    pub fn warmup(&self) -> Result<()> {
        self.embedder.warmup()?;
        self.embedder.encode("warmup probe").map(|_| ())
    }

    /// Persists both indexes under the index root.
    pub fn save(&self) -> Result<()> {
        self.lexical.save(&self.index_root.join(LEXICAL_SHARD_FILE))?;
        self.vectors.save(&self.index_root.join(VECTOR_FILE))?;
        Ok(())
    }

    /// Saves and closes both indexes; close waits for in-flight writers.
    pub fn close(&self) -> Result<()> {
        self.save()?;
        self.lexical.close()?;
        self.vectors.close()
    }

    /// Executes a search request.
    pub fn search(&self, request: &SearchRequest, token: &CancelToken) -> Result<SearchResponse> {
        let started = Instant::now();
        if request.query.trim().is_empty() {
            return Err(Error::BadQuery("empty query".to_string()));
        }
        token.check()?;

        let top_k = request.top_k.max(1);
        let internal_limit = top_k * CANDIDATE_MULTIPLIER;

        let mut parsed = query::parse_query(&request.query);
        // Request-level filters join the parsed ones so both the lexical
        // filter and the file-type boost see them.
        for pattern in &request.filters.file_patterns {
            if !parsed.file_patterns.contains(pattern) {
                parsed.file_patterns.push(pattern.clone());
            }
        }

        let use_regex = query::is_regex_query(&request.query);
        let lexical_query = if use_regex {
            request.query.clone()
        } else if parsed.is_json_field_query && !parsed.target_fields.is_empty() {
            // Field queries match on the field names; the file itself is
            // pinned by the file-pattern filter.
            parsed.target_fields.join(" ")
        } else {
            parsed.focused.clone()
        };
        let lexical_options = LexicalSearchOptions {
            max_results: internal_limit,
            use_regex,
            case_sensitive: false,
            file_patterns: parsed.file_patterns.clone(),
            languages: request
                .language
                .iter()
                .map(|l| l.to_string())
                .collect(),
            extra_regexes: parsed.import_regexes.clone(),
        };

        // Both sides run in parallel; neither holds a lock across the
        // embedder call.
        let (lexical_result, semantic_result) = rayon::join(
            || self.lexical.search(&lexical_query, &lexical_options),
            || self.semantic_search(&parsed, internal_limit, &request.language, token),
        );
        token.check()?;

        let mut warning: Option<String> = None;
        let (lexical_hits, semantic_hits) = match (lexical_result, semantic_result) {
            (Ok(l), Ok(s)) => (l, s),
            (Err(e), Ok(s)) if self.config.fusion.best_effort_sides => {
                warn!("Lexical side failed, serving semantic only: {}", e);
                warning = Some(format!("lexical search failed: {}", e));
                (Vec::new(), s)
            }
            (Ok(l), Err(e)) if self.config.fusion.best_effort_sides => {
                warn!("Semantic side failed, serving lexical only: {}", e);
                warning = Some(format!("semantic search failed: {}", e));
                (l, Vec::new())
            }
            (Err(e), _) => return Err(e),
            (_, Err(e)) => return Err(e),
        };

        // Repository filters narrow both sides by path prefix.
        let repos = &request.filters.repos;
        let keep = |hit: &SearchHit| repos.is_empty() || repos.iter().any(|r| hit.file.starts_with(r.as_str()));
        let lexical_hits: Vec<SearchHit> = lexical_hits.into_iter().filter(|h| keep(h)).collect();
        let semantic_hits: Vec<SearchHit> = semantic_hits.into_iter().filter(|h| keep(h)).collect();

        let lexical_count = lexical_hits.len();
        let semantic_count = semantic_hits.len();
        let (hits, analytics) = fusion::fuse(
            lexical_hits,
            semantic_hits,
            &parsed,
            top_k,
            &self.config.fusion,
        );

        debug!(
            "Search {:?}: {} lexical + {} semantic -> {} fused in {:?}",
            request.query,
            lexical_count,
            semantic_count,
            hits.len(),
            started.elapsed()
        );

        Ok(SearchResponse {
            total_hits: hits.len(),
            hits,
            query_time_ns: started.elapsed().as_nanos() as u64,
            lexical_hits: lexical_count,
            semantic_hits: semantic_count,
            warning,
            analytics: if self.config.fusion.enable_analytics {
                Some(analytics)
            } else {
                None
            },
        })
    }

    /// Embeds the focused query and turns vector results into hits with
    /// real line numbers recovered from the chunk id.
    fn semantic_search(
        &self,
        parsed: &ParsedQuery,
        limit: usize,
        language: &Option<String>,
        token: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        let file_patterns = &parsed.file_patterns;
        token.check()?;
        let query_vector = self.embedder.encode(&parsed.focused)?;
        token.check()?;
        let results = self.vectors.search(
            &query_vector,
            limit,
            &VectorSearchOptions {
                min_score: self.config.fusion.min_semantic_score,
            },
        )?;

        let mut hits = Vec::with_capacity(results.len());
        for result in results {
            let chunk = match parse_chunk_id(&result.chunk_id) {
                Some(chunk) => chunk,
                None => {
                    warn!("Unparseable chunk id {:?}; skipping", result.chunk_id);
                    continue;
                }
            };
            let file = chunk.path.to_string_lossy().into_owned();
            if !matcher::path_matches_any(file_patterns, &file) {
                continue;
            }
            let file_language = detect_language(&chunk.path);
            if let Some(lang) = language {
                if !lang.eq_ignore_ascii_case(&file_language) {
                    continue;
                }
            }
            let (text, last_modified) = self.chunk_text(&chunk.path, chunk.start_byte, chunk.end_byte);
            hits.push(SearchHit {
                file,
                line_number: chunk.start_line,
                text,
                score: result.score,
                source: HitSource::Semantic,
                start_byte: chunk.start_byte,
                end_byte: chunk.end_byte,
                language: file_language,
                last_modified,
            });
        }
        Ok(hits)
    }

    /// Best-effort chunk text recovery: slices the live file at the
    /// chunk's byte range. A changed or vanished file yields empty text
    /// rather than an error.
    fn chunk_text(&self, path: &Path, start: usize, end: usize) -> (String, Option<DateTime<Utc>>) {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        let text = fs::read(path)
            .ok()
            .and_then(|bytes| {
                if start <= end && end <= bytes.len() {
                    String::from_utf8(bytes[start..end].to_vec()).ok()
                } else {
                    None
                }
            })
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default();
        (text, modified)
    }

    /// Indexing progress: live from the coordinator when one is attached,
    /// otherwise a static view of the loaded indexes.
    pub fn index_status(&self) -> IndexStatus {
        if let Ok(slot) = self.coordinator.read() {
            if let Some(coordinator) = slot.as_ref() {
                return coordinator.status();
            }
        }
        let total_docs = self.lexical.stats().map(|s| s.total_docs).unwrap_or(0);
        let last_updated = self
            .lexical
            .stats()
            .ok()
            .and_then(|s| s.last_index_time);
        IndexStatus {
            repository: self.index_root.to_string_lossy().into_owned(),
            lexical_progress_pct: 100.0,
            semantic_progress_pct: 100.0,
            total_files: total_docs,
            indexed_files: total_docs,
            failed_files: Vec::new(),
            last_updated,
        }
    }

    /// Term-dictionary completions; empty below the minimum prefix
    /// length.
    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim();
        if prefix.len() < SUGGEST_MIN_PREFIX {
            return Vec::new();
        }
        self.lexical
            .suggest(prefix, SUGGEST_LIMIT)
            .unwrap_or_default()
    }

    /// How a query would be executed, without executing it.
    pub fn explain(&self, query_text: &str) -> QueryExplanation {
        let parsed = query::parse_query(query_text);
        let strategy = self.config.fusion.strategy;
        let strategy_label = match strategy {
            FusionStrategy::Learned => {
                format!("learned(bm25={:.2})", fusion::learned_weight(&parsed))
            }
            other => other.as_str().to_string(),
        };
        QueryExplanation {
            original: query_text.to_string(),
            extracted_keywords: crate::tokenizer::tokenize_display(query_text),
            is_regex: query::is_regex_query(query_text),
            strategy_label,
            bm25_weight: fusion::effective_weight(&self.config.fusion, &parsed, false, false),
        }
    }
}

//! Flat vector store with an ANN graph on top.
//!
//! Vectors are L2-normalized on insert (zero-norm vectors stored
//! unchanged) and live inside the graph's nodes; internal ids are the
//! dense node indices. Deletion rebuilds the graph and compacts the
//! id map, which is permitted: the whole index is a rebuildable cache.

use crate::constants::INDEX_FORMAT_VERSION;
use crate::error::{Error, Result};
use crate::types::CancelToken;
use crate::vector::hnsw::{HnswConfig, HnswGraph};
use crate::vector::{ChunkEmbedding, VectorIndex, VectorSearchOptions, VectorSearchResult, VectorStats};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

/// Below this many vectors the search scans exhaustively; the graph only
/// pays for itself on larger sets.
const BRUTE_FORCE_CEILING: usize = 256;

/// Sidecar metadata persisted as JSON next to the vector file.
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorIndexMeta {
    pub chunk_id_map: BTreeMap<i64, String>,
    pub next_id: i64,
    pub dimension: usize,
    /// 0 = cosine over normalized vectors.
    pub metric: i32,
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    version: u32,
    vectors: Vec<(i64, Vec<f32>)>,
}

struct Inner {
    graph: HnswGraph,
    id_to_chunk: HashMap<i64, String>,
    chunk_to_id: HashMap<String, i64>,
    /// Internal ids whose stored vector has zero norm; their similarity
    /// against anything is 0.
    zero_ids: HashSet<i64>,
    next_id: i64,
    closed: bool,
}

/// The vector index implementation.
pub struct FlatVectorIndex {
    inner: RwLock<Inner>,
    dimension: usize,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn normalize(mut v: Vec<f32>) -> (Vec<f32>, bool) {
    let norm = l2_norm(&v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
        (v, false)
    } else {
        (v, true)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl FlatVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                graph: HnswGraph::new(HnswConfig::new(dimension)),
                id_to_chunk: HashMap::new(),
                chunk_to_id: HashMap::new(),
                zero_ids: HashSet::new(),
                next_id: 0,
                closed: false,
            }),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Rebuilds the graph without the given internal ids and compacts the
    /// id map to dense indices.
    fn rebuild_without(inner: &mut Inner, dimension: usize, removed: &HashSet<i64>) -> Result<()> {
        let mut survivors: Vec<(i64, String)> = inner
            .id_to_chunk
            .iter()
            .filter(|(id, _)| !removed.contains(id))
            .map(|(id, chunk)| (*id, chunk.clone()))
            .collect();
        survivors.sort_by_key(|(id, _)| *id);

        let mut graph = HnswGraph::new(HnswConfig::new(dimension));
        let mut id_to_chunk = HashMap::new();
        let mut chunk_to_id = HashMap::new();
        let mut zero_ids = HashSet::new();
        for (old_id, chunk_id) in survivors {
            let vector = inner
                .graph
                .vector(old_id as usize)
                .map(|v| v.to_vec())
                .unwrap_or_else(|| vec![0.0; dimension]);
            let was_zero = inner.zero_ids.contains(&old_id);
            // Insert preserves ordering, so new ids are dense.
            let new_id = graph.insert(vector)? as i64;
            if was_zero {
                zero_ids.insert(new_id);
            }
            id_to_chunk.insert(new_id, chunk_id.clone());
            chunk_to_id.insert(chunk_id, new_id);
        }
        inner.next_id = graph.len() as i64;
        inner.graph = graph;
        inner.id_to_chunk = id_to_chunk;
        inner.chunk_to_id = chunk_to_id;
        inner.zero_ids = zero_ids;
        Ok(())
    }
}

impl VectorIndex for FlatVectorIndex {
    fn add_vectors(&self, embeddings: &[ChunkEmbedding], token: &CancelToken) -> Result<()> {
        token.check()?;
        // Validate the whole batch before mutating anything.
        for embedding in embeddings {
            if embedding.vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    found: embedding.vector.len(),
                });
            }
        }

        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        if inner.closed {
            return Err(Error::NotReady);
        }
        token.check()?;

        // chunk_id is unique within the index: re-adding replaces.
        let replaced: HashSet<i64> = embeddings
            .iter()
            .filter_map(|e| inner.chunk_to_id.get(&e.chunk_id).copied())
            .collect();
        if !replaced.is_empty() {
            Self::rebuild_without(&mut inner, self.dimension, &replaced)?;
        }

        for embedding in embeddings {
            let (vector, is_zero) = normalize(embedding.vector.clone());
            let id = inner.graph.insert(vector)? as i64;
            if is_zero {
                inner.zero_ids.insert(id);
            }
            inner.id_to_chunk.insert(id, embedding.chunk_id.clone());
            inner.chunk_to_id.insert(embedding.chunk_id.clone(), id);
            inner.next_id = inner.graph.len() as i64;
        }
        debug!(
            "Added {} vectors ({} replaced); index now holds {}",
            embeddings.len(),
            replaced.len(),
            inner.graph.len()
        );
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        options: &VectorSearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        if inner.closed {
            return Err(Error::NotReady);
        }
        if inner.graph.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let (query_norm, query_is_zero) = normalize(query.to_vec());

        let mut scored: Vec<(i64, f32, f32)> = if inner.graph.len() <= BRUTE_FORCE_CEILING {
            // Exhaustive scan, parallel over nodes.
            (0..inner.graph.len() as i64)
                .collect::<Vec<_>>()
                .par_iter()
                .map(|&id| {
                    let stored = inner.graph.vector(id as usize).unwrap_or(&[]);
                    let sim = if query_is_zero || inner.zero_ids.contains(&id) {
                        0.0
                    } else {
                        dot(&query_norm, stored).clamp(-1.0, 1.0)
                    };
                    (id, sim, l2_distance(&query_norm, stored))
                })
                .collect()
        } else {
            let nearest = inner.graph.search(&query_norm, k.max(1), (k * 2).max(64))?;
            nearest
                .into_iter()
                .map(|(idx, _)| {
                    let id = idx as i64;
                    let stored = inner.graph.vector(idx).unwrap_or(&[]);
                    let sim = if query_is_zero || inner.zero_ids.contains(&id) {
                        0.0
                    } else {
                        dot(&query_norm, stored).clamp(-1.0, 1.0)
                    };
                    (id, sim, l2_distance(&query_norm, stored))
                })
                .collect()
        };

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let results: Vec<VectorSearchResult> = scored
            .into_iter()
            .filter(|&(_, sim, _)| sim >= options.min_score)
            .take(k)
            .filter_map(|(id, sim, dist)| {
                inner.id_to_chunk.get(&id).map(|chunk_id| VectorSearchResult {
                    chunk_id: chunk_id.clone(),
                    score: sim,
                    distance: dist,
                })
            })
            .collect();
        debug!("Vector search returned {} results (k={})", results.len(), k);
        Ok(results)
    }

    fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        if inner.closed {
            return Err(Error::NotReady);
        }
        let removed: HashSet<i64> = chunk_ids
            .iter()
            .filter_map(|c| inner.chunk_to_id.get(c).copied())
            .collect();
        if removed.is_empty() {
            debug!("Delete matched none of {} chunk ids", chunk_ids.len());
            return Ok(());
        }
        Self::rebuild_without(&mut inner, self.dimension, &removed)?;
        debug!("Deleted {} vectors; {} remain", removed.len(), inner.graph.len());
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let matching: Vec<String> = {
            let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
            inner
                .chunk_to_id
                .keys()
                .filter(|c| c.starts_with(prefix))
                .cloned()
                .collect()
        };
        let count = matching.len();
        if count > 0 {
            self.delete(&matching)?;
        }
        Ok(count)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut vectors: Vec<(i64, Vec<f32>)> = (0..inner.graph.len() as i64)
            .filter_map(|id| inner.graph.vector(id as usize).map(|v| (id, v.to_vec())))
            .collect();
        vectors.sort_by_key(|(id, _)| *id);
        let file = VectorFile {
            version: INDEX_FORMAT_VERSION,
            vectors,
        };
        fs::write(path, bincode::serialize(&file)?)?;

        let meta = VectorIndexMeta {
            chunk_id_map: inner
                .id_to_chunk
                .iter()
                .map(|(id, chunk)| (*id, chunk.clone()))
                .collect(),
            next_id: inner.next_id,
            dimension: self.dimension,
            metric: 0,
        };
        let meta_path = sidecar_path(path);
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
        debug!(
            "Saved {} vectors to {} (+ sidecar {})",
            inner.graph.len(),
            path.display(),
            meta_path.display()
        );
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<()> {
        let meta_path = sidecar_path(path);
        if !path.exists() || !meta_path.exists() {
            debug!("No vector file at {}, starting empty", path.display());
            return Ok(());
        }
        let meta: VectorIndexMeta = match serde_json::from_slice(&fs::read(&meta_path)?) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Vector sidecar {} unreadable ({}); starting empty", meta_path.display(), e);
                return Ok(());
            }
        };
        if meta.dimension != self.dimension {
            warn!(
                "Vector file dimension {} != configured {}; starting empty",
                meta.dimension, self.dimension
            );
            return Ok(());
        }
        let file: VectorFile = match bincode::deserialize(&fs::read(path)?) {
            Ok(file) => file,
            Err(e) => {
                warn!("Vector file {} unreadable ({}); starting empty", path.display(), e);
                return Ok(());
            }
        };
        if file.version != INDEX_FORMAT_VERSION {
            warn!(
                "Vector file version {} != {}; starting empty",
                file.version, INDEX_FORMAT_VERSION
            );
            return Ok(());
        }

        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        let mut graph = HnswGraph::new(HnswConfig::new(self.dimension));
        let mut id_to_chunk = HashMap::new();
        let mut chunk_to_id = HashMap::new();
        let mut zero_ids = HashSet::new();
        // Re-insert in stored id order; ids compact to dense indices.
        for (old_id, vector) in file.vectors {
            let chunk_id = match meta.chunk_id_map.get(&old_id) {
                Some(chunk_id) => chunk_id.clone(),
                None => {
                    warn!("Vector id {} has no chunk mapping; skipping", old_id);
                    continue;
                }
            };
            if vector.len() != self.dimension {
                warn!("Vector for {} has wrong dimension; skipping", chunk_id);
                continue;
            }
            let is_zero = l2_norm(&vector) == 0.0;
            let new_id = graph.insert(vector)? as i64;
            if is_zero {
                zero_ids.insert(new_id);
            }
            id_to_chunk.insert(new_id, chunk_id.clone());
            chunk_to_id.insert(chunk_id, new_id);
        }
        inner.next_id = graph.len() as i64;
        debug!("Loaded {} vectors from {}", graph.len(), path.display());
        inner.graph = graph;
        inner.id_to_chunk = id_to_chunk;
        inner.chunk_to_id = chunk_to_id;
        inner.zero_ids = zero_ids;
        Ok(())
    }

    fn stats(&self) -> Result<VectorStats> {
        let inner = self.inner.read().map_err(|e| Error::Lock(e.to_string()))?;
        Ok(VectorStats {
            total_vectors: inner.graph.len(),
            dimension: self.dimension,
            metric: "cosine",
        })
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| Error::Lock(e.to_string()))?;
        inner.closed = true;
        Ok(())
    }
}

fn sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".meta");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn embedding(chunk_id: &str, vector: Vec<f32>) -> ChunkEmbedding {
        ChunkEmbedding {
            chunk_id: chunk_id.to_string(),
            vector,
        }
    }

    fn index_with(vectors: Vec<(&str, Vec<f32>)>) -> FlatVectorIndex {
        let dim = vectors[0].1.len();
        let index = FlatVectorIndex::new(dim);
        let embeddings: Vec<ChunkEmbedding> = vectors
            .into_iter()
            .map(|(id, v)| embedding(id, v))
            .collect();
        index.add_vectors(&embeddings, &CancelToken::new()).unwrap();
        index
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = FlatVectorIndex::new(4);
        let err = index
            .add_vectors(&[embedding("a:0-1@1", vec![1.0, 0.0])], &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, found: 2 }));
    }

    #[test]
    fn test_vectors_are_normalized_on_insert() {
        let index = index_with(vec![("a:0-9@1", vec![3.0, 0.0, 4.0])]);
        let inner = index.inner.read().unwrap();
        let stored = inner.graph.vector(0).unwrap();
        assert!((l2_norm(stored) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_vector_stored_unchanged_and_scores_zero() {
        let index = index_with(vec![
            ("zero:0-1@1", vec![0.0, 0.0, 0.0]),
            ("one:0-1@1", vec![1.0, 0.0, 0.0]),
        ]);
        {
            let inner = index.inner.read().unwrap();
            assert_eq!(inner.graph.vector(0).unwrap(), &[0.0, 0.0, 0.0]);
        }
        let results = index
            .search(&[1.0, 0.0, 0.0], 10, &VectorSearchOptions { min_score: -1.0 })
            .unwrap();
        let zero_hit = results.iter().find(|r| r.chunk_id.starts_with("zero")).unwrap();
        assert_eq!(zero_hit.score, 0.0);
    }

    #[test]
    fn test_self_similarity() {
        let index = index_with(vec![
            ("a:0-1@1", vec![1.0, 2.0, 3.0]),
            ("b:0-1@1", vec![-1.0, 0.5, 0.0]),
            ("c:0-1@1", vec![0.0, 0.1, 0.9]),
        ]);
        let query = vec![1.0, 2.0, 3.0];
        let results = index
            .search(&query, 1, &VectorSearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a:0-1@1");
        assert!(results[0].score >= 0.99);
        assert!(results[0].distance < 1e-3);
    }

    #[test]
    fn test_min_score_filters() {
        let index = index_with(vec![
            ("close:0-1@1", vec![1.0, 0.05]),
            ("far:0-1@1", vec![-1.0, 0.0]),
        ]);
        let results = index
            .search(&[1.0, 0.0], 10, &VectorSearchOptions { min_score: 0.5 })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "close:0-1@1");
    }

    #[test]
    fn test_results_sorted_descending() {
        let index = index_with(vec![
            ("a:0-1@1", vec![1.0, 0.0]),
            ("b:0-1@1", vec![0.8, 0.6]),
            ("c:0-1@1", vec![0.0, 1.0]),
        ]);
        let results = index
            .search(&[1.0, 0.0], 3, &VectorSearchOptions { min_score: -1.0 })
            .unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_reinsert_replaces_chunk() {
        let index = index_with(vec![("a:0-1@1", vec![1.0, 0.0])]);
        index
            .add_vectors(&[embedding("a:0-1@1", vec![0.0, 1.0])], &CancelToken::new())
            .unwrap();
        assert_eq!(index.stats().unwrap().total_vectors, 1);
        let results = index
            .search(&[0.0, 1.0], 1, &VectorSearchOptions::default())
            .unwrap();
        assert!(results[0].score >= 0.99);
    }

    #[test]
    fn test_delete_and_compaction() {
        let index = index_with(vec![
            ("a:0-1@1", vec![1.0, 0.0]),
            ("b:0-1@1", vec![0.0, 1.0]),
            ("c:0-1@1", vec![0.7, 0.7]),
        ]);
        index.delete(&["b:0-1@1".to_string()]).unwrap();
        assert_eq!(index.stats().unwrap().total_vectors, 2);
        // Internal ids compact back to a dense range
        let inner = index.inner.read().unwrap();
        assert_eq!(inner.next_id, 2);
        assert_eq!(inner.id_to_chunk.len(), 2);
        assert!(inner.id_to_chunk.contains_key(&0));
        assert!(inner.id_to_chunk.contains_key(&1));
        drop(inner);
        let results = index
            .search(&[0.0, 1.0], 3, &VectorSearchOptions { min_score: -1.0 })
            .unwrap();
        assert!(results.iter().all(|r| r.chunk_id != "b:0-1@1"));
    }

    #[test]
    fn test_delete_prefix_removes_file_chunks() {
        let index = index_with(vec![
            ("src/a.rs:0-10@1", vec![1.0, 0.0]),
            ("src/a.rs:10-20@2", vec![0.9, 0.1]),
            ("src/b.rs:0-10@1", vec![0.0, 1.0]),
        ]);
        let removed = index.delete_prefix("src/a.rs:").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.stats().unwrap().total_vectors, 1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let index = index_with(vec![
            ("a:0-1@1", vec![1.0, 2.0, 2.0]),
            ("b:0-1@1", vec![0.5, 0.0, 0.1]),
        ]);
        index.save(&path).unwrap();
        assert!(path.exists());
        assert!(dir.path().join("vectors.bin.meta").exists());

        let fresh = FlatVectorIndex::new(3);
        fresh.load(&path).unwrap();
        assert_eq!(fresh.stats().unwrap().total_vectors, 2);
        let results = fresh
            .search(&[1.0, 2.0, 2.0], 1, &VectorSearchOptions::default())
            .unwrap();
        assert_eq!(results[0].chunk_id, "a:0-1@1");
        assert!(results[0].score >= 0.99);
    }

    #[test]
    fn test_load_dimension_mismatch_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let index = index_with(vec![("a:0-1@1", vec![1.0, 0.0])]);
        index.save(&path).unwrap();

        let fresh = FlatVectorIndex::new(4);
        fresh.load(&path).unwrap();
        assert_eq!(fresh.stats().unwrap().total_vectors, 0);
    }

    #[test]
    fn test_search_query_dimension_checked() {
        let index = index_with(vec![("a:0-1@1", vec![1.0, 0.0])]);
        let err = index
            .search(&[1.0, 0.0, 0.0], 1, &VectorSearchOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}

//! Layered small-world graph for approximate nearest-neighbor search.
//!
//! Node indices are dense (0..len) and double as the flat store's internal
//! ids; deletion is handled by the owner rebuilding the graph, so the graph
//! itself only ever grows.

use crate::error::{Error, Result};
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Configuration parameters for the graph.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub dimension: usize,
    /// Maximum connections per node per layer.
    pub m: usize,
    /// Beam width while inserting.
    pub ef_construction: usize,
    pub num_layers: usize,
    pub random_seed: u64,
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        Self {
            dimension,
            m: 16,
            ef_construction: 200,
            num_layers: 4,
            random_seed: 42,
        }
    }
}

/// One node: its vector plus per-layer adjacency.
#[derive(Debug, Clone)]
struct HnswNode {
    vector: Vec<f32>,
    connections: Vec<Vec<usize>>,
    max_layer: usize,
}

impl HnswNode {
    fn new(vector: Vec<f32>, max_layer: usize) -> Self {
        Self {
            vector,
            connections: vec![Vec::new(); max_layer + 1],
            max_layer,
        }
    }
}

// f32 wrapper so distances can live in a BinaryHeap.
#[derive(PartialEq, PartialOrd, Copy, Clone)]
struct OrderedFloat(f32);

impl Eq for OrderedFloat {}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// The graph itself.
pub struct HnswGraph {
    config: HnswConfig,
    nodes: Vec<HnswNode>,
    /// Entry node index per layer.
    entry_points: Vec<usize>,
    rng: StdRng,
}

impl HnswGraph {
    pub fn new(config: HnswConfig) -> Self {
        let num_layers = config.num_layers.max(1);
        let rng = StdRng::seed_from_u64(config.random_seed);
        Self {
            config,
            nodes: Vec::new(),
            entry_points: vec![0; num_layers],
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// The stored vector for a node index.
    pub fn vector(&self, idx: usize) -> Option<&[f32]> {
        self.nodes.get(idx).map(|n| n.vector.as_slice())
    }

    /// Cosine distance for unit vectors: `1 - a·b`. A zero vector lands at
    /// distance 1 (orthogonal); the owner maps its similarity to 0.
    #[inline(always)]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        let dot = ArrayView1::from(a).dot(&ArrayView1::from(b));
        1.0 - dot
    }

    /// Draws the top layer for a new node (geometric, capped).
    fn draw_layer(&mut self) -> usize {
        let mut layer = 0;
        while layer + 1 < self.config.num_layers && self.rng.gen::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    /// Inserts a vector and returns its node index.
    pub fn insert(&mut self, vector: Vec<f32>) -> Result<usize> {
        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                found: vector.len(),
            });
        }

        let max_layer = self.draw_layer();
        let node_idx = self.nodes.len();

        if self.nodes.is_empty() {
            self.nodes.push(HnswNode::new(vector, max_layer));
            for ep in self.entry_points.iter_mut() {
                *ep = 0;
            }
            return Ok(node_idx);
        }

        // Greedy descent through layers above the node's top layer.
        let mut current = self.entry_points[self.top_layer().min(self.entry_points.len() - 1)];
        for layer in ((max_layer + 1)..=self.top_layer()).rev() {
            if let Some(&(nearest, _)) = self.search_layer(&vector, current, 1, layer).first() {
                current = nearest;
            }
        }

        self.nodes.push(HnswNode::new(vector, max_layer));

        // Connect on each layer from the node's top layer down.
        for layer in (0..=max_layer).rev() {
            let neighbors = self.search_layer(
                &self.nodes[node_idx].vector.clone(),
                current,
                self.config.ef_construction,
                layer,
            );
            let selected: Vec<usize> = neighbors
                .iter()
                .take(self.config.m)
                .map(|&(idx, _)| idx)
                .collect();

            for &neighbor in &selected {
                if neighbor == node_idx || neighbor >= self.nodes.len() {
                    continue;
                }
                if layer >= self.nodes[neighbor].connections.len() {
                    self.nodes[neighbor]
                        .connections
                        .resize_with(layer + 1, Vec::new);
                }
                self.nodes[node_idx].connections[layer].push(neighbor);
                // Backward edge, capped at 2*M.
                if self.nodes[neighbor].connections[layer].len() < self.config.m * 2 {
                    self.nodes[neighbor].connections[layer].push(node_idx);
                }
            }

            if let Some(&(nearest, _)) = neighbors.first() {
                current = nearest;
            }
        }

        // Promote as entry point on layers where it is the first arrival.
        for layer in 0..=max_layer {
            if layer < self.entry_points.len() && self.nodes[self.entry_points[layer]].max_layer < layer
            {
                self.entry_points[layer] = node_idx;
            }
        }

        Ok(node_idx)
    }

    fn top_layer(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.max_layer)
            .max()
            .unwrap_or(0)
            .min(self.config.num_layers - 1)
    }

    /// Beam search within one layer; returns `(node, distance)` ascending.
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<(usize, f32)> {
        if entry >= self.nodes.len() {
            return Vec::new();
        }
        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(entry);

        let entry_dist = Self::distance(query, &self.nodes[entry].vector);
        // Min-heap of candidates to expand (negated for BinaryHeap).
        let mut candidates: BinaryHeap<(std::cmp::Reverse<OrderedFloat>, usize)> = BinaryHeap::new();
        candidates.push((std::cmp::Reverse(OrderedFloat(entry_dist)), entry));
        // Max-heap of the current best `ef` results.
        let mut best: BinaryHeap<(OrderedFloat, usize)> = BinaryHeap::new();
        best.push((OrderedFloat(entry_dist), entry));

        while let Some((std::cmp::Reverse(OrderedFloat(dist)), idx)) = candidates.pop() {
            let worst = best.peek().map(|&(OrderedFloat(d), _)| d).unwrap_or(f32::MAX);
            if dist > worst && best.len() >= ef {
                break;
            }
            let connections = self.nodes[idx]
                .connections
                .get(layer)
                .cloned()
                .unwrap_or_default();
            for neighbor in connections {
                if neighbor >= self.nodes.len() || !visited.insert(neighbor) {
                    continue;
                }
                let d = Self::distance(query, &self.nodes[neighbor].vector);
                let worst = best.peek().map(|&(OrderedFloat(w), _)| w).unwrap_or(f32::MAX);
                if best.len() < ef || d < worst {
                    candidates.push((std::cmp::Reverse(OrderedFloat(d)), neighbor));
                    best.push((OrderedFloat(d), neighbor));
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut results: Vec<(usize, f32)> = best
            .into_iter()
            .map(|(OrderedFloat(d), idx)| (idx, d))
            .collect();
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        results
    }

    /// k-nearest search; returns `(node, cosine distance)` ascending.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                found: query.len(),
            });
        }
        if self.nodes.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut current = self.entry_points[self.top_layer().min(self.entry_points.len() - 1)];
        for layer in (1..=self.top_layer()).rev() {
            if let Some(&(nearest, _)) = self.search_layer(query, current, 1, layer).first() {
                current = nearest;
            }
        }

        let ef = ef.max(k);
        let mut results = self.search_layer(query, current, ef, 0);
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    fn graph_with(vectors: Vec<Vec<f32>>) -> HnswGraph {
        let dim = vectors[0].len();
        let mut graph = HnswGraph::new(HnswConfig::new(dim));
        for v in vectors {
            graph.insert(v).unwrap();
        }
        graph
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let mut graph = HnswGraph::new(HnswConfig::new(4));
        let err = graph.insert(vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, found: 2 }));
    }

    #[test]
    fn test_self_is_nearest() {
        let graph = graph_with(vec![
            unit(vec![1.0, 0.0, 0.0]),
            unit(vec![0.0, 1.0, 0.0]),
            unit(vec![0.0, 0.0, 1.0]),
            unit(vec![1.0, 1.0, 0.0]),
        ]);
        let query = unit(vec![0.0, 1.0, 0.0]);
        let results = graph.search(&query, 1, 16).unwrap();
        assert_eq!(results[0].0, 1);
        assert!(results[0].1.abs() < 1e-5);
    }

    #[test]
    fn test_search_returns_ascending_distances() {
        let graph = graph_with(
            (0..50)
                .map(|i| {
                    let angle = i as f32 * 0.1;
                    vec![angle.cos(), angle.sin()]
                })
                .collect(),
        );
        let results = graph.search(&[1.0, 0.0], 10, 32).unwrap();
        assert_eq!(results.len(), 10);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1 + 1e-6);
        }
        // Node 0 is exactly the query; the beam must surface it.
        assert!(results.iter().any(|&(idx, _)| idx == 0));
        assert!(results[0].1 < 0.05);
    }

    #[test]
    fn test_empty_graph_searches_empty() {
        let graph = HnswGraph::new(HnswConfig::new(8));
        assert!(graph.search(&[0.0; 8], 5, 16).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let vectors: Vec<Vec<f32>> = (0..20)
            .map(|i| unit(vec![(i as f32).sin(), (i as f32).cos(), 1.0]))
            .collect();
        let a = graph_with(vectors.clone());
        let b = graph_with(vectors);
        let qa = a.search(&unit(vec![0.3, 0.7, 0.5]), 5, 16).unwrap();
        let qb = b.search(&unit(vec![0.3, 0.7, 0.5]), 5, 16).unwrap();
        assert_eq!(qa, qb);
    }
}

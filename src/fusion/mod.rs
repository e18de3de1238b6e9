//! Fusion ranker: merges the lexical and semantic result streams with
//! query-aware weighting, normalization, boosting and thresholds.
//!
//! Stateless per call — a pure function of the two input lists plus
//! configuration; it holds no references to the indexes.

pub mod analytics;
pub mod boost;
pub mod normalize;

pub use analytics::{BoostCounts, FusionAnalytics, ScoreDistribution};

use crate::config::{FusionConfig, FusionStrategy};
use crate::query::ParsedQuery;
use crate::types::{HitSource, SearchHit};
use boost::BoostContext;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::time::Instant;

/// Resolves the effective lexical weight λ for a request.
///
/// Adaptive weighting substitutes the per-intent table; the legacy guards
/// (configurable) then bump λ when both sides returned candidates or the
/// query targets a JSON field. Clamped to [0, 1].
pub fn effective_weight(
    config: &FusionConfig,
    parsed: &ParsedQuery,
    lexical_empty: bool,
    semantic_empty: bool,
) -> f32 {
    let mut weight = config.bm25_weight;
    if config.adaptive_weighting {
        if let Some(&w) = config.query_type_weights.get(&parsed.intent) {
            weight = w;
        }
    }
    if config.legacy_weight_guards {
        if !lexical_empty && !semantic_empty && weight < 0.5 {
            weight = 0.6;
        }
        if parsed.is_json_field_query && weight < 0.8 {
            weight = 0.85;
        }
    }
    weight.clamp(0.0, 1.0)
}

/// λ chosen by the learned strategy's word-count heuristic.
pub fn learned_weight(parsed: &ParsedQuery) -> f32 {
    if parsed.is_json_field_query {
        return 0.8;
    }
    if parsed.import_library.is_some() {
        return 0.75;
    }
    let words = parsed.original.split_whitespace().count();
    match words {
        0..=2 => 0.7,
        3..=5 => 0.5,
        _ => 0.3,
    }
}

struct Merged {
    hit: SearchHit,
    lexical: bool,
    semantic: bool,
}

/// Fuses the two sorted result streams into a single ranked list of at
/// most `top_k` hits, plus the analytics record.
pub fn fuse(
    mut lexical: Vec<SearchHit>,
    mut semantic: Vec<SearchHit>,
    parsed: &ParsedQuery,
    top_k: usize,
    config: &FusionConfig,
) -> (Vec<SearchHit>, FusionAnalytics) {
    let started = Instant::now();

    let lexical_candidates = lexical.len();
    let semantic_candidates = semantic.len();
    let lexical_scores = ScoreDistribution::from_scores(lexical.iter().map(|h| h.score));
    let semantic_scores = ScoreDistribution::from_scores(semantic.iter().map(|h| h.score));

    let weight = effective_weight(config, parsed, lexical.is_empty(), semantic.is_empty());

    // Inputs are contractually sorted; enforce it so ranks are honest.
    sort_desc(&mut lexical);
    sort_desc(&mut semantic);
    normalize::apply(config.normalization, &mut lexical);
    normalize::apply(config.normalization, &mut semantic);

    let (strategy_weight, linear) = match config.strategy {
        FusionStrategy::Rrf => (weight, false),
        FusionStrategy::WeightedLinear => (weight, true),
        FusionStrategy::Learned => (learned_weight(parsed), true),
    };

    let mut merged: HashMap<String, Merged> = HashMap::new();
    for (rank, hit) in lexical.into_iter().enumerate() {
        let contribution = side_contribution(hit.score, strategy_weight, rank, config, linear);
        merge_into(&mut merged, hit, contribution, true);
    }
    for (rank, hit) in semantic.into_iter().enumerate() {
        let contribution =
            side_contribution(hit.score, 1.0 - strategy_weight, rank, config, linear);
        merge_into(&mut merged, hit, contribution, false);
    }

    let merged_both = merged.values().filter(|m| m.lexical && m.semantic).count();
    let total_candidates = merged.len();

    // Boosts, then source-specific threshold filtering.
    let context = BoostContext::new(&parsed.original, &parsed.file_patterns, Utc::now());
    let mut boost_counts = BoostCounts::default();
    let mut hits: Vec<SearchHit> = Vec::with_capacity(merged.len());
    for entry in merged.into_values() {
        let mut hit = entry.hit;
        boost::apply_boosts(&mut hit, &context, config, &mut boost_counts);
        let threshold = match hit.source {
            HitSource::Lexical => config.min_lexical_score,
            HitSource::Semantic => config.min_semantic_score,
            HitSource::Both => config.min_lexical_score.min(config.min_semantic_score),
        };
        if hit.score < threshold {
            if config.debug_scoring {
                debug!(
                    "Fusion drop {} (score {:.4} < {:.4})",
                    hit.key(),
                    hit.score,
                    threshold
                );
            }
            continue;
        }
        if config.debug_scoring {
            debug!("Fusion keep {} score {:.4} [{}]", hit.key(), hit.score, hit.source.as_str());
        }
        hits.push(hit);
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line_number.cmp(&b.line_number))
    });
    hits.truncate(top_k);

    let analytics = FusionAnalytics {
        strategy: config.strategy.as_str().to_string(),
        effective_weight: if linear && config.strategy == FusionStrategy::Learned {
            strategy_weight
        } else {
            weight
        },
        query_type: parsed.intent.as_str().to_string(),
        lexical_candidates,
        semantic_candidates,
        merged_both,
        total_candidates,
        lexical_scores,
        semantic_scores,
        final_scores: ScoreDistribution::from_scores(hits.iter().map(|h| h.score)),
        boost_counts,
        processing_time_us: started.elapsed().as_micros() as u64,
    };

    (hits, analytics)
}

fn sort_desc(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// One side's score contribution under the active strategy.
fn side_contribution(
    score: f32,
    weight: f32,
    rank: usize,
    config: &FusionConfig,
    linear: bool,
) -> f32 {
    if linear {
        score * weight
    } else {
        // Reciprocal rank fusion, rank is 0-based.
        score * weight * (1.0 / (config.rrf_k + rank as f32 + 1.0))
    }
}

fn merge_into(
    merged: &mut HashMap<String, Merged>,
    mut hit: SearchHit,
    contribution: f32,
    from_lexical: bool,
) {
    hit.score = contribution;
    let key = hit.key();
    match merged.get_mut(&key) {
        Some(existing) => {
            existing.hit.score += contribution;
            if from_lexical {
                existing.lexical = true;
            } else {
                existing.semantic = true;
            }
            if existing.lexical && existing.semantic {
                existing.hit.source = HitSource::Both;
            }
            // Prefer the lexical side's line text when both are present.
            if from_lexical && !hit.text.is_empty() {
                existing.hit.text = hit.text;
                existing.hit.start_byte = hit.start_byte;
                existing.hit.end_byte = hit.end_byte;
            }
            if existing.hit.last_modified.is_none() {
                existing.hit.last_modified = hit.last_modified;
            }
        }
        None => {
            merged.insert(
                key,
                Merged {
                    lexical: from_lexical,
                    semantic: !from_lexical,
                    hit,
                },
            );
        }
    }
}

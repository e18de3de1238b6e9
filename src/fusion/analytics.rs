//! Per-request fusion analytics.

use serde::{Deserialize, Serialize};

/// Min/max/mean of a score list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl ScoreDistribution {
    pub fn from_scores<I: IntoIterator<Item = f32>>(scores: I) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for score in scores {
            min = min.min(score);
            max = max.max(score);
            sum += score;
            count += 1;
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            min,
            max,
            mean: sum / count as f32,
        }
    }
}

/// How many hits each boost fired on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoostCounts {
    pub exact_match: usize,
    pub symbol_match: usize,
    pub file_type: usize,
    pub recency: usize,
}

/// One record per fused request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionAnalytics {
    pub strategy: String,
    pub effective_weight: f32,
    pub query_type: String,
    pub lexical_candidates: usize,
    pub semantic_candidates: usize,
    pub merged_both: usize,
    pub total_candidates: usize,
    pub lexical_scores: ScoreDistribution,
    pub semantic_scores: ScoreDistribution,
    pub final_scores: ScoreDistribution,
    pub boost_counts: BoostCounts,
    pub processing_time_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution() {
        let dist = ScoreDistribution::from_scores([1.0, 2.0, 3.0]);
        assert_eq!(dist.min, 1.0);
        assert_eq!(dist.max, 3.0);
        assert!((dist.mean - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_distribution_is_zero() {
        let dist = ScoreDistribution::from_scores(std::iter::empty());
        assert_eq!(dist.min, 0.0);
        assert_eq!(dist.max, 0.0);
        assert_eq!(dist.mean, 0.0);
    }
}

//! Score normalization, applied independently to each side before
//! merging.

use crate::config::Normalization;
use crate::types::SearchHit;

const EPSILON: f32 = 1e-6;

/// Normalizes scores in place. `hits` must already be sorted descending
/// (rank_based reads the position as the rank).
pub fn apply(normalization: Normalization, hits: &mut [SearchHit]) {
    match normalization {
        Normalization::None => {}
        Normalization::MinMax => min_max(hits),
        Normalization::ZScore => z_score(hits),
        Normalization::RankBased => rank_based(hits),
    }
}

fn min_max(hits: &mut [SearchHit]) {
    if hits.is_empty() {
        return;
    }
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for hit in hits.iter() {
        min = min.min(hit.score);
        max = max.max(hit.score);
    }
    let range = max - min;
    if range < EPSILON {
        // All scores equal: every hit is as good as the best.
        for hit in hits.iter_mut() {
            hit.score = 1.0;
        }
        return;
    }
    for hit in hits.iter_mut() {
        hit.score = ((hit.score - min) / range).clamp(0.0, 1.0);
    }
}

fn z_score(hits: &mut [SearchHit]) {
    if hits.is_empty() {
        return;
    }
    let n = hits.len() as f32;
    let mean = hits.iter().map(|h| h.score).sum::<f32>() / n;
    let variance = hits.iter().map(|h| (h.score - mean).powi(2)).sum::<f32>() / n;
    let std_dev = variance.sqrt();
    if std_dev < EPSILON {
        for hit in hits.iter_mut() {
            hit.score = 0.0;
        }
        return;
    }
    // Squash through the logistic so z-scores land in (0, 1).
    for hit in hits.iter_mut() {
        let z = (hit.score - mean) / std_dev;
        hit.score = 1.0 / (1.0 + (-z).exp());
    }
}

fn rank_based(hits: &mut [SearchHit]) {
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.score = 1.0 / (i + 1) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HitSource;

    fn hits(scores: &[f32]) -> Vec<SearchHit> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| SearchHit {
                file: format!("f{}.rs", i),
                line_number: 1,
                text: String::new(),
                score,
                source: HitSource::Lexical,
                start_byte: 0,
                end_byte: 0,
                language: "rust".into(),
                last_modified: None,
            })
            .collect()
    }

    #[test]
    fn test_min_max() {
        let mut h = hits(&[10.0, 5.0, 0.0]);
        apply(Normalization::MinMax, &mut h);
        assert_eq!(h[0].score, 1.0);
        assert_eq!(h[1].score, 0.5);
        assert_eq!(h[2].score, 0.0);
    }

    #[test]
    fn test_min_max_all_equal_is_one() {
        let mut h = hits(&[3.0, 3.0, 3.0]);
        apply(Normalization::MinMax, &mut h);
        assert!(h.iter().all(|x| x.score == 1.0));
    }

    #[test]
    fn test_z_score_squashes_into_unit_interval() {
        let mut h = hits(&[9.0, 5.0, 1.0]);
        apply(Normalization::ZScore, &mut h);
        assert!(h.iter().all(|x| x.score > 0.0 && x.score < 1.0));
        assert!(h[0].score > h[1].score);
        assert!(h[1].score > h[2].score);
    }

    #[test]
    fn test_z_score_all_equal_is_zero() {
        let mut h = hits(&[2.0, 2.0]);
        apply(Normalization::ZScore, &mut h);
        assert!(h.iter().all(|x| x.score == 0.0));
    }

    #[test]
    fn test_rank_based() {
        let mut h = hits(&[100.0, 50.0, 10.0, 1.0]);
        apply(Normalization::RankBased, &mut h);
        assert_eq!(h[0].score, 1.0);
        assert_eq!(h[1].score, 0.5);
        assert!((h[3].score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_none_leaves_scores() {
        let mut h = hits(&[7.0, 3.0]);
        apply(Normalization::None, &mut h);
        assert_eq!(h[0].score, 7.0);
        assert_eq!(h[1].score, 3.0);
    }
}

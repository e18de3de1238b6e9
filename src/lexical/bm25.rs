//! BM25 term scoring over the corpus statistics.

use crate::constants::{BM25_B, BM25_K1};
use crate::lexical::index::{CorpusStats, FileDoc};

/// Inverse document frequency.
///
/// `1 + (N - df + 0.5) / (df + 0.5)` — the additive form, always >= 1 so a
/// matched term can never contribute a negative score.
pub(crate) fn idf(doc_freq: u32, total_docs: usize) -> f32 {
    let n = total_docs as f32;
    let df = doc_freq as f32;
    1.0 + (n - df + 0.5) / (df + 0.5)
}

/// BM25 contribution of a single term for a single document.
///
/// Zero when the term does not occur in the document's term frequencies;
/// substring matches that cross token boundaries are scored by the caller
/// via the fixed substring boost alone.
pub(crate) fn term_score(term: &str, doc: &FileDoc, stats: &CorpusStats) -> f32 {
    let tf = match doc.term_freqs.get(term) {
        Some(&tf) if tf > 0 => tf as f32,
        _ => return 0.0,
    };
    let df = stats.doc_freqs.get(term).copied().unwrap_or(0);
    let idf_score = idf(df, stats.total_docs);

    let avg_dl = if stats.avg_doc_length > 0.0 {
        stats.avg_doc_length
    } else {
        1.0
    };
    let dl = doc.length as f32;
    let numerator = tf * (BM25_K1 + 1.0);
    let denominator = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (dl / avg_dl));
    if denominator <= 0.0 {
        return 0.0;
    }
    idf_score * (numerator / denominator)
}

/// BM25 score of a document for a set of query terms.
pub(crate) fn score_terms(terms: &[String], doc: &FileDoc, stats: &CorpusStats) -> f32 {
    terms
        .iter()
        .map(|t| term_score(t, doc, stats))
        .sum::<f32>()
        .max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn doc_with_tf(term: &str, tf: u32, length: usize) -> FileDoc {
        let mut doc = FileDoc::from_content("a.rs".to_string(), String::new(), None);
        doc.term_freqs = HashMap::from([(term.to_string(), tf)]);
        doc.length = length;
        doc
    }

    fn stats(df: u32, total_docs: usize, avg_dl: f32) -> CorpusStats {
        CorpusStats {
            total_docs,
            avg_doc_length: avg_dl,
            doc_freqs: HashMap::from([("token".to_string(), df)]),
            total_terms: 100,
        }
    }

    #[test]
    fn test_idf_decreases_with_document_frequency() {
        assert!(idf(1, 100) > idf(10, 100));
        assert!(idf(10, 100) > idf(100, 100));
    }

    #[test]
    fn test_idf_never_below_one() {
        // Even a term in every document keeps a positive contribution
        assert!(idf(100, 100) >= 1.0);
    }

    #[test]
    fn test_score_monotonic_in_tf() {
        let s = stats(5, 100, 50.0);
        let mut previous = 0.0;
        for tf in 1..20 {
            let doc = doc_with_tf("token", tf, 50);
            let score = term_score("token", &doc, &s);
            assert!(
                score >= previous,
                "tf={} score={} previous={}",
                tf,
                score,
                previous
            );
            previous = score;
        }
    }

    #[test]
    fn test_longer_docs_score_lower() {
        let s = stats(5, 100, 50.0);
        let short = term_score("token", &doc_with_tf("token", 3, 25), &s);
        let long = term_score("token", &doc_with_tf("token", 3, 200), &s);
        assert!(short > long);
    }

    #[test]
    fn test_absent_term_scores_zero() {
        let s = stats(5, 100, 50.0);
        let doc = doc_with_tf("token", 3, 50);
        assert_eq!(term_score("missing", &doc, &s), 0.0);
    }
}

//! Post-merge boost detection and application.

use crate::config::FusionConfig;
use crate::fusion::analytics::BoostCounts;
use crate::tokenizer;
use crate::types::SearchHit;
use chrono::{DateTime, Duration, Utc};
use glob::Pattern;

/// Precomputed per-query boost context.
pub struct BoostContext {
    /// Lowercased query keywords for exact-match detection.
    keywords: Vec<String>,
    /// Case variants per keyword for symbol-match detection.
    symbol_variants: Vec<String>,
    /// Compiled file patterns plus their sources.
    patterns: Vec<(Option<Pattern>, String)>,
    now: DateTime<Utc>,
}

impl BoostContext {
    pub fn new(query: &str, file_patterns: &[String], now: DateTime<Utc>) -> Self {
        let keywords = tokenizer::tokenize(query);
        let mut symbol_variants = Vec::new();
        for keyword in &keywords {
            symbol_variants.push(keyword.clone());
            symbol_variants.push(title_case(keyword));
            symbol_variants.push(keyword.to_uppercase());
            if keyword.contains('_') {
                symbol_variants.push(camel_from_snake(keyword));
            }
        }
        symbol_variants.sort();
        symbol_variants.dedup();

        let patterns = file_patterns
            .iter()
            .map(|p| (Pattern::new(p).ok(), p.clone()))
            .collect();

        Self {
            keywords,
            symbol_variants,
            patterns,
            now,
        }
    }

    fn exact_match(&self, hit: &SearchHit) -> bool {
        if self.keywords.is_empty() || hit.text.is_empty() {
            return false;
        }
        let text_lower = hit.text.to_lowercase();
        self.keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }

    fn symbol_match(&self, hit: &SearchHit) -> bool {
        if hit.text.is_empty() {
            return false;
        }
        self.symbol_variants
            .iter()
            .any(|v| hit.text.contains(v.as_str()))
    }

    fn file_type_match(&self, hit: &SearchHit) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let basename = hit.file.rsplit(['/', '\\']).next().unwrap_or(&hit.file);
        self.patterns.iter().any(|(pattern, source)| {
            if let Some(rest) = source.strip_prefix('*') {
                // Leading-star patterns reduce to a suffix match.
                return basename.ends_with(rest) || hit.file.ends_with(rest);
            }
            if let Some(prefix) = source.strip_suffix('*') {
                return basename.starts_with(prefix);
            }
            match pattern {
                Some(p) => p.matches(basename) || p.matches(&hit.file),
                None => basename == source,
            }
        })
    }

    fn recent(&self, hit: &SearchHit, window_days: i64) -> bool {
        match hit.last_modified {
            Some(modified) => self.now.signed_duration_since(modified) <= Duration::days(window_days),
            None => false,
        }
    }
}

/// Multiplies each applicable boost into the hit's score and tallies it.
pub fn apply_boosts(
    hit: &mut SearchHit,
    context: &BoostContext,
    config: &FusionConfig,
    counts: &mut BoostCounts,
) {
    if context.exact_match(hit) {
        hit.score *= config.exact_match_boost;
        counts.exact_match += 1;
    }
    if context.symbol_match(hit) {
        hit.score *= config.symbol_match_boost;
        counts.symbol_match += 1;
    }
    if context.file_type_match(hit) {
        hit.score *= config.file_type_boost;
        counts.file_type += 1;
    }
    if context.recent(hit, config.recency_window_days) {
        hit.score *= config.recency_boost;
        counts.recency += 1;
    }
}

fn title_case(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn camel_from_snake(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut upper_next = false;
    for c in term.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HitSource;

    fn hit(file: &str, text: &str) -> SearchHit {
        SearchHit {
            file: file.into(),
            line_number: 1,
            text: text.into(),
            score: 1.0,
            source: HitSource::Lexical,
            start_byte: 0,
            end_byte: 0,
            language: "rust".into(),
            last_modified: None,
        }
    }

    fn default_config() -> FusionConfig {
        FusionConfig::default()
    }

    #[test]
    fn test_exact_match_boost() {
        let context = BoostContext::new("authenticate", &[], Utc::now());
        let config = default_config();
        let mut counts = BoostCounts::default();
        let mut h = hit("a.rs", "fn authenticate() {}");
        apply_boosts(&mut h, &context, &config, &mut counts);
        assert_eq!(counts.exact_match, 1);
        // Exact and symbol both fire on a literal occurrence
        assert!((h.score - config.exact_match_boost * config.symbol_match_boost).abs() < 1e-5);
    }

    #[test]
    fn test_symbol_variants() {
        let context = BoostContext::new("retry_count", &[], Utc::now());
        let config = default_config();
        let mut counts = BoostCounts::default();
        let mut h = hit("a.java", "int retryCount = 3;");
        apply_boosts(&mut h, &context, &config, &mut counts);
        assert_eq!(counts.symbol_match, 1);
        assert_eq!(counts.exact_match, 0);
    }

    #[test]
    fn test_uppercase_variant() {
        let context = BoostContext::new("timeout", &[], Utc::now());
        let mut counts = BoostCounts::default();
        let mut h = hit("a.c", "#define TIMEOUT 30");
        apply_boosts(&mut h, &context, &default_config(), &mut counts);
        assert_eq!(counts.symbol_match, 1);
    }

    #[test]
    fn test_file_type_boost_suffix_glob() {
        let context = BoostContext::new("anything", &["*.js".to_string()], Utc::now());
        let mut counts = BoostCounts::default();
        let mut h = hit("src/app.js", "");
        apply_boosts(&mut h, &context, &default_config(), &mut counts);
        assert_eq!(counts.file_type, 1);

        let mut other = hit("src/app.py", "");
        apply_boosts(&mut other, &context, &default_config(), &mut counts);
        assert_eq!(counts.file_type, 1);
    }

    #[test]
    fn test_file_type_boost_literal() {
        let context = BoostContext::new("main", &["package.json".to_string()], Utc::now());
        let mut counts = BoostCounts::default();
        let mut h = hit("web/package.json", "");
        apply_boosts(&mut h, &context, &default_config(), &mut counts);
        assert_eq!(counts.file_type, 1);
    }

    #[test]
    fn test_recency_boost_window() {
        let now = Utc::now();
        let context = BoostContext::new("x", &[], now);
        let config = default_config();
        let mut counts = BoostCounts::default();

        let mut fresh = hit("a.rs", "");
        fresh.last_modified = Some(now - Duration::days(2));
        apply_boosts(&mut fresh, &context, &config, &mut counts);
        assert_eq!(counts.recency, 1);

        let mut stale = hit("b.rs", "");
        stale.last_modified = Some(now - Duration::days(100));
        apply_boosts(&mut stale, &context, &config, &mut counts);
        assert_eq!(counts.recency, 1);
    }

    #[test]
    fn test_camel_from_snake() {
        assert_eq!(camel_from_snake("retry_count"), "retryCount");
        assert_eq!(camel_from_snake("a_b_c"), "aBC");
    }
}

//! End-to-end search scenarios over a real temp-dir corpus.

use codequery_lib::config::{AppConfig, EmbedderKind, FusionStrategy, Normalization};
use codequery_lib::lexical::{LexicalIndex, LexicalSearchOptions};
use codequery_lib::service::SearchService;
use codequery_lib::types::{CancelToken, HitSource, SearchFilters, SearchRequest};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.index_root = Some(dir.path().join("index"));
    config.embedding.model = EmbedderKind::Hashed;
    config.embedding.dimension = 64;
    config.embedding.timeout_secs = 0;
    // Keep the weak hashed-embedder similarities out of the way so the
    // scenarios below are driven by the lexical side.
    config.fusion.min_semantic_score = 0.95;
    config
}

fn open_and_index(config: AppConfig, files: &[PathBuf]) -> Arc<SearchService> {
    let service = Arc::new(SearchService::open(config).unwrap());
    let token = CancelToken::new();
    let coordinator = service.new_coordinator("test".to_string(), token);
    let indexed = coordinator.bulk_index(files, |_, _| {}).unwrap();
    assert_eq!(indexed, files.len(), "bulk index should succeed for all files");
    service
}

// S1: exact function name across three languages.
#[test]
fn s1_exact_function_name() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(
            dir.path(),
            "auth.go",
            "package auth\n\nfunc authenticate(user string) bool {\n\treturn user != \"\"\n}\n",
        ),
        write_file(
            dir.path(),
            "auth.py",
            "def authenticate(user):\n    return bool(user)\n",
        ),
        write_file(
            dir.path(),
            "auth.js",
            "function authenticate(user) {\n  return !!user;\n}\n",
        ),
    ];
    let service = open_and_index(test_config(&dir), &files);

    let request = SearchRequest::new("authenticate").with_top_k(5);
    let response = service.search(&request, &CancelToken::new()).unwrap();

    assert!(response.hits.len() >= 3, "expected >= 3 hits, got {}", response.hits.len());
    let expected: Vec<String> = files.iter().map(|f| f.to_string_lossy().into_owned()).collect();
    assert!(expected.contains(&response.hits[0].file));
    for hit in &response.hits {
        assert!(
            matches!(hit.source, HitSource::Lexical | HitSource::Both),
            "unexpected source {:?} for {}",
            hit.source,
            hit.file
        );
    }
}

// S2: import-of-library query.
#[test]
fn s2_imports_of_library() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(
            dir.path(),
            "app.js",
            "import chalk from 'chalk';\n\nconsole.log(chalk.green('ok'));\n",
        ),
        write_file(
            dir.path(),
            "tool.js",
            "const chalk = require('chalk');\nmodule.exports = chalk;\n",
        ),
        write_file(dir.path(), "other.js", "console.log('no imports here');\n"),
    ];
    let service = open_and_index(test_config(&dir), &files);

    let parsed = codequery_lib::query::parse_query("imports of chalk");
    assert_eq!(parsed.intent, codequery_lib::query::QueryIntent::Import);
    assert!(parsed.file_patterns.contains(&"*.js".to_string()));

    let request = SearchRequest::new("imports of chalk").with_top_k(10);
    let response = service.search(&request, &CancelToken::new()).unwrap();

    let hit_files: Vec<&str> = response.hits.iter().map(|h| h.file.as_str()).collect();
    assert!(hit_files.iter().any(|f| f.ends_with("app.js")), "missing es6 import file");
    assert!(hit_files.iter().any(|f| f.ends_with("tool.js")), "missing require file");
    assert!(!hit_files.iter().any(|f| f.ends_with("other.js")));
    for hit in &response.hits {
        assert!(matches!(hit.source, HitSource::Lexical | HitSource::Both));
    }
}

// S3: package.json field query.
#[test]
fn s3_json_field_query() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(
            dir.path(),
            "package.json",
            "{\n  \"name\": \"demo\",\n  \"main\": \"index.js\",\n  \"scripts\": { \"build\": \"tsc\" }\n}\n",
        ),
        write_file(dir.path(), "index.js", "module.exports = {};\n"),
    ];
    let service = open_and_index(test_config(&dir), &files);

    let parsed = codequery_lib::query::parse_query("main field in package.json");
    assert!(parsed.is_json_field_query);

    let request = SearchRequest::new("main field in package.json").with_top_k(5);
    let response = service.search(&request, &CancelToken::new()).unwrap();

    let analytics = response.analytics.as_ref().expect("analytics enabled by default");
    assert!(
        analytics.effective_weight >= 0.85,
        "effective weight {} below the json-field floor",
        analytics.effective_weight
    );
    assert!(!response.hits.is_empty());
    assert!(
        response.hits[0].file.ends_with("package.json"),
        "top hit was {}",
        response.hits[0].file
    );
}

// S6: regex query scores the fixed regex value on the lexical side.
#[test]
fn s6_regex_query() {
    let dir = TempDir::new().unwrap();
    let files = vec![write_file(
        dir.path(),
        "main.go",
        "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n",
    )];

    // The lexical contract itself: fixed score 10.0.
    let mut config = test_config(&dir);
    let service = open_and_index(config.clone(), &files);
    let direct = service
        .lexical_handle()
        .search(
            r"func\s+\w+",
            &LexicalSearchOptions {
                use_regex: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!direct.is_empty());
    assert_eq!(direct[0].score, 10.0);

    // End to end with neutral fusion, the fixed score survives.
    config.fusion.strategy = FusionStrategy::WeightedLinear;
    config.fusion.bm25_weight = 1.0;
    config.fusion.adaptive_weighting = false;
    config.fusion.legacy_weight_guards = false;
    config.fusion.normalization = Normalization::None;
    config.fusion.exact_match_boost = 1.0;
    config.fusion.symbol_match_boost = 1.0;
    config.fusion.file_type_boost = 1.0;
    config.fusion.recency_boost = 1.0;
    let service = open_and_index(config, &files);
    let request = SearchRequest::new(r"func\s+\w+").with_top_k(5);
    let response = service.search(&request, &CancelToken::new()).unwrap();
    assert!(!response.hits.is_empty());
    assert_eq!(response.hits[0].score, 10.0);
    assert_eq!(response.hits[0].source, HitSource::Lexical);
}

// P6: top-k contract.
#[test]
fn top_k_contract() {
    let dir = TempDir::new().unwrap();
    let files: Vec<PathBuf> = (0..8)
        .map(|i| {
            write_file(
                dir.path(),
                &format!("file{}.rs", i),
                &format!("fn shared_token_{}() {{ common_marker(); }}\n", i),
            )
        })
        .collect();
    let service = open_and_index(test_config(&dir), &files);

    for top_k in [1, 3, 20] {
        let request = SearchRequest::new("common_marker").with_top_k(top_k);
        let response = service.search(&request, &CancelToken::new()).unwrap();
        assert!(response.hits.len() <= top_k);
        for pair in response.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score, "hits not sorted");
        }
    }
}

#[test]
fn language_filter_restricts_results() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(dir.path(), "a.go", "func authenticate() {}\n"),
        write_file(dir.path(), "b.py", "def authenticate():\n    pass\n"),
    ];
    let service = open_and_index(test_config(&dir), &files);

    let mut request = SearchRequest::new("authenticate").with_top_k(10);
    request.language = Some("go".to_string());
    let response = service.search(&request, &CancelToken::new()).unwrap();
    assert!(!response.hits.is_empty());
    assert!(response.hits.iter().all(|h| h.file.ends_with("a.go")));
}

#[test]
fn file_pattern_filter_via_request() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(dir.path(), "a.go", "retry_loop here\n"),
        write_file(dir.path(), "b.py", "retry_loop there\n"),
    ];
    let service = open_and_index(test_config(&dir), &files);

    let mut request = SearchRequest::new("retry_loop").with_top_k(10);
    request.filters = SearchFilters {
        file_patterns: vec!["*.py".to_string()],
        repos: Vec::new(),
    };
    let response = service.search(&request, &CancelToken::new()).unwrap();
    assert!(!response.hits.is_empty());
    assert!(response.hits.iter().all(|h| h.file.ends_with("b.py")));
}

#[test]
fn empty_query_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(SearchService::open(test_config(&dir)).unwrap());
    let request = SearchRequest::new("   ");
    let err = service.search(&request, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, codequery_lib::Error::BadQuery(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn suggest_and_explain() {
    let dir = TempDir::new().unwrap();
    let files = vec![write_file(
        dir.path(),
        "a.rs",
        "fn authenticate() {}\nfn authorize() {}\n",
    )];
    let service = open_and_index(test_config(&dir), &files);

    assert!(service.suggest("a").is_empty(), "below the minimum prefix");
    let suggestions = service.suggest("auth");
    assert!(suggestions.contains(&"authenticate".to_string()));
    assert!(suggestions.len() <= 10);

    let explanation = service.explain("find authenticate in go files");
    assert!(!explanation.is_regex);
    assert!(explanation
        .extracted_keywords
        .contains(&"authenticate".to_string()));
    assert!(explanation.bm25_weight >= 0.0 && explanation.bm25_weight <= 1.0);

    let regex_explanation = service.explain(r"fn\s+\w+");
    assert!(regex_explanation.is_regex);
}

#[test]
fn persisted_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let files = vec![write_file(dir.path(), "a.rs", "fn persistent_marker() {}\n")];
    let service = open_and_index(config.clone(), &files);
    service.save().unwrap();
    drop(service);

    let reopened = Arc::new(SearchService::open(config).unwrap());
    let request = SearchRequest::new("persistent_marker").with_top_k(5);
    let response = reopened.search(&request, &CancelToken::new()).unwrap();
    assert!(!response.hits.is_empty());
    assert!(response.hits[0].file.ends_with("a.rs"));
}

#[test]
fn status_reflects_indexed_files() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(dir.path(), "a.rs", "fn one() {}\n"),
        write_file(dir.path(), "b.rs", "fn two() {}\n"),
    ];
    let service = open_and_index(test_config(&dir), &files);
    let status = service.index_status();
    assert_eq!(status.total_files, 2);
    assert_eq!(status.indexed_files, 2);
    assert!(status.failed_files.is_empty());
    assert!(status.lexical_progress_pct >= 100.0 - 1e-3);
    assert!(status.last_updated.is_some());
}

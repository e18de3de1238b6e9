//! Query algebra for the lexical side.
//!
//! Parsed queries compose as `Substring`, `Regex`, `And`, `Or` and
//! `FileName` nodes. `And` scores as the minimum of its children, `Or` as
//! the maximum; `FileName` nodes act as pure filters and never cap the
//! combined score.

use crate::constants::{REGEX_MATCH_SCORE, SUBSTRING_IDF_BOOST};
use crate::error::{Error, Result};
use crate::lexical::bm25;
use crate::lexical::index::{CorpusStats, FileDoc};
use glob::Pattern;
use regex::{Regex, RegexBuilder};

/// One node of the parsed query tree.
#[derive(Debug, Clone)]
pub enum QueryNode {
    Substring(String),
    Regex(String),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    FileName(String),
}

/// A query tree with its regexes compiled and substrings case-folded.
#[derive(Debug)]
pub struct CompiledQuery {
    root: CompiledNode,
    case_sensitive: bool,
}

#[derive(Debug)]
enum CompiledNode {
    Substring { term: String },
    Regex { pattern: Regex },
    And(Vec<CompiledNode>),
    Or(Vec<CompiledNode>),
    FileName { pattern: Pattern, source: String },
}

/// Literal (wildcard-free) patterns also match as path or basename
/// suffixes, so `server/main.go` finds `src/server/main.go`.
fn literal_matches(source: &str, path: &str, basename: &str) -> bool {
    !source.contains(['*', '?', '['])
        && (basename == source || path.ends_with(source) || basename.ends_with(source))
}

/// Glob-or-literal match of a path against a pattern list, the same
/// semantics the FileName node uses. An empty list matches everything;
/// an invalid pattern matches nothing.
pub fn path_matches_any(patterns: &[String], path: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let basename = path.rsplit(['/', '\\']).next().unwrap_or(path);
    patterns.iter().any(|source| {
        let glob_hit = Pattern::new(source)
            .map(|p| p.matches(basename) || p.matches(path))
            .unwrap_or(false);
        glob_hit || literal_matches(source, path, basename)
    })
}

impl CompiledQuery {
    /// Compiles the tree; an invalid regex or glob yields `BadQuery`.
    pub fn compile(node: &QueryNode, case_sensitive: bool) -> Result<Self> {
        Ok(Self {
            root: Self::compile_node(node, case_sensitive)?,
            case_sensitive,
        })
    }

    fn compile_node(node: &QueryNode, case_sensitive: bool) -> Result<CompiledNode> {
        match node {
            QueryNode::Substring(term) => Ok(CompiledNode::Substring {
                term: if case_sensitive {
                    term.clone()
                } else {
                    term.to_lowercase()
                },
            }),
            QueryNode::Regex(source) => {
                let pattern = RegexBuilder::new(source)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| Error::BadQuery(format!("invalid regex {:?}: {}", source, e)))?;
                Ok(CompiledNode::Regex { pattern })
            }
            QueryNode::And(children) => Ok(CompiledNode::And(
                children
                    .iter()
                    .map(|c| Self::compile_node(c, case_sensitive))
                    .collect::<Result<Vec<_>>>()?,
            )),
            QueryNode::Or(children) => Ok(CompiledNode::Or(
                children
                    .iter()
                    .map(|c| Self::compile_node(c, case_sensitive))
                    .collect::<Result<Vec<_>>>()?,
            )),
            QueryNode::FileName(source) => {
                let pattern = Pattern::new(source)
                    .map_err(|e| Error::BadQuery(format!("invalid glob {:?}: {}", source, e)))?;
                Ok(CompiledNode::FileName {
                    pattern,
                    source: source.clone(),
                })
            }
        }
    }

    /// Scores a document against the tree; `None` means no match.
    ///
    /// Substring nodes score BM25 for the term plus a fixed idf-boost;
    /// regex nodes score a fixed value. FileName filters propagate
    /// `f32::INFINITY`, resolved to a neutral 1.0 at the top.
    pub fn score(&self, doc: &FileDoc, stats: &CorpusStats) -> Option<f32> {
        let raw = self.score_node(&self.root, doc, stats)?;
        Some(if raw.is_infinite() { 1.0 } else { raw })
    }

    fn score_node(&self, node: &CompiledNode, doc: &FileDoc, stats: &CorpusStats) -> Option<f32> {
        match node {
            CompiledNode::Substring { term } => {
                let haystack = if self.case_sensitive {
                    doc.content.as_str()
                } else {
                    doc.content_lower.as_str()
                };
                if !haystack.contains(term.as_str()) {
                    return None;
                }
                Some(bm25::term_score(term, doc, stats) + SUBSTRING_IDF_BOOST)
            }
            CompiledNode::Regex { pattern } => {
                if pattern.is_match(&doc.content) {
                    Some(REGEX_MATCH_SCORE)
                } else {
                    None
                }
            }
            CompiledNode::And(children) => {
                let mut min = f32::INFINITY;
                for child in children {
                    let score = self.score_node(child, doc, stats)?;
                    min = min.min(score);
                }
                Some(min)
            }
            CompiledNode::Or(children) => {
                let mut best: Option<f32> = None;
                for child in children {
                    if let Some(score) = self.score_node(child, doc, stats) {
                        best = Some(best.map_or(score, |b: f32| b.max(score)));
                    }
                }
                best
            }
            CompiledNode::FileName { pattern, source } => {
                let name = doc.basename();
                if pattern.matches(name)
                    || pattern.matches(&doc.path)
                    || literal_matches(source, &doc.path, name)
                {
                    Some(f32::INFINITY)
                } else {
                    None
                }
            }
        }
    }

    /// True when `line` matches any content leaf of the tree, for
    /// expanding a matched document into per-line hits.
    pub fn line_matches(&self, line: &str) -> bool {
        self.node_line_matches(&self.root, line)
    }

    fn node_line_matches(&self, node: &CompiledNode, line: &str) -> bool {
        match node {
            CompiledNode::Substring { term } => {
                if self.case_sensitive {
                    line.contains(term.as_str())
                } else {
                    line.to_lowercase().contains(term.as_str())
                }
            }
            CompiledNode::Regex { pattern } => pattern.is_match(line),
            CompiledNode::And(children) | CompiledNode::Or(children) => {
                children.iter().any(|c| self.node_line_matches(c, line))
            }
            CompiledNode::FileName { .. } => false,
        }
    }
}

/// Combines user-side file patterns with a content query: the patterns
/// are OR-combined, then ANDed with the query tree.
pub fn with_file_patterns(query: QueryNode, patterns: &[String]) -> QueryNode {
    if patterns.is_empty() {
        return query;
    }
    let pattern_nodes: Vec<QueryNode> = patterns
        .iter()
        .map(|p| QueryNode::FileName(p.clone()))
        .collect();
    QueryNode::And(vec![query, QueryNode::Or(pattern_nodes)])
}

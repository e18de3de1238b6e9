//! Splits file content into embeddable chunks.
//!
//! Boundary rule: a chunk closes after at most `MAX_CHUNK_TOKENS` tokens,
//! or earlier when a language-aware function boundary starts a new one —
//! whichever comes first. Chunks never overlap and are ordered by start
//! byte.

use crate::constants::MAX_CHUNK_TOKENS;
use crate::embed::content_hash;
use crate::tokenizer;
use crate::types::{format_chunk_id, ChunkRecord};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref RUST_FN_RE: Regex =
        Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+\w+").unwrap();
    static ref GO_FN_RE: Regex = Regex::new(r"^func\s+(?:\([^)]*\)\s*)?\w+").unwrap();
    static ref PYTHON_FN_RE: Regex = Regex::new(r"^(?:async\s+)?def\s+\w+|^class\s+\w+").unwrap();
    static ref JS_FN_RE: Regex = Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w*|^\s*(?:export\s+)?class\s+\w+"
    )
    .unwrap();
    static ref JAVA_FN_RE: Regex = Regex::new(
        r"^\s*(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\],\s]+\s+\w+\s*\("
    )
    .unwrap();
    static ref C_FN_RE: Regex = Regex::new(r"^[A-Za-z_][\w\s\*]*\s+\**\w+\s*\([^;]*$").unwrap();
}

/// True when `line` starts a new function (or type) for `language`.
fn is_function_boundary(language: &str, line: &str) -> bool {
    match language {
        "rust" => RUST_FN_RE.is_match(line),
        "go" => GO_FN_RE.is_match(line),
        "python" => PYTHON_FN_RE.is_match(line),
        "javascript" | "typescript" => JS_FN_RE.is_match(line),
        "java" | "csharp" | "kotlin" | "scala" => JAVA_FN_RE.is_match(line),
        "c" | "cpp" => C_FN_RE.is_match(line),
        _ => false,
    }
}

/// Chunks one file's content. Empty content yields no chunks.
pub fn chunk_file(path: &Path, content: &str, language: &str) -> Vec<ChunkRecord> {
    let mut chunks = Vec::new();
    let mut chunk_start_byte = 0usize;
    let mut chunk_start_line = 1usize;
    let mut chunk_tokens = 0usize;
    let mut chunk_text = String::new();
    let mut cursor = 0usize;
    let mut line_number = 0usize;

    let flush = |start_byte: usize,
                     end_byte: usize,
                     start_line: usize,
                     text: &str,
                     chunks: &mut Vec<ChunkRecord>| {
        if text.trim().is_empty() {
            return;
        }
        chunks.push(ChunkRecord {
            chunk_id: format_chunk_id(path, start_byte, end_byte, start_line),
            file_path: path.to_path_buf(),
            start_byte,
            end_byte,
            start_line,
            language: language.to_string(),
            text_hash: content_hash(text),
            text: text.to_string(),
        });
    };

    for line in content.split_inclusive('\n') {
        line_number += 1;
        let line_tokens = tokenizer::count_tokens(line);
        let boundary = is_function_boundary(language, line.trim_end_matches(['\n', '\r']));
        let would_overflow = chunk_tokens + line_tokens > MAX_CHUNK_TOKENS && chunk_tokens > 0;

        if (boundary && chunk_tokens > 0) || would_overflow {
            flush(
                chunk_start_byte,
                cursor,
                chunk_start_line,
                &chunk_text,
                &mut chunks,
            );
            chunk_start_byte = cursor;
            chunk_start_line = line_number;
            chunk_tokens = 0;
            chunk_text.clear();
        }

        chunk_text.push_str(line);
        chunk_tokens += line_tokens;
        cursor += line.len();
    }
    flush(
        chunk_start_byte,
        cursor,
        chunk_start_line,
        &chunk_text,
        &mut chunks,
    );

    chunks
}

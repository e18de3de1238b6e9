//! Query parsing and intent classification.
//!
//! Parsing never fails: whatever the input looks like, the caller gets a
//! best-effort [`ParsedQuery`] and the search proceeds with it.

use crate::tokenizer;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Coarse query category driving fusion weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Natural,
    Code,
    Symbol,
    File,
    Import,
    Config,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Natural => "natural",
            QueryIntent::Code => "code",
            QueryIntent::Symbol => "symbol",
            QueryIntent::File => "file",
            QueryIntent::Import => "import",
            QueryIntent::Config => "config",
        }
    }
}

/// Structured view of a user query.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub original: String,
    /// Query text with recognized file/field tokens stripped; falls back
    /// to `original` when stripping empties it.
    pub focused: String,
    pub file_patterns: Vec<String>,
    pub target_fields: Vec<String>,
    pub detected_file_type: Option<String>,
    pub is_json_field_query: bool,
    /// Library name extracted from an import/usage query.
    pub import_library: Option<String>,
    /// Generated ES6/CommonJS/dynamic-import patterns for the lexical side.
    pub import_regexes: Vec<String>,
    pub intent: QueryIntent,
}

lazy_static! {
    /// "imports of X" / "usages of X" / "where is X imported" phrasings.
    static ref IMPORT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bimports?\s+(?:of|from)\s+([@\w./-]+)").unwrap(),
        Regex::new(r"(?i)\busages?\s+of\s+([@\w./-]+)").unwrap(),
        Regex::new(r"(?i)\bwhere\s+is\s+([@\w./-]+)\s+(?:imported|used|required)").unwrap(),
        Regex::new(r"(?i)\bfiles?\s+(?:that\s+)?(?:import|require)s?\s+([@\w./-]+)").unwrap(),
        Regex::new(r"(?i)\brequires?\s+of\s+([@\w./-]+)").unwrap(),
    ];

    static ref CAMEL_CASE_RE: Regex = Regex::new(r"\b[a-z]+[A-Z]\w*").unwrap();
    static ref SNAKE_CASE_RE: Regex = Regex::new(r"\b\w+_\w+\b").unwrap();
    static ref CONSTANT_RE: Regex = Regex::new(r"\b[A-Z][A-Z0-9_]{2,}\b").unwrap();

    /// Language-family phrasings like "go files" or "ts files".
    static ref FAMILY_RE: Regex =
        Regex::new(r"(?i)\b(go|rust|rs|python|py|js|javascript|ts|typescript|java|rb|ruby|c|cpp|md|markdown)\s+files?\b")
            .unwrap();

    static ref FILE_WORD_RE: Regex = Regex::new(r"(?i)\bfiles?\b").unwrap();
}

/// Well-known files recognized directly in queries.
const KNOWN_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "go.mod",
    "go.sum",
    "cargo.toml",
    "dockerfile",
    "makefile",
    "pyproject.toml",
    "requirements.txt",
];

/// package.json fields recognized for field queries.
const PACKAGE_JSON_FIELDS: &[&str] = &[
    "main",
    "scripts",
    "dependencies",
    "devdependencies",
    "peerdependencies",
    "version",
    "name",
    "type",
    "exports",
    "engines",
    "workspaces",
    "bin",
];

/// Code keywords indicating a code-shaped query.
const CODE_KEYWORDS: &[&str] = &[
    "function", "class", "def", "if", "else", "import", "export", "return", "const", "let",
    "var", "fn", "func", "struct", "enum", "impl", "trait", "interface", "async", "await",
    "pub", "static", "void", "lambda",
];

fn family_patterns(family: &str) -> Vec<String> {
    match family.to_lowercase().as_str() {
        "go" => vec!["*.go".into()],
        "rust" | "rs" => vec!["*.rs".into()],
        "python" | "py" => vec!["*.py".into()],
        "js" | "javascript" => vec!["*.js".into(), "*.jsx".into(), "*.mjs".into(), "*.cjs".into()],
        "ts" | "typescript" => vec!["*.ts".into(), "*.tsx".into()],
        "java" => vec!["*.java".into()],
        "rb" | "ruby" => vec!["*.rb".into()],
        "c" => vec!["*.c".into(), "*.h".into()],
        "cpp" => vec!["*.cpp".into(), "*.hpp".into(), "*.cc".into()],
        "md" | "markdown" => vec!["*.md".into()],
        _ => Vec::new(),
    }
}

/// Import regexes generated for a detected library: ES6 named/default,
/// side-effect import, CommonJS require, and dynamic import.
fn import_regexes_for(library: &str) -> Vec<String> {
    let lib = regex::escape(library);
    vec![
        format!(r#"import\s+[^;]*?\bfrom\s+['"]{}['"]"#, lib),
        format!(r#"import\s+['"]{}['"]"#, lib),
        format!(r#"require\s*\(\s*['"]{}['"]\s*\)"#, lib),
        format!(r#"import\s*\(\s*['"]{}['"]\s*\)"#, lib),
    ]
}

/// True when the query looks like a regex rather than literal terms.
pub fn is_regex_query(query: &str) -> bool {
    const REGEX_MARKERS: &[&str] = &[
        r"\b", r"\w", r"\d", r"\s", "[", "]", "(", ")", "*", "+", "?", "{", "}", "^", "$", "|",
    ];
    REGEX_MARKERS.iter().any(|m| query.contains(m))
}

/// Parses a query into its structured form. Never fails.
pub fn parse_query(query: &str) -> ParsedQuery {
    let original = query.to_string();
    let lower = query.to_lowercase();
    let mut file_patterns: Vec<String> = Vec::new();
    let mut target_fields: Vec<String> = Vec::new();
    let mut detected_file_type: Option<String> = None;
    let mut import_library: Option<String> = None;
    let mut import_regexes: Vec<String> = Vec::new();
    let mut stripped_tokens: Vec<String> = Vec::new();

    // Import/usage recognition: first matching pattern wins, the library
    // becomes the focused text and JS-family patterns are implied.
    for pattern in IMPORT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(query) {
            let lib = caps[1].trim_matches(|c| c == '\'' || c == '"').to_string();
            if !lib.is_empty() {
                import_regexes = import_regexes_for(&lib);
                import_library = Some(lib);
                for ext in ["*.js", "*.ts", "*.tsx", "*.jsx", "*.mjs", "*.cjs"] {
                    file_patterns.push(ext.to_string());
                }
                break;
            }
        }
    }

    // Well-known file references
    for known in KNOWN_FILES {
        if lower.contains(known) {
            // Preserve canonical casing for special files
            let canonical = match *known {
                "dockerfile" => "Dockerfile",
                "makefile" => "Makefile",
                "cargo.toml" => "Cargo.toml",
                other => other,
            };
            file_patterns.push(canonical.to_string());
            if detected_file_type.is_none() {
                detected_file_type = Some(canonical.to_string());
            }
            stripped_tokens.push(known.to_string());
        }
    }

    // Language-family phrasings ("go files", "ts files")
    if let Some(caps) = FAMILY_RE.captures(query) {
        let family = caps[1].to_string();
        for pattern in family_patterns(&family) {
            if !file_patterns.contains(&pattern) {
                file_patterns.push(pattern);
            }
        }
        if detected_file_type.is_none() {
            detected_file_type = Some(family.to_lowercase());
        }
        stripped_tokens.push(family.to_lowercase());
        stripped_tokens.push("files".to_string());
        stripped_tokens.push("file".to_string());
    }

    // package.json field references
    if lower.contains("package.json") {
        let query_tokens = tokenizer::tokenize(&lower);
        for field in PACKAGE_JSON_FIELDS {
            // Match "<field> field" or the bare field name next to the
            // package.json mention.
            if lower.contains(&format!("{} field", field))
                || query_tokens.iter().any(|t| t == field)
            {
                target_fields.push(field.to_string());
                stripped_tokens.push(field.to_string());
            }
        }
    }
    let is_json_field_query = !target_fields.is_empty();

    // Focused text: import queries focus on the library; otherwise strip
    // the recognized tokens and fall back to the original if nothing is
    // left.
    let focused = if let Some(lib) = &import_library {
        lib.clone()
    } else {
        let kept: Vec<String> = tokenizer::tokenize_display(query)
            .into_iter()
            .filter(|t| {
                let t_lower = t.to_lowercase();
                !stripped_tokens.contains(&t_lower)
            })
            .collect();
        if kept.is_empty() {
            original.clone()
        } else {
            kept.join(" ")
        }
    };

    let intent = classify_intent(
        &original,
        &lower,
        import_library.is_some(),
        is_json_field_query,
        &file_patterns,
    );

    ParsedQuery {
        original,
        focused,
        file_patterns,
        target_fields,
        detected_file_type,
        is_json_field_query,
        import_library,
        import_regexes,
        intent,
    }
}

/// Intent rules, first match wins.
fn classify_intent(
    original: &str,
    lower: &str,
    is_import: bool,
    is_json_field_query: bool,
    file_patterns: &[String],
) -> QueryIntent {
    if is_import {
        return QueryIntent::Import;
    }
    if is_json_field_query
        || lower.contains("config")
        || lower.contains("package.json")
        || lower.contains("tsconfig")
    {
        return QueryIntent::Config;
    }
    if !file_patterns.is_empty() || FILE_WORD_RE.is_match(lower) {
        return QueryIntent::File;
    }
    if CAMEL_CASE_RE.is_match(original)
        || SNAKE_CASE_RE.is_match(original)
        || CONSTANT_RE.is_match(original)
        || original.contains("::")
    {
        return QueryIntent::Symbol;
    }
    let tokens: Vec<String> = lower.split_whitespace().map(|t| t.to_string()).collect();
    if tokens.iter().any(|t| CODE_KEYWORDS.contains(&t.as_str())) {
        return QueryIntent::Code;
    }
    QueryIntent::Natural
}

//! Shared tokenization, used both at index time and at query time.
//!
//! The same splits must be produced for documents and queries or BM25 term
//! lookups silently miss; anything that changes here invalidates persisted
//! shards (bump `INDEX_FORMAT_VERSION`).

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Compound identifiers kept whole: dotted paths, kebab-case,
    /// snake_case, and scoped npm packages (`@scope/name`).
    static ref COMPOUND_RE: Regex =
        Regex::new(r"@[A-Za-z0-9_-]+/[A-Za-z0-9_.-]+|\w+(?:[.\-_]\w+)+").unwrap();
    static ref NON_WORD_RE: Regex = Regex::new(r"\W+").unwrap();
}

/// English function words dropped from index keys, plus `field` and
/// `section` which carry no signal in code queries.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "do", "does",
    "did", "done", "have", "has", "had", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "and", "or", "but", "not", "no", "nor", "this", "that", "these", "those",
    "it", "its", "can", "could", "will", "would", "should", "shall", "may", "might", "must",
    "me", "my", "mine", "we", "our", "ours", "you", "your", "yours", "they", "them", "their",
    "he", "she", "his", "her", "i", "what", "which", "who", "whom", "whose", "how", "when",
    "where", "why", "all", "any", "some", "each", "there", "here", "about", "into", "over",
    "under", "between", "through", "during", "before", "after", "above", "below", "again",
    "then", "than", "so", "too", "very", "just", "up", "down", "out", "off", "only", "own",
    "same", "such", "both", "more", "most", "other", "get", "got", "show", "give", "please",
    "field", "section",
];

/// Terms never dropped even when they collide with the stop list: action
/// verbs the query parser keys on, structural keywords, common config
/// keys, and short library aliases.
const KEEP_TERMS: &[&str] = &[
    "find", "search", "import", "imports", "export", "exports", "require", "requires",
    "module", "modules", "function", "functions", "class", "classes", "def", "fn", "func",
    "struct", "enum", "trait", "interface", "main", "scripts", "dependencies",
    "devdependencies", "peerdependencies", "version", "name", "type", "engines", "exports",
    "workspaces", "config", "zx", "fs", "d3", "rx", "qs", "vm", "os",
];

lazy_static! {
    static ref STOP_SET: HashSet<&'static str> = STOP_WORDS.iter().copied().collect();
    static ref KEEP_SET: HashSet<&'static str> = KEEP_TERMS.iter().copied().collect();
}

fn is_stop_word(token_lower: &str) -> bool {
    !KEEP_SET.contains(token_lower) && STOP_SET.contains(token_lower)
}

/// Splits text into raw tokens, preserving compound identifiers, without
/// case folding or stop-word filtering.
fn split_raw(text: &str) -> Vec<String> {
    // Placeholder substitution: compounds are swapped for word-character
    // markers so the non-word split cannot break them, then restored.
    let mut compounds: Vec<String> = Vec::new();
    let substituted = COMPOUND_RE.replace_all(text, |caps: &regex::Captures| {
        compounds.push(caps[0].to_string());
        format!("cqtok{}x", compounds.len() - 1)
    });

    let mut tokens = Vec::new();
    for piece in NON_WORD_RE.split(&substituted) {
        if piece.is_empty() {
            continue;
        }
        if let Some(idx) = piece
            .strip_prefix("cqtok")
            .and_then(|rest| rest.strip_suffix('x'))
            .and_then(|n| n.parse::<usize>().ok())
        {
            if let Some(original) = compounds.get(idx) {
                tokens.push(original.clone());
                continue;
            }
        }
        tokens.push(piece.to_string());
    }
    tokens
}

/// Tokenizes for index keys: compound-preserving split, lowercase,
/// stop-word filtered.
pub fn tokenize(text: &str) -> Vec<String> {
    split_raw(text)
        .into_iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty() && !is_stop_word(t))
        .collect()
}

/// Same splits and filtering as [`tokenize`], but original case retained
/// for display.
pub fn tokenize_display(text: &str) -> Vec<String> {
    split_raw(text)
        .into_iter()
        .filter(|t| !t.is_empty() && !is_stop_word(&t.to_lowercase()))
        .collect()
}

/// Raw token count without the stop-word drop, used for chunk sizing.
pub fn count_tokens(text: &str) -> usize {
    split_raw(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split_and_fold() {
        let tokens = tokenize("Find the AuthHandler in server");
        assert_eq!(tokens, vec!["find", "authhandler", "server"]);
    }

    #[test]
    fn test_compound_terms_preserved() {
        assert_eq!(tokenize("package.json"), vec!["package.json"]);
        assert_eq!(tokenize("snake_case_name"), vec!["snake_case_name"]);
        assert_eq!(tokenize("kebab-case-name"), vec!["kebab-case-name"]);
        assert_eq!(tokenize("config.yaml loader"), vec!["config.yaml", "loader"]);
    }

    #[test]
    fn test_scoped_package_preserved() {
        assert_eq!(tokenize("uses @types/node here"), vec!["uses", "@types/node"]);
    }

    #[test]
    fn test_stop_words_dropped_but_keep_list_wins() {
        let tokens = tokenize("what is the main field in the scripts section");
        // "field" and "section" are stopped; "main" and "scripts" are kept.
        assert_eq!(tokens, vec!["main", "scripts"]);
    }

    #[test]
    fn test_action_verbs_survive() {
        assert_eq!(tokenize("find imports of chalk"), vec!["find", "imports", "chalk"]);
        assert_eq!(tokenize("search for d3"), vec!["search", "d3"]);
    }

    #[test]
    fn test_display_case_retained() {
        let tokens = tokenize_display("MyClass does HTTP_RETRY");
        assert_eq!(tokens, vec!["MyClass", "HTTP_RETRY"]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("!!! ... ???").is_empty());
    }

    // Re-tokenizing the joined output is a fixed point (stop-word drop
    // already applied on the first pass).
    #[test]
    fn test_tokenize_is_idempotent_on_join() {
        let inputs = [
            "find usages of @scope/pkg in my_module.py",
            "HttpServer start-up sequence",
            "package.json main field",
        ];
        for input in inputs {
            let once = tokenize(input);
            let twice = tokenize(&once.join(" "));
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_count_tokens_ignores_stop_filter() {
        // 5 raw tokens even though 3 are stop words.
        assert_eq!(count_tokens("the cat is on fire"), 5);
    }
}

//! Language detection by extension plus a small special-file table.

use std::path::Path;

/// Files recognized by exact basename rather than extension.
const SPECIAL_FILES: &[(&str, &str)] = &[
    ("Dockerfile", "dockerfile"),
    ("Makefile", "makefile"),
    ("go.mod", "go"),
    ("go.sum", "go"),
    ("Cargo.toml", "toml"),
    ("CMakeLists.txt", "cmake"),
    ("pyproject.toml", "toml"),
    ("Pipfile", "toml"),
    ("requirements.txt", "text"),
];

/// Detects a file's language; unknown extensions map to `text`.
pub fn detect_language(path: &Path) -> String {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        for (special, language) in SPECIAL_FILES {
            if name == *special {
                return (*language).to_string();
            }
        }
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let language = match ext.as_str() {
        "rs" => "rust",
        "go" => "go",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascript",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescript",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "md" | "markdown" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "sql" => "sql",
        "proto" => "protobuf",
        "dart" => "dart",
        "lua" => "lua",
        "vue" => "vue",
        "svelte" => "svelte",
        "zig" => "zig",
        "ex" | "exs" => "elixir",
        "hs" => "haskell",
        _ => "text",
    };
    language.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(detect_language(Path::new("src/main.rs")), "rust");
        assert_eq!(detect_language(Path::new("a/b/handler.GO")), "go"); // extension compare is case-folded
        assert_eq!(detect_language(Path::new("a/b/handler.go")), "go");
        assert_eq!(detect_language(Path::new("x.tsx")), "typescript");
    }

    #[test]
    fn test_special_files() {
        assert_eq!(detect_language(Path::new("deploy/Dockerfile")), "dockerfile");
        assert_eq!(detect_language(Path::new("go.mod")), "go");
        assert_eq!(detect_language(Path::new("Cargo.toml")), "toml");
        assert_eq!(detect_language(Path::new("Makefile")), "makefile");
    }

    #[test]
    fn test_unknown_is_text() {
        assert_eq!(detect_language(Path::new("notes.unknownext")), "text");
        assert_eq!(detect_language(Path::new("LICENSE")), "text");
    }
}

// Constants shared across the engine. Tunables that users may want to
// override live in `crate::config`; these are the fixed defaults.

// --- BM25 ---
/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f32 = 1.5;
/// BM25 document-length normalization parameter.
pub const BM25_B: f32 = 0.75;
/// Fixed score assigned to a document matched by a regex node.
pub const REGEX_MATCH_SCORE: f32 = 10.0;
/// Additive idf-boost applied to substring matches.
pub const SUBSTRING_IDF_BOOST: f32 = 1.5;

// --- Fusion defaults ---
pub const DEFAULT_BM25_WEIGHT: f32 = 0.45;
pub const DEFAULT_RRF_K: f32 = 60.0;
pub const DEFAULT_MIN_LEXICAL_SCORE: f32 = 0.001;
pub const DEFAULT_MIN_SEMANTIC_SCORE: f32 = 0.05;
pub const DEFAULT_EXACT_MATCH_BOOST: f32 = 1.5;
pub const DEFAULT_SYMBOL_MATCH_BOOST: f32 = 1.3;
pub const DEFAULT_FILE_TYPE_BOOST: f32 = 1.2;
pub const DEFAULT_RECENCY_BOOST: f32 = 1.1;
/// Window within which a file modification counts as "recent".
pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 14;
/// Internal candidate pool multiplier: each side is asked for
/// `top_k * CANDIDATE_MULTIPLIER` results before fusion.
pub const CANDIDATE_MULTIPLIER: usize = 3;

// --- Vectors / embedding ---
/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 768;
/// Default capacity of the content-hash embedding cache.
pub const DEFAULT_EMBED_CACHE_SIZE: usize = 10_000;
/// Default per-call embedder timeout.
pub const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;
/// Default embedder retry budget.
pub const DEFAULT_EMBED_MAX_RETRIES: u32 = 3;
/// Default batch size for embedding generation.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

// --- Indexing ---
/// Files above this size fail with `FileTooLarge`.
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum tokens per chunk before a forced split.
pub const MAX_CHUNK_TOKENS: usize = 300;
/// Debounce window for coalescing file events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
/// Capacity of the bounded watcher event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
/// Retry budget for cross-index consistency repair.
pub const INGEST_MAX_RETRIES: u32 = 3;

// --- Request API ---
pub const DEFAULT_TOP_K: usize = 20;
/// Maximum number of suggestions returned by `suggest`.
pub const SUGGEST_LIMIT: usize = 10;
/// Prefixes shorter than this yield no suggestions.
pub const SUGGEST_MIN_PREFIX: usize = 2;

// --- On-disk layout ---
/// Lexical shard file name inside the index directory.
pub const LEXICAL_SHARD_FILE: &str = "lexical.bin";
/// Vector file name inside the index directory. The metadata sidecar is
/// written next to it as `<name>.meta`.
pub const VECTOR_FILE: &str = "vectors.bin";
/// Bump when the persisted encoding changes; loads of an older version
/// fall back to an empty index (the on-disk state is a rebuildable cache).
pub const INDEX_FORMAT_VERSION: u32 = 2;

//! Default configuration values for the Delve research engine.
//!
//! These constants are the compile-time defaults; runtime configuration
//! (environment variables, `from_env` constructors) can override most of
//! them per deployment.

// ============================================================================
// Research loop
// ============================================================================

/// Maximum number of search/analysis iterations per session.
///
/// The loop checks `iteration <= MAX_ITERATIONS` before incrementing, so a
/// session that never reaches sufficiency performs `MAX_ITERATIONS + 1`
/// passes. Callers that need an exact bound should account for the extra
/// pass.
pub const MAX_ITERATIONS: usize = 3;

/// Maximum number of search results consumed per query.
pub const MAX_SEARCH_RESULTS: usize = 3;

/// Maximum characters of page content kept per search result.
pub const MAX_CONTENT_CHARS: usize = 10_000;

// ============================================================================
// Model invocation
// ============================================================================

/// Attempts per model call before giving up (first try included).
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retries; multiplied by the attempt number.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Default OpenAI-compatible API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Groq API base URL (OpenAI-compatible surface).
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default Google Generative Language API base URL.
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Cloud Vision annotation endpoint.
pub const VISION_BASE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Exa search API endpoint.
pub const EXA_BASE_URL: &str = "https://api.exa.ai/search";

// ============================================================================
// Embeddings and vector store
// ============================================================================

/// Dimension of stored embeddings. All vectors are padded or truncated to
/// this length before they reach the store.
pub const VECTOR_DIMENSION: usize = 1536;

/// OpenAI embedding model.
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Google embedding model.
pub const GOOGLE_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Number of ivfflat lists for the cosine index.
pub const IVFFLAT_LISTS: u32 = 100;

// ============================================================================
// RAG retrieval
// ============================================================================

/// Default number of documents returned by a retrieval.
pub const RAG_RETRIEVAL_LIMIT: usize = 5;

/// Similarity assigned to keyword-fallback matches, which carry no real
/// vector distance.
pub const FALLBACK_SIMILARITY: f64 = 0.5;

/// Keyword-fallback tokens must be strictly longer than this.
pub const KEYWORD_MIN_LEN: usize = 3;

/// Words ignored when tokenizing a topic for keyword search.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "a", "for", "with", "on", "at", "from", "by", "about",
];

// ============================================================================
// Cache
// ============================================================================

/// Default cache entry lifetime (24 hours).
pub const CACHE_TTL_SECS: u64 = 86_400;

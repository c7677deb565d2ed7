//! # delve-rag
//!
//! Embedding service and retrieval-augmented generation for the Delve
//! research engine.
//!
//! [`EmbeddingService`] wraps a provider embedding backend with caching, a
//! deterministic offline fallback, and dimension normalization so the store
//! only ever sees 1536-dimension vectors. [`RagService`] sits on top and
//! implements the retrieval contract the research loop uses: cached
//! retrieval with similarity search, keyword fallback, and best-effort
//! per-finding storage of finished research.

pub mod embedding;
pub mod service;

pub use embedding::{EmbeddingService, MockEmbeddingBackend};
pub use service::RagService;

use delve_core::defaults::{KEYWORD_MIN_LEN, STOPWORDS};

/// Tokenizes a topic for keyword search: lowercase alphanumeric runs longer
/// than three characters, stopwords removed, order preserved, deduplicated.
pub fn extract_keywords(topic: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    topic
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > KEYWORD_MIN_LEN)
        .filter(|token| !STOPWORDS.contains(token))
        .filter(|token| seen.insert(token.to_string()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_basic() {
        let keywords = extract_keywords("The history of Rust programming");
        assert_eq!(keywords, vec!["history", "rust", "programming"]);
    }

    #[test]
    fn test_extract_keywords_drops_short_and_stopwords() {
        let keywords = extract_keywords("tips for work with the web at home");
        assert_eq!(keywords, vec!["tips", "work", "home"]);
    }

    #[test]
    fn test_extract_keywords_dedupes() {
        let keywords = extract_keywords("rust rust RUST tooling");
        assert_eq!(keywords, vec!["rust", "tooling"]);
    }

    #[test]
    fn test_extract_keywords_empty() {
        assert!(extract_keywords("a an of").is_empty());
        assert!(extract_keywords("").is_empty());
    }
}

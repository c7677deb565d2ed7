//! Engine configuration.

use delve_core::defaults::{MAX_CONTENT_CHARS, MAX_ITERATIONS, MAX_SEARCH_RESULTS};

/// Tunable bounds of the research loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Iteration bound. The loop admits one more pass than this value:
    /// the check runs before the increment, so `max_iterations = 3` allows
    /// up to four search/analysis rounds.
    pub max_iterations: usize,
    /// Search results consumed per query.
    pub max_search_results: usize,
    /// Characters of page content kept per result.
    pub max_content_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            max_search_results: MAX_SEARCH_RESULTS,
            max_content_chars: MAX_CONTENT_CHARS,
        }
    }
}

impl EngineConfig {
    /// Reads `DELVE_MAX_ITERATIONS`, `DELVE_MAX_SEARCH_RESULTS` and
    /// `DELVE_MAX_CONTENT_CHARS`, falling back to defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |name: &str, fallback: usize| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        Self {
            max_iterations: parse("DELVE_MAX_ITERATIONS", defaults.max_iterations),
            max_search_results: parse("DELVE_MAX_SEARCH_RESULTS", defaults.max_search_results),
            max_content_chars: parse("DELVE_MAX_CONTENT_CHARS", defaults.max_content_chars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, MAX_ITERATIONS);
        assert_eq!(config.max_search_results, MAX_SEARCH_RESULTS);
        assert_eq!(config.max_content_chars, MAX_CONTENT_CHARS);
    }
}

//! Structured-output shapes the pipeline stages request from models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Planning stage output: the initial set of search queries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchPlan {
    /// Search queries covering distinct aspects of the topic.
    pub queries: Vec<String>,
}

impl ResearchPlan {
    /// Generic queries used when the planning model cannot produce a plan.
    pub fn fallback(topic: &str) -> Self {
        Self {
            queries: vec![
                format!("{topic} best practices"),
                format!("{topic} guidelines"),
                format!("{topic} examples"),
            ],
        }
    }
}

/// Extraction stage output for one search result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentExtraction {
    /// Key learnings relevant to the research topic.
    pub summary: String,
}

/// Analysis stage output: the sufficiency verdict for the findings so far.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisVerdict {
    /// Whether the accumulated findings answer the topic adequately.
    pub sufficient: bool,
    /// Aspects of the topic still uncovered.
    pub gaps: Vec<String>,
    /// Follow-up search queries targeting the gaps.
    pub queries: Vec<String>,
}

impl AnalysisVerdict {
    /// Verdict used when the analysis model fails outright: never
    /// sufficient, with a generic follow-up query.
    pub fn fallback() -> Self {
        Self {
            sufficient: false,
            gaps: vec!["Unable to analyze content".to_string()],
            queries: vec!["Please try a different search query".to_string()],
        }
    }
}

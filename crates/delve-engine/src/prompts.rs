//! Prompt construction for the pipeline stages.

use delve_core::{Finding, RagRetrievalResult, VisualizationKind, VisualizationOptions};

pub fn planning_system() -> &'static str {
    "You are a research planner. You design small sets of web search queries \
     that together cover a topic from complementary angles."
}

pub fn planning_prompt(topic: &str, clarifications: &[String], rag: &RagRetrievalResult) -> String {
    let mut prompt = format!(
        "Plan web research for the topic: \"{topic}\".\n\
         Produce 3 search queries that cover distinct aspects of the topic."
    );
    if !clarifications.is_empty() {
        prompt.push_str("\n\nThe user added these clarifications:\n");
        for c in clarifications {
            prompt.push_str(&format!("- {c}\n"));
        }
    }
    if !rag.documents.is_empty() {
        prompt.push_str("\n\nExisting knowledge already covers:\n");
        for doc in &rag.documents {
            let preview: String = doc.content.chars().take(300).collect();
            prompt.push_str(&format!("- {preview}\n"));
        }
        prompt.push_str("Prefer queries that fill gaps in this knowledge.");
    }
    prompt
}

pub fn extraction_system() -> &'static str {
    "You are a research assistant. You extract the facts from a web page \
     that matter for a given research topic, discarding everything else."
}

pub fn extraction_prompt(topic: &str, title: &str, url: &str, content: &str) -> String {
    format!(
        "Research topic: \"{topic}\"\n\
         Source: {title} ({url})\n\n\
         Page content:\n{content}\n\n\
         Summarize the learnings from this page that are relevant to the topic. \
         Be specific; keep facts, numbers, and names."
    )
}

pub fn analysis_system() -> &'static str {
    "You are a research lead. You judge whether collected findings answer a \
     topic adequately and, if not, what to search for next."
}

pub fn analysis_prompt(topic: &str, findings: &[Finding], iteration: usize) -> String {
    let mut prompt = format!(
        "Research topic: \"{topic}\" (analysis round {iteration})\n\nFindings so far:\n"
    );
    if findings.is_empty() {
        prompt.push_str("(none)\n");
    }
    for finding in findings {
        prompt.push_str(&format!("- [{}] {}\n", finding.source, finding.summary));
    }
    prompt.push_str(
        "\nDecide whether these findings are sufficient for a thorough report. \
         If not, name the gaps and give follow-up search queries targeting them.",
    );
    prompt
}

pub fn report_system() -> &'static str {
    "You are a research writer. You turn collected findings into a clear, \
     well-structured markdown report with sections and cited sources."
}

pub fn report_prompt(
    topic: &str,
    clarifications: &[String],
    findings: &[Finding],
    visualization: Option<&VisualizationOptions>,
) -> String {
    let mut prompt = format!("Write a research report on: \"{topic}\".\n");
    if !clarifications.is_empty() {
        prompt.push_str("\nUser clarifications:\n");
        for c in clarifications {
            prompt.push_str(&format!("- {c}\n"));
        }
    }
    prompt.push_str("\nFindings:\n");
    for finding in findings {
        prompt.push_str(&format!("- [{}] {}\n", finding.source, finding.summary));
    }
    if let Some(viz) = visualization.filter(|v| v.enabled) {
        prompt.push_str(&format!("\n{}\n", visualization_instruction(viz.kind)));
    }
    prompt.push_str(
        "\nStructure the report in markdown with an introduction, thematic \
         sections, and a sources list. Cite the source next to each claim.",
    );
    prompt
}

fn visualization_instruction(kind: VisualizationKind) -> String {
    let formats = match kind {
        VisualizationKind::Mermaid => "Mermaid diagrams",
        VisualizationKind::ChartJs => "Chart.js chart definitions in fenced json blocks",
        VisualizationKind::D3 => "D3-ready data tables in fenced json blocks",
        VisualizationKind::All => {
            "Mermaid diagrams, Chart.js chart definitions, or D3-ready data tables"
        }
    };
    format!(
        "Where the findings contain comparable or structured data, include \
         {formats} that visualize it."
    )
}

//! Per-provider, per-task model selection.

use delve_core::{ModelProvider, TaskKind};

/// Google model used for every task.
pub const GOOGLE_MODEL: &str = "gemini-1.5-flash";

/// OpenAI workhorse model.
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI model reserved for report generation.
pub const OPENAI_REPORT_MODEL: &str = "gpt-4o";

/// Groq model used for every task.
pub const GROQ_MODEL: &str = "llama3-70b-8192";

/// Resolves the hybrid pseudo-provider to a concrete backend family.
///
/// Hybrid sessions split work by task: extraction and analysis go to
/// OpenAI, everything else to Google. Non-hybrid providers resolve to
/// themselves.
pub fn resolve_family(provider: ModelProvider, task: TaskKind) -> ModelProvider {
    match provider {
        ModelProvider::Hybrid => match task {
            TaskKind::Extraction | TaskKind::Analysis => ModelProvider::OpenAi,
            TaskKind::Planning | TaskKind::Report | TaskKind::ImageAnalysis => {
                ModelProvider::Google
            }
        },
        other => other,
    }
}

/// Model identifier for a concrete provider family and task.
pub fn model_for(family: ModelProvider, task: TaskKind) -> &'static str {
    match resolve_family(family, task) {
        ModelProvider::Google => GOOGLE_MODEL,
        ModelProvider::OpenAi => match task {
            TaskKind::Report => OPENAI_REPORT_MODEL,
            _ => OPENAI_MODEL,
        },
        ModelProvider::Groq => GROQ_MODEL,
        // resolve_family never returns Hybrid
        ModelProvider::Hybrid => GOOGLE_MODEL,
    }
}

/// Replaces a model id that cannot run on the resolved family.
///
/// A `gpt-*` id handed to the Google backend would fail outright; the
/// Google model for the same task is substituted instead.
pub fn substitute_wrong_family(family: ModelProvider, task: TaskKind, model: &str) -> String {
    if family == ModelProvider::Google && model.starts_with("gpt-") {
        return model_for(ModelProvider::Google, task).to_string();
    }
    model.to_string()
}

//! Scripted chat backend for router tests.

use std::sync::Mutex;

use async_trait::async_trait;

use delve_core::{ChatBackend, Completion, Error, Result};

/// Replays a fixed script of responses and records every call.
pub struct ScriptedBackend {
    script: Mutex<Vec<Result<Completion>>>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub json_output: bool,
}

impl ScriptedBackend {
    /// `script` is consumed front to back; a drained script fails the call.
    pub fn new(script: Vec<Result<Completion>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(text: &str, tokens: u64) -> Result<Completion> {
        Ok(Completion {
            text: text.to_string(),
            total_tokens: tokens,
        })
    }

    pub fn err(message: &str) -> Result<Completion> {
        Err(Error::Inference(message.to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn generate(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        json_output: bool,
    ) -> Result<Completion> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            system: system.map(String::from),
            prompt: prompt.to_string(),
            json_output,
        });

        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(Error::Internal("scripted backend exhausted".into()));
        }
        script.remove(0)
    }
}

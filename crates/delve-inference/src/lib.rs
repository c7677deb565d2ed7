//! # delve-inference
//!
//! Multi-provider model invocation layer for the Delve research engine.
//!
//! This crate provides:
//! - Per-provider, per-task model selection with hybrid routing
//! - OpenAI-compatible chat/embedding backend (OpenAI, Groq)
//! - Google Generative Language chat/embedding backend
//! - Google Cloud Vision image annotation
//! - [`ModelRouter`]: retry with linear backoff, wrong-family model
//!   substitution, schema-validated structured output, and the image
//!   analysis path with its per-image fallback

pub mod google;
pub mod openai;
pub mod registry;
pub mod router;
pub mod vision;

pub use google::{GoogleBackend, GoogleConfig};
pub use openai::{OpenAiCompatBackend, OpenAiConfig};
pub use registry::{model_for, resolve_family};
pub use router::{ModelRouter, RetryConfig};
pub use vision::{GoogleVisionClient, VisionConfig};

#[cfg(test)]
mod mock;

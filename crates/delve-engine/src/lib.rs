//! # delve-engine
//!
//! Research loop controller and pipeline stages for the Delve research
//! engine.
//!
//! A session starts from a topic (plus optional clarifications, images, and
//! provider choices), runs planning, then iterates search, extraction, and
//! analysis until the analysis verdict reports sufficiency or the iteration
//! bound is hit, and finishes with report generation. Progress streams to
//! the caller as activities over the session channel; the final report is
//! both returned and emitted as an event.

pub mod config;
pub mod controller;
pub mod deps;
pub mod prompts;
pub mod schemas;
pub mod search;

pub use config::EngineConfig;
pub use controller::run_research;
pub use deps::ResearchDeps;
pub use search::{ExaSearchClient, ExaSearchConfig};

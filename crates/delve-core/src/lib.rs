//! # delve-core
//!
//! Core types, traits, and abstractions for the Delve research engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other delve crates depend on: the session state, the activity/event
//! stream, the error type, and the backend traits implemented by the
//! inference, storage, and cache layers.

pub mod activity;
pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use activity::{
    Activity, ActivityStatus, ActivityTracker, ActivityType, EventSink, ResearchEvent,
};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

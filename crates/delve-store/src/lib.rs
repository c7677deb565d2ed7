//! # delve-store
//!
//! PostgreSQL + pgvector knowledge store for the Delve research engine.
//!
//! This crate provides:
//! - Connection pool management
//! - The `documents` table with lazy, idempotent schema setup
//! - Cosine similarity search with pgvector
//! - Case-insensitive keyword search for stores without embeddings

pub mod pool;
pub mod store;

pub use pool::{connect, PoolConfig};
pub use store::PgVectorStore;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

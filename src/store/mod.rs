//! Durable store (spec.md §6 "Durable store", SPEC_FULL.md §6.1).
//!
//! One SQLite file backs the guardian's six tables plus the bridge tables
//! the research/tester shards need for atom and learning-pattern
//! persistence, grounded in the teacher's `shared_knowledge::database` and
//! `vector_store::SqliteVectorStore`.

pub mod schema;
pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

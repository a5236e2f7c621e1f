//! Shared knowledge types and algorithms used by the research shard
//! (spec.md §3, §4.1).

pub mod atom;
pub mod batching;
pub mod coverage;
pub mod learning;
pub mod quality;

pub use atom::{ConceptTag, KnowledgeAtom, ResearchResult};
pub use batching::{adaptive_batch_size, BatchingHistory, INTER_BATCH_SLEEP};
pub use coverage::{analyze_topic, analyze_topics, CoverageDecision, CoverageReport};
pub use learning::Autopoiesis;
pub use quality::score_atom;

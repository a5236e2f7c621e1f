//! `KnowledgeAtom` and `ResearchResult` (spec.md §3).
//!
//! DESIGN DECISION: immutable struct with a validating constructor, following
//! the teacher's `Pattern` (`pattern.rs`) — private invariants enforced once
//! at construction rather than scattered `assert!`s at every call site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Concept tag for a `KnowledgeAtom` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptTag {
    Overview,
    CodeExample,
    DocumentationSection,
    BestPractice,
    AntiPattern,
    KeyConcept,
    Pattern,
    Dependency,
    ProjectIdentity,
    Architecture,
    LlmsOptimized,
    WorkspaceReference,
    MetaFallback,
    Placeholder,
}

impl ConceptTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ConceptTag::Overview => "overview",
            ConceptTag::CodeExample => "code_example",
            ConceptTag::DocumentationSection => "documentation_section",
            ConceptTag::BestPractice => "best_practice",
            ConceptTag::AntiPattern => "anti_pattern",
            ConceptTag::KeyConcept => "key_concept",
            ConceptTag::Pattern => "pattern",
            ConceptTag::Dependency => "dependency",
            ConceptTag::ProjectIdentity => "project_identity",
            ConceptTag::Architecture => "architecture",
            ConceptTag::LlmsOptimized => "llms_optimized",
            ConceptTag::WorkspaceReference => "workspace_reference",
            ConceptTag::MetaFallback => "meta_fallback",
            ConceptTag::Placeholder => "placeholder",
        }
    }
}

/// An immutable record produced by the research shard (spec.md §3).
///
/// Invariant: `concept = LlmsOptimized` implies `confidence >= 0.9`;
/// `concept = MetaFallback | Placeholder` implies `confidence <= 0.5`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeAtom {
    id: Uuid,
    source: String,
    title: String,
    body: String,
    concept: ConceptTag,
    code_snippet: Option<String>,
    anti_pattern_snippet: Option<String>,
    confidence: f64,
    metadata: serde_json::Value,
    extracted_at: DateTime<Utc>,
}

impl KnowledgeAtom {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        concept: ConceptTag,
        code_snippet: Option<String>,
        anti_pattern_snippet: Option<String>,
        confidence: f64,
        metadata: serde_json::Value,
        extracted_at: DateTime<Utc>,
    ) -> Result<Self> {
        let confidence = confidence.clamp(0.0, 1.0);
        match concept {
            ConceptTag::LlmsOptimized if confidence < 0.9 => {
                return Err(Error::Internal(format!(
                    "llms_optimized atom must have confidence >= 0.9, got {confidence}"
                )));
            }
            ConceptTag::MetaFallback | ConceptTag::Placeholder if confidence > 0.5 => {
                return Err(Error::Internal(format!(
                    "{} atom must have confidence <= 0.5, got {confidence}",
                    concept.as_str()
                )));
            }
            _ => {}
        }
        Ok(Self {
            id: Uuid::new_v4(),
            source: source.into(),
            title: title.into(),
            body: body.into(),
            concept,
            code_snippet,
            anti_pattern_snippet,
            confidence,
            metadata,
            extracted_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn concept(&self) -> ConceptTag {
        self.concept
    }

    pub fn code_snippet(&self) -> Option<&str> {
        self.code_snippet.as_deref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    pub fn is_github_source(&self) -> bool {
        self.source.contains("github.com")
    }

    /// Free-form domain-concept tags used only by the coverage analyzer
    /// (`knowledge::coverage`), read from `metadata.topic_concepts`.
    ///
    /// DESIGN DECISION: kept distinct from the closed `ConceptTag` content-type
    /// tag. spec.md §8's coverage scenarios describe atoms tagged with
    /// domain vocabulary (`"goroutine"`, `"bubbletea"`, `"lipgloss"`) that
    /// does not belong to the 14-member `ConceptTag` set, so coverage
    /// matching reads a separate metadata array rather than overloading
    /// `concept`.
    pub fn topic_concepts(&self) -> Vec<String> {
        self.metadata
            .get("topic_concepts")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Outcome of one research `Execute` call (spec.md §3).
///
/// Invariant (steady state): `atoms.len() >= facts_emitted / 4` (facts
/// include non-atom bookkeeping, so the ratio is not exact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub session_id: Uuid,
    pub query: String,
    pub keywords: Vec<String>,
    pub atoms: Vec<KnowledgeAtom>,
    pub summary: String,
    pub sources_consulted: usize,
    pub duration: std::time::Duration,
    pub facts_emitted: usize,
}

impl ResearchResult {
    pub fn empty(query: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            query: query.into(),
            keywords,
            atoms: Vec::new(),
            summary: String::new(),
            sources_consulted: 0,
            duration: std::time::Duration::default(),
            facts_emitted: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llms_optimized_below_threshold_is_rejected() {
        let result = KnowledgeAtom::new(
            "https://github.com/foo/bar",
            "Title",
            "Body",
            ConceptTag::LlmsOptimized,
            None,
            None,
            0.5,
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn placeholder_above_threshold_is_rejected() {
        let result = KnowledgeAtom::new(
            "internal://fallback",
            "Title",
            "Body",
            ConceptTag::Placeholder,
            None,
            None,
            0.9,
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn valid_atom_round_trips_through_json() {
        let atom = KnowledgeAtom::new(
            "https://github.com/foo/bar",
            "Title",
            "Body text here",
            ConceptTag::Overview,
            None,
            None,
            0.8,
            serde_json::json!({"lang": "rust"}),
            Utc::now(),
        )
        .unwrap();
        assert!(atom.is_github_source());
        let json = serde_json::to_string(&atom).unwrap();
        let back: KnowledgeAtom = serde_json::from_str(&json).unwrap();
        assert_eq!(atom, back);
    }
}

//! Prompt-atom generation (spec.md §4.1 "Prompt-atom generation").
//!
//! DESIGN DECISION: "methodology concept" maps onto `ConceptTag::Pattern` —
//! the three other fragment-eligible concepts (code example, anti-pattern,
//! best practice) are each named explicitly in spec.md, leaving `Pattern`
//! as the one remaining content-type tag for general methodology atoms.

use crate::facts::{Fact, Kernel, Value};
use crate::error::Result;
use crate::knowledge::atom::{ConceptTag, KnowledgeAtom};

#[derive(Debug, Clone, PartialEq)]
pub struct PromptFragment {
    pub atom_source: String,
    pub content: String,
    pub priority: u32,
    pub mandatory: bool,
    pub target_shards: Vec<String>,
}

const SHARD_KEYWORDS: &[(&str, &[&str])] = &[
    ("tester", &["test"]),
    ("reviewer", &["review", "quality", "security"]),
    ("coder", &["code", "implement", "function", "class"]),
    ("researcher", &["research", "documentation"]),
];

fn infer_target_shards(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut shards: Vec<String> = SHARD_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(shard, _)| shard.to_string())
        .collect();

    if shards.is_empty() {
        shards = vec!["coder".to_string(), "tester".to_string(), "reviewer".to_string()];
    }
    shards
}

fn fragment_for(atom: &KnowledgeAtom) -> Option<PromptFragment> {
    let (priority, mandatory) = match atom.concept() {
        ConceptTag::Pattern => (65, false),
        ConceptTag::CodeExample => (60, atom.confidence() >= 0.9),
        ConceptTag::AntiPattern => (70, true),
        ConceptTag::BestPractice => (68, true),
        _ => return None,
    };

    Some(PromptFragment {
        atom_source: atom.source().to_string(),
        content: atom.body().to_string(),
        priority,
        mandatory,
        target_shards: infer_target_shards(atom.body()),
    })
}

/// Derive secondary prompt fragments from a successful research result.
pub fn generate_prompt_fragments(atoms: &[KnowledgeAtom]) -> Vec<PromptFragment> {
    atoms.iter().filter_map(fragment_for).collect()
}

const FRAGMENT_PREDICATE: &str = "prompt_fragment";
const FRAGMENT_METADATA_PREDICATE: &str = "prompt_fragment_metadata";

/// Persist each fragment as a JSON-serialized fact plus a metadata fact.
pub async fn persist_fragments(kernel: &dyn Kernel, fragments: &[PromptFragment]) -> Result<()> {
    for fragment in fragments {
        let payload = serde_json::to_string(&serde_json::json!({
            "content": fragment.content,
            "priority": fragment.priority,
            "mandatory": fragment.mandatory,
            "target_shards": fragment.target_shards,
        }))?;
        kernel
            .assert(Fact::new(FRAGMENT_PREDICATE, vec![Value::from(payload)]))
            .await?;
        kernel
            .assert(Fact::new(
                FRAGMENT_METADATA_PREDICATE,
                vec![Value::from(fragment.atom_source.clone()), Value::from(fragment.priority as i64)],
            ))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    fn atom(concept: ConceptTag, body: &str, confidence: f64) -> KnowledgeAtom {
        KnowledgeAtom::new("internal://x", "Title", body, concept, None, None, confidence, serde_json::json!({}), Utc::now()).unwrap()
    }

    #[test]
    fn anti_pattern_fragments_are_always_mandatory() {
        let atoms = vec![atom(ConceptTag::AntiPattern, "avoid this bug", 0.3)];
        let fragments = generate_prompt_fragments(&atoms);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].mandatory);
        assert_eq!(fragments[0].priority, 70);
    }

    #[test]
    fn code_example_is_mandatory_only_above_confidence_threshold() {
        let low = atom(ConceptTag::CodeExample, "fn foo() {}", 0.5);
        let high = atom(ConceptTag::CodeExample, "fn foo() {}", 0.95);
        let fragments = generate_prompt_fragments(&[low, high]);
        assert!(!fragments[0].mandatory);
        assert!(fragments[1].mandatory);
    }

    #[test]
    fn shard_inference_falls_back_to_default_trio() {
        let atoms = vec![atom(ConceptTag::Pattern, "a pattern about nothing obvious", 0.6)];
        let fragments = generate_prompt_fragments(&atoms);
        assert_eq!(fragments[0].target_shards, vec!["coder", "tester", "reviewer"]);
    }

    #[test]
    fn shard_inference_matches_keywords() {
        let atoms = vec![atom(ConceptTag::BestPractice, "always write a test for this function", 0.8)];
        let fragments = generate_prompt_fragments(&atoms);
        assert!(fragments[0].target_shards.contains(&"tester".to_string()));
        assert!(fragments[0].target_shards.contains(&"coder".to_string()));
    }

    #[derive(Default)]
    struct RecordingKernel {
        facts: Mutex<Vec<Fact>>,
    }

    #[async_trait]
    impl Kernel for RecordingKernel {
        async fn assert(&self, fact: Fact) -> Result<()> {
            self.facts.lock().unwrap().push(fact);
            Ok(())
        }
        async fn query(&self, _predicate: &str) -> Result<Vec<Fact>> {
            Ok(Vec::new())
        }
        async fn load_facts(&self, _facts: Vec<Fact>) -> Result<()> {
            Ok(())
        }
        async fn load_policy_file(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_writes_a_fact_and_a_metadata_fact_per_fragment() {
        let atoms = vec![atom(ConceptTag::AntiPattern, "watch out", 0.5)];
        let fragments = generate_prompt_fragments(&atoms);
        let kernel = RecordingKernel::default();
        persist_fragments(&kernel, &fragments).await.unwrap();
        assert_eq!(kernel.facts.lock().unwrap().len(), 2);
    }
}

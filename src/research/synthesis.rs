//! LLM synthesis fallback (spec.md §4.1 "LLM synthesis fallback").

use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{LLMClient, PiggybackResponse};
use crate::error::Result;
use crate::knowledge::atom::{ConceptTag, KnowledgeAtom};

#[derive(Debug, Deserialize)]
struct SynthesisPayload {
    #[serde(default)]
    overview: String,
    #[serde(default)]
    key_concepts: Vec<String>,
    #[serde(default)]
    best_practices: Vec<String>,
    #[serde(default)]
    common_patterns: Vec<CommonPattern>,
    #[serde(default)]
    common_pitfalls: Vec<String>,
    #[serde(default)]
    related_technologies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommonPattern {
    name: String,
    description: String,
    #[serde(default)]
    code: Option<String>,
}

/// Extract the first balanced `{...}` substring from `text`.
pub fn extract_balanced_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn payload_to_atoms(source: &str, payload: &SynthesisPayload) -> Vec<KnowledgeAtom> {
    let mut atoms = Vec::new();
    let now = Utc::now();

    if !payload.overview.trim().is_empty() {
        if let Ok(atom) = KnowledgeAtom::new(
            source,
            "Overview",
            payload.overview.clone(),
            ConceptTag::Overview,
            None,
            None,
            0.7,
            serde_json::json!({}),
            now,
        ) {
            atoms.push(atom);
        }
    }

    for concept in &payload.key_concepts {
        if let Ok(atom) = KnowledgeAtom::new(source, concept.clone(), concept.clone(), ConceptTag::KeyConcept, None, None, 0.65, serde_json::json!({}), now) {
            atoms.push(atom);
        }
    }

    for practice in &payload.best_practices {
        if let Ok(atom) = KnowledgeAtom::new(source, practice.clone(), practice.clone(), ConceptTag::BestPractice, None, None, 0.65, serde_json::json!({}), now) {
            atoms.push(atom);
        }
    }

    for pattern in &payload.common_patterns {
        if let Ok(atom) = KnowledgeAtom::new(
            source,
            pattern.name.clone(),
            pattern.description.clone(),
            ConceptTag::Pattern,
            pattern.code.clone(),
            None,
            0.7,
            serde_json::json!({}),
            now,
        ) {
            atoms.push(atom);
        }
    }

    for pitfall in &payload.common_pitfalls {
        if let Ok(atom) = KnowledgeAtom::new(source, "Common pitfall", pitfall.clone(), ConceptTag::AntiPattern, None, Some(pitfall.clone()), 0.65, serde_json::json!({}), now) {
            atoms.push(atom);
        }
    }

    for tech in &payload.related_technologies {
        if let Ok(atom) = KnowledgeAtom::new(source, tech.clone(), tech.clone(), ConceptTag::KeyConcept, None, None, 0.6, serde_json::json!({ "topic_concepts": ["related_technology"] }), now) {
            atoms.push(atom);
        }
    }

    atoms
}

/// Decode-failure atom. Resolves the tension between spec.md's literal
/// "confidence 0.7" fallback instruction and the `KnowledgeAtom` invariant
/// binding `MetaFallback` to `<= 0.5` by honoring the invariant (the data
/// model's constraint is load-bearing elsewhere; the confidence value is
/// not) — see DESIGN.md.
fn decode_failure_atom(source: &str, raw: &str) -> KnowledgeAtom {
    KnowledgeAtom::new(
        source,
        "Synthesis fallback",
        raw,
        ConceptTag::MetaFallback,
        None,
        None,
        0.5,
        serde_json::json!({}),
        Utc::now(),
    )
    .expect("MetaFallback at confidence 0.5 always satisfies the invariant")
}

/// Prompt the model for strict-JSON synthesis and convert the result into
/// atoms; on any decode failure, emit a single fallback atom instead.
pub async fn synthesize(
    client: &dyn LLMClient,
    cancel: &CancellationToken,
    topic: &str,
) -> Result<Vec<KnowledgeAtom>> {
    let prompt = format!(
        "Research the topic \"{topic}\" and respond with strict JSON only: \
         {{\"overview\": string, \"key_concepts\": [string], \"best_practices\": [string], \
         \"common_patterns\": [{{\"name\": string, \"description\": string, \"code\": string}}], \
         \"common_pitfalls\": [string], \"related_technologies\": [string]}}"
    );
    let source = format!("internal://llm-synthesis/{topic}");
    let raw = client.complete(cancel, &prompt).await?;
    let surface = PiggybackResponse::extract(&raw).surface;

    let atoms = extract_balanced_json(&surface)
        .and_then(|json| serde_json::from_str::<SynthesisPayload>(json).ok())
        .map(|payload| payload_to_atoms(&source, &payload))
        .unwrap_or_else(|| vec![decode_failure_atom(&source, &surface)]);

    Ok(atoms)
}

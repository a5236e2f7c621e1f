//! Coverage-aware research (spec.md §4.1 "Coverage-aware research").
//!
//! DESIGN DECISION: atoms carry a free-form `topic_concepts` metadata array
//! (see `atom::KnowledgeAtom::topic_concepts`) rather than reusing the closed
//! `ConceptTag`; the scenarios in spec.md §8 tag atoms with domain
//! vocabulary (`goroutine`, `bubbletea`) that the content-type enum does not
//! model, so "concept match" here means a concept-tag string overlap, not a
//! `ConceptTag` equality check.

use std::collections::HashSet;

use super::atom::KnowledgeAtom;

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageDecision {
    pub topic: String,
    pub relevant_count: usize,
    pub unique_concepts: usize,
    pub score: f64,
    pub should_skip: bool,
    pub missing_keywords: Vec<String>,
    pub targeted_query: Option<String>,
}

fn topic_keywords(topic: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    topic
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_relevant(atom: &KnowledgeAtom, topic_lower: &str, keywords: &[String]) -> bool {
    let concept_match = atom
        .topic_concepts()
        .iter()
        .any(|c| topic_lower.contains(&c.to_lowercase()));
    let title_match = atom.title().to_lowercase().contains(topic_lower);

    let body_lower = atom.body().to_lowercase();
    let overlap = keywords.iter().filter(|k| body_lower.contains(k.as_str())).count();
    let half_overlap = !keywords.is_empty() && overlap * 2 >= keywords.len();

    concept_match || title_match || half_overlap
}

/// Decide whether `topic` already has sufficient stored coverage.
pub fn analyze_topic(topic: &str, atoms: &[KnowledgeAtom]) -> CoverageDecision {
    let topic_lower = topic.to_lowercase();
    let keywords = topic_keywords(topic);

    let relevant: Vec<&KnowledgeAtom> = atoms
        .iter()
        .filter(|atom| is_relevant(atom, &topic_lower, &keywords))
        .collect();

    let mut concept_set: HashSet<String> = HashSet::new();
    for atom in &relevant {
        concept_set.extend(atom.topic_concepts());
    }
    let unique_concepts = concept_set.len();

    let body_union_lower: String = relevant
        .iter()
        .map(|a| a.body().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let covered: Vec<&String> = keywords
        .iter()
        .filter(|k| body_union_lower.contains(k.as_str()))
        .collect();
    let covered_fraction = if keywords.is_empty() {
        1.0
    } else {
        covered.len() as f64 / keywords.len() as f64
    };

    let relevant_count = relevant.len();
    let score = 0.4 * (relevant_count as f64 / 20.0).min(1.0)
        + 0.3 * (unique_concepts as f64 / 10.0).min(1.0)
        + 0.3 * covered_fraction;

    let should_skip =
        score >= 0.7 || (relevant_count >= 20 && score >= 0.5) || (unique_concepts >= 5 && score >= 0.5);

    let missing_keywords: Vec<String> = keywords
        .into_iter()
        .filter(|k| !covered.contains(&k))
        .collect();

    let targeted_query = if should_skip {
        None
    } else {
        let gaps: Vec<&String> = missing_keywords.iter().take(3).collect();
        Some(if gaps.is_empty() {
            topic.to_string()
        } else {
            format!(
                "{topic} {}",
                gaps.iter().map(|g| g.as_str()).collect::<Vec<_>>().join(" ")
            )
        })
    };

    CoverageDecision {
        topic: topic.to_string(),
        relevant_count,
        unique_concepts,
        score,
        should_skip,
        missing_keywords,
        targeted_query,
    }
}

pub struct CoverageReport {
    pub skipped: Vec<CoverageDecision>,
    pub researched: Vec<CoverageDecision>,
}

pub fn analyze_topics(topics: &[String], atoms: &[KnowledgeAtom]) -> CoverageReport {
    let mut skipped = Vec::new();
    let mut researched = Vec::new();
    for topic in topics {
        let decision = analyze_topic(topic, atoms);
        if decision.should_skip {
            skipped.push(decision);
        } else {
            researched.push(decision);
        }
    }
    CoverageReport { skipped, researched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::atom::ConceptTag;
    use chrono::Utc;

    fn atom_with_concepts(body: &str, concepts: &[&str]) -> KnowledgeAtom {
        KnowledgeAtom::new(
            "internal://seed",
            "Go Concurrency Guide",
            body,
            ConceptTag::Overview,
            None,
            None,
            0.9,
            serde_json::json!({ "topic_concepts": concepts }),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn coverage_skip_scenario() {
        let atoms: Vec<KnowledgeAtom> = (0..25)
            .map(|_| atom_with_concepts("Go concurrency basics and goroutines explained.", &["goroutine"]))
            .collect();

        let decision = analyze_topic("go concurrency", &atoms);
        assert!(decision.should_skip, "expected skip, got score {}", decision.score);
    }

    #[test]
    fn coverage_miss_scenario() {
        let atoms: Vec<KnowledgeAtom> = (0..25)
            .map(|_| atom_with_concepts("Bubbletea TUI framework basics.", &["bubbletea"]))
            .collect();

        let report = analyze_topics(
            &["bubbletea".to_string(), "lipgloss".to_string()],
            &atoms,
        );
        assert!(report.skipped.iter().any(|d| d.topic == "bubbletea"));
        assert!(report.researched.iter().any(|d| d.topic == "lipgloss"));
        let lipgloss = report.researched.iter().find(|d| d.topic == "lipgloss").unwrap();
        assert!(lipgloss.targeted_query.is_some());
    }

    #[test]
    fn empty_topic_list_yields_empty_report() {
        let report = analyze_topics(&[], &[]);
        assert!(report.skipped.is_empty());
        assert!(report.researched.is_empty());
    }
}

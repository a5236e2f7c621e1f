//! Observation relevance scoring (spec.md §4.3 "Relevance scoring for
//! observations", §9 Open Question (3): 3-char token guard kept as-is).

use crate::guardian::triggers::matches_high_impact;
use crate::guardian::vision::Vision;

/// File-path relevance: 0.5 by default, 0.9 if the path matches any
/// high-impact pattern.
pub fn file_relevance(path: &str, high_impact_globs: &[String]) -> f64 {
    if matches_high_impact(high_impact_globs, &[path.to_string()]) {
        0.9
    } else {
        0.5
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .collect()
}

/// Naive token-overlap ratio against the vision's mission + problem +
/// vision-statement, skipping tokens ≤3 chars. Default 0.5 with no vision.
pub fn content_relevance(content: &str, vision: Option<&Vision>) -> f64 {
    let Some(vision) = vision else {
        return 0.5;
    };
    let corpus = format!("{} {} {}", vision.mission, vision.problem, vision.vision_statement);
    let corpus_tokens: std::collections::HashSet<String> = tokenize(&corpus).into_iter().collect();
    if corpus_tokens.is_empty() {
        return 0.5;
    }

    let content_tokens = tokenize(content);
    if content_tokens.is_empty() {
        return 0.0;
    }

    let overlap = content_tokens.iter().filter(|t| corpus_tokens.contains(*t)).count();
    overlap as f64 / content_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn file_relevance_bumps_for_high_impact_paths() {
        let globs = vec!["migrations/*".to_string()];
        assert_eq!(file_relevance("migrations/0001.sql", &globs), 0.9);
        assert_eq!(file_relevance("src/lib.rs", &globs), 0.5);
    }

    #[test]
    fn content_relevance_defaults_to_half_without_a_vision() {
        assert_eq!(content_relevance("anything at all", None), 0.5);
    }

    #[test]
    fn content_relevance_measures_token_overlap_against_vision() {
        let vision = Vision::new(
            "Build a reliable payments gateway".to_string(),
            "Merchants need dependable settlement".to_string(),
            "A gateway merchants trust".to_string(),
            Utc::now(),
        );
        let relevance = content_relevance("reworked the payments settlement retry logic", Some(&vision));
        assert!(relevance > 0.0);
    }

    #[test]
    fn short_tokens_are_skipped_from_the_overlap_computation() {
        let vision = Vision::new("payments gateway".to_string(), String::new(), String::new(), Utc::now());
        // "to" and "it" are ≤3 chars and contribute nothing to the overlap
        // ratio; only "gateway" counts toward both numerator and denominator.
        let relevance = content_relevance("to fix it gateway", Some(&vision));
        assert_eq!(relevance, 1.0);
    }
}

//! Task string grammar (spec.md §4.1 "Task string grammar", §8 scenarios 1-2).
//!
//! `topic:<words…> keywords:<k1,k2;…> <url>` — every component optional;
//! bare strings are the topic. The parser is side-effect free.

use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub topic: String,
    pub keywords: Vec<String>,
    pub urls: Vec<String>,
}

const CODEBASE_MARKERS: &[&str] = &[
    "init",
    "initialize",
    "codebase",
    "project",
    "analyze",
    "scan",
    "index",
    "inventory",
    "workspace",
    "structure",
    "directory",
    "directories",
    "folder",
    "folders",
];

fn url_regex() -> Regex {
    Regex::new(r"https?://\S+").expect("static URL regex is valid")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_trailing_punctuation(url: &str) -> String {
    url.trim_end_matches(|c: char| ".,;:!?)]}\"'".contains(c)).to_string()
}

/// Parse a task string into topic, keywords, and extracted URLs.
pub fn parse_task(task: &str) -> ParsedTask {
    let url_re = url_regex();
    let mut urls = Vec::new();
    let mut without_urls = task.to_string();

    for m in url_re.find_iter(task) {
        let cleaned = strip_trailing_punctuation(m.as_str());
        urls.push(cleaned);
    }
    without_urls = url_re.replace_all(&without_urls, " ").to_string();

    let lower = without_urls.to_lowercase();
    let keywords_marker = lower.find("keywords:");

    let (topic_region, keyword_region) = match keywords_marker {
        Some(idx) => (without_urls[..idx].to_string(), Some(without_urls[idx + "keywords:".len()..].to_string())),
        None => (without_urls.clone(), None),
    };

    let topic_lower = topic_region.to_lowercase();
    let topic = if let Some(idx) = topic_lower.find("topic:") {
        collapse_whitespace(&topic_region[idx + "topic:".len()..])
    } else {
        collapse_whitespace(&topic_region)
    };

    let keywords = match keyword_region {
        Some(raw) => raw
            .split(|c| c == ',' || c == ';')
            .map(|k| collapse_whitespace(k))
            .filter(|k| !k.is_empty())
            .collect(),
        None => topic
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    };

    ParsedTask { topic, keywords, urls }
}

/// True if the task should be routed to codebase analysis instead of web
/// research (spec.md §4.1 "Codebase-mode dispatch").
pub fn is_codebase_mode(task: &str) -> bool {
    let lower = task.to_lowercase();
    CODEBASE_MARKERS
        .iter()
        .any(|marker| lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == *marker))
}

/// True if `(deep)` appears in the topic (spec.md §4.1 "Extended deep search").
pub fn is_deep_mode(task: &str) -> bool {
    task.to_lowercase().contains("(deep)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_topic_and_keywords() {
        let parsed = parse_task("topic:vector search ranking keywords:semantic search, recall, precision");
        assert_eq!(parsed.topic, "vector search ranking");
        assert_eq!(
            parsed.keywords,
            vec!["semantic search".to_string(), "recall".to_string(), "precision".to_string()]
        );
        assert!(parsed.urls.is_empty());
    }

    #[test]
    fn scenario_2_url_extraction() {
        let parsed = parse_task("research openai embeddings https://example.com/docs keywords:embeddings, openai");
        assert_eq!(parsed.topic, "research openai embeddings");
        assert_eq!(parsed.keywords, vec!["embeddings".to_string(), "openai".to_string()]);
        assert_eq!(parsed.urls, vec!["https://example.com/docs".to_string()]);
    }

    #[test]
    fn bare_string_becomes_topic_and_default_keywords() {
        let parsed = parse_task("Rust Async Runtimes");
        assert_eq!(parsed.topic, "Rust Async Runtimes");
        assert_eq!(
            parsed.keywords,
            vec!["rust".to_string(), "async".to_string(), "runtimes".to_string()]
        );
    }

    #[test]
    fn trailing_punctuation_is_stripped_from_urls() {
        let parsed = parse_task("see https://example.com/docs/page.");
        assert_eq!(parsed.urls, vec!["https://example.com/docs/page".to_string()]);
    }

    #[test]
    fn codebase_markers_trigger_codebase_mode() {
        assert!(is_codebase_mode("scan the workspace"));
        assert!(is_codebase_mode("initialize project"));
        assert!(!is_codebase_mode("research openai embeddings"));
    }

    #[test]
    fn deep_marker_is_case_insensitive() {
        assert!(is_deep_mode("rust async runtimes (DEEP)"));
        assert!(!is_deep_mode("rust async runtimes"));
    }

    #[test]
    fn parser_is_side_effect_free_and_deterministic() {
        let input = "topic:foo bar keywords:a,b https://x.test";
        let first = parse_task(input);
        let second = parse_task(input);
        assert_eq!(first, second);
    }
}

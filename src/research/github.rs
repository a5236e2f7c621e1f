//! GitHub ingestion: `llms.txt` and README extraction (spec.md §4.1
//! "GitHub ingestion").

use chrono::Utc;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{HttpFetcher, LLMClient, PiggybackResponse};
use crate::error::Result;
use crate::knowledge::atom::{ConceptTag, KnowledgeAtom};
use crate::knowledge::quality::score_atom;

const SKIPPED_HEADINGS: &[&str] = &["license", "contributing", "changelog", "badges"];

/// `owner/repo` extracted from a GitHub URL, or `None` if it doesn't look
/// like one.
pub fn repo_slug(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let after_host = trimmed.split("github.com/").nth(1)?;
    let mut parts = after_host.split('/');
    let owner = parts.next()?;
    let repo = parts.next()?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

fn llms_txt_candidate_urls(slug: &str) -> Vec<String> {
    vec![
        format!("https://raw.githubusercontent.com/{slug}/main/llms.txt"),
        format!("https://raw.githubusercontent.com/{slug}/master/llms.txt"),
        format!("https://raw.githubusercontent.com/{slug}/main/.llms.txt"),
        format!("https://raw.githubusercontent.com/{slug}/master/.llms.txt"),
    ]
}

fn readme_candidate_urls(slug: &str) -> Vec<String> {
    vec![
        format!("https://raw.githubusercontent.com/{slug}/main/README.md"),
        format!("https://raw.githubusercontent.com/{slug}/master/README.md"),
    ]
}

/// Fetch the first `llms.txt` variant that exists and ingest each
/// non-comment line as a `llms_optimized` atom (confidence 0.95).
pub async fn ingest_llms_txt(
    fetcher: &dyn HttpFetcher,
    cancel: &CancellationToken,
    slug: &str,
    max_bytes: usize,
) -> Vec<KnowledgeAtom> {
    for url in llms_txt_candidate_urls(slug) {
        if let Ok(body) = fetcher.fetch_text(cancel, &url, max_bytes).await {
            let atoms: Vec<KnowledgeAtom> = body
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .filter_map(|line| {
                    KnowledgeAtom::new(
                        url.clone(),
                        line,
                        line,
                        ConceptTag::LlmsOptimized,
                        None,
                        None,
                        0.95,
                        serde_json::json!({ "topic_concepts": ["llms_optimized"] }),
                        Utc::now(),
                    )
                    .ok()
                })
                .collect();
            if !atoms.is_empty() {
                return atoms;
            }
        }
    }
    Vec::new()
}

fn fenced_code_blocks(markdown: &str) -> Vec<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z0-9]*\n(.*?)```").expect("static fence regex is valid");
    re.captures_iter(markdown)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|block| block.len() >= 20 && block.len() <= 2000)
        .take(5)
        .collect()
}

fn heading_sections(markdown: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_body = String::new();

    for line in markdown.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if let Some(prev) = current_title.take() {
                sections.push((prev, std::mem::take(&mut current_body)));
            }
            current_title = Some(title.trim().to_string());
        } else if current_title.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(prev) = current_title {
        sections.push((prev, current_body));
    }

    sections
        .into_iter()
        .filter(|(title, _)| {
            let lower = title.to_lowercase();
            !SKIPPED_HEADINGS.iter().any(|skip| lower.contains(skip))
        })
        .collect()
}

/// Fetch `README.md`, split into sections, and produce `documentation_section`
/// and `code_example` atoms, optionally enriched via the model, filtered to
/// quality >= 0.5.
pub async fn ingest_readme(
    fetcher: &dyn HttpFetcher,
    llm: Option<&dyn LLMClient>,
    cancel: &CancellationToken,
    slug: &str,
    max_bytes: usize,
) -> Result<Vec<KnowledgeAtom>> {
    let mut body = None;
    let mut source_url = String::new();
    for url in readme_candidate_urls(slug) {
        if let Ok(text) = fetcher.fetch_text(cancel, &url, max_bytes).await {
            source_url = url;
            body = Some(text);
            break;
        }
    }
    let Some(markdown) = body else {
        return Ok(Vec::new());
    };

    let mut atoms = Vec::new();

    for (title, section_body) in heading_sections(&markdown) {
        let mut text = section_body.trim().to_string();
        if text.is_empty() {
            continue;
        }
        if let Some(client) = llm {
            if text.len() > 100 {
                text = enrich(client, cancel, &text).await.unwrap_or(text);
            }
        }
        let quality = score_atom(&title, &text, None, &source_url);
        if quality < 0.5 {
            continue;
        }
        if let Ok(atom) = KnowledgeAtom::new(
            source_url.clone(),
            title,
            text,
            ConceptTag::DocumentationSection,
            None,
            None,
            quality,
            serde_json::json!({}),
            Utc::now(),
        ) {
            atoms.push(atom);
        }
    }

    for code in fenced_code_blocks(&markdown) {
        let quality = score_atom("Code example", &code, Some(&code), &source_url);
        if quality < 0.5 {
            continue;
        }
        if let Ok(atom) = KnowledgeAtom::new(
            source_url.clone(),
            "Code example",
            code.clone(),
            ConceptTag::CodeExample,
            Some(code),
            None,
            quality,
            serde_json::json!({}),
            Utc::now(),
        ) {
            atoms.push(atom);
        }
    }

    Ok(atoms)
}

async fn enrich(client: &dyn LLMClient, cancel: &CancellationToken, original: &str) -> Result<String> {
    let prompt = format!("Summarize this in 1-2 sentences:\n\n{original}");
    let raw = client.complete(cancel, &prompt).await?;
    Ok(PiggybackResponse::extract(&raw).surface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_owner_repo_slug() {
        assert_eq!(repo_slug("https://github.com/tokio-rs/tokio"), Some("tokio-rs/tokio".to_string()));
        assert_eq!(repo_slug("https://github.com/tokio-rs/tokio/"), Some("tokio-rs/tokio".to_string()));
        assert_eq!(repo_slug("https://example.com/not/github"), None);
    }

    #[test]
    fn heading_sections_skip_license_and_changelog() {
        let markdown = "## Overview\nThis is great.\n\n## License\nMIT.\n\n## Usage\nDo the thing with enough words to pass quality.\n";
        let sections = heading_sections(markdown);
        let titles: Vec<&str> = sections.iter().map(|(t, _)| t.as_str()).collect();
        assert!(titles.contains(&"Overview"));
        assert!(titles.contains(&"Usage"));
        assert!(!titles.contains(&"License"));
    }

    #[test]
    fn fenced_code_blocks_respect_size_bounds() {
        let markdown = "```rust\nfn main() { println!(\"hi\"); }\n```\n\n```text\nx\n```\n";
        let blocks = fenced_code_blocks(markdown);
        assert_eq!(blocks.len(), 1);
    }

    struct FakeFetcher {
        body: String,
    }

    #[async_trait::async_trait]
    impl HttpFetcher for FakeFetcher {
        async fn fetch_text(&self, _cancel: &CancellationToken, _url: &str, _max_bytes: usize) -> Result<String> {
            Ok(self.body.clone())
        }
    }

    #[tokio::test]
    async fn ingest_llms_txt_parses_non_comment_lines() {
        let fetcher = FakeFetcher {
            body: "# a comment\nhttps://example.com/docs\nguides/setup.md\n".to_string(),
        };
        let cancel = CancellationToken::new();
        let atoms = ingest_llms_txt(&fetcher, &cancel, "foo/bar", 1_000_000).await;
        assert_eq!(atoms.len(), 2);
        assert!(atoms.iter().all(|a| a.confidence() >= 0.9));
    }

    #[tokio::test]
    async fn ingest_readme_extracts_sections_and_code() {
        let fetcher = FakeFetcher {
            body: "## Overview\nThis project does a great many useful things for developers everywhere.\n\n```rust\nfn main() { println!(\"hello world\"); }\n```\n".to_string(),
        };
        let cancel = CancellationToken::new();
        let atoms = ingest_readme(&fetcher, None, &cancel, "foo/bar", 1_000_000).await.unwrap();
        assert!(atoms.iter().any(|a| a.concept() == ConceptTag::DocumentationSection));
        assert!(atoms.iter().any(|a| a.concept() == ConceptTag::CodeExample));
    }
}

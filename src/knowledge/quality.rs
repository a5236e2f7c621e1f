//! Atom-level quality formula (spec.md §4.1.1 "Quality formula").
//!
//! DESIGN DECISION: a single free function over `(title, body, code_snippet,
//! source)` rather than a scoring struct with a builder, unlike
//! `confidence.rs`'s `ConfidenceBreakdown` — this formula has no per-call
//! configurable weights, so a builder would add indirection without buying
//! anything.

const LOW_QUALITY_MARKERS: &[&str] = &[
    "captcha",
    "robot",
    "verify you are human",
    "access denied",
    "403 forbidden",
    "404 not found",
    "please enable javascript",
    "cloudflare",
];

/// Score a candidate atom's quality in `[0, 1]`.
pub fn score_atom(title: &str, body: &str, code_snippet: Option<&str>, source: &str) -> f64 {
    let mut score: f64 = 0.5;

    if body.len() > 50 {
        score += 0.1;
    }
    if body.len() > 200 {
        score += 0.1;
    }
    if let Some(code) = code_snippet {
        if code.len() > 20 {
            score += 0.15;
        }
    }
    if title.len() > 5 {
        score += 0.05;
    }
    if source.contains("github.com") {
        score += 0.05;
    }
    if body.len() < 20 {
        score -= 0.3;
    }

    let lowered = body.to_lowercase();
    if LOW_QUALITY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        score -= 0.5;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_short_atom_scores_low() {
        let score = score_atom("Hi", "short", None, "internal://x");
        assert!(score < 0.5);
    }

    #[test]
    fn rich_github_atom_with_code_scores_high() {
        let body = "a".repeat(250);
        let score = score_atom(
            "A useful title",
            &body,
            Some("fn main() { println!(\"hi\"); }"),
            "https://github.com/foo/bar",
        );
        assert!(score > 0.9);
    }

    #[test]
    fn blocked_page_markers_tank_the_score() {
        let score = score_atom(
            "Access Denied",
            "Please enable javascript and complete the captcha to continue. 403 forbidden.",
            None,
            "https://example.com",
        );
        assert!(score < 0.3);
    }

    #[test]
    fn score_is_always_clamped() {
        let body = "a".repeat(1000);
        let score = score_atom(
            "long title here",
            &body,
            Some(&"x".repeat(100)),
            "https://github.com/a/b",
        );
        assert!((0.0..=1.0).contains(&score));
    }
}

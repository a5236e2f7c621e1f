//! Alignment scoring rubric (spec.md §4.3 "Scoring rubric", "Check
//! execution").

use crate::collaborators::LLMClient;
use crate::config::loader::GuardianConfig;
use crate::error::Result;
use crate::guardian::vision::{CheckResult, Vision};

/// Decision function: score ≥ warning → passed; ≥ failure → warning;
/// ≥ block → failed; else blocked. The score is authoritative even when the
/// model names a different result (spec.md §4.3).
pub fn decide(score: f64, config: &GuardianConfig) -> CheckResult {
    if score >= config.warning_threshold {
        CheckResult::Passed
    } else if score >= config.failure_threshold {
        CheckResult::Warning
    } else if score >= config.block_threshold {
        CheckResult::Failed
    } else {
        CheckResult::Blocked
    }
}

fn persona_lines(vision: &Vision) -> String {
    vision
        .personas
        .iter()
        .map(|p| format!("{} (needs: {})", p.name, p.needs.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn capability_lines(vision: &Vision) -> String {
    vision
        .capabilities
        .iter()
        .map(|c| format!("{} (priority {}, {})", c.name, c.priority, c.timeline))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Build the system prompt: mission, problem, vision, personas (names +
/// needs), capabilities (priority/timeline), and constraints.
pub fn system_prompt(vision: &Vision) -> String {
    format!(
        "You are the alignment guardian for a software project.\n\
         Mission: {}\n\
         Problem: {}\n\
         Vision: {}\n\
         Personas: {}\n\
         Capabilities: {}\n\
         Constraints: {}\n\
         Respond with exactly four labeled lines:\n\
         SCORE: <0..1>\nRESULT: <passed|warning|failed|blocked>\nEXPLANATION: <one sentence>\nSUGGESTIONS: <comma-separated or \"none\">",
        vision.mission,
        vision.problem,
        vision.vision_statement,
        persona_lines(vision),
        capability_lines(vision),
        vision.constraints.join(", "),
    )
}

pub fn user_prompt(subject: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("Subject: {subject}\nContext: {context}"),
        None => format!("Subject: {subject}"),
    }
}

/// The four fields parsed out of a model response, with spec.md §4.3's
/// defaults (`score 0.7`, `result warning`) applied on parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub score: f64,
    pub result: Option<CheckResult>,
    pub explanation: String,
    pub suggestions: Vec<String>,
}

impl Default for ParsedResponse {
    fn default() -> Self {
        Self {
            score: 0.7,
            result: Some(CheckResult::Warning),
            explanation: "could not parse model response".to_string(),
            suggestions: Vec::new(),
        }
    }
}

fn parse_result(value: &str) -> Option<CheckResult> {
    match value.trim().to_lowercase().as_str() {
        "passed" => Some(CheckResult::Passed),
        "warning" => Some(CheckResult::Warning),
        "failed" => Some(CheckResult::Failed),
        "blocked" => Some(CheckResult::Blocked),
        "skipped" => Some(CheckResult::Skipped),
        _ => None,
    }
}

/// Parse the model's four labeled lines. Defaults apply per-field, so a
/// response missing only `SUGGESTIONS:` still yields a parsed score/result.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let mut any_field_found = false;

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SCORE:") {
            if let Ok(score) = rest.trim().parse::<f64>() {
                parsed.score = score.clamp(0.0, 1.0);
                any_field_found = true;
            }
        } else if let Some(rest) = line.strip_prefix("RESULT:") {
            parsed.result = parse_result(rest);
            any_field_found = true;
        } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
            parsed.explanation = rest.trim().to_string();
            any_field_found = true;
        } else if let Some(rest) = line.strip_prefix("SUGGESTIONS:") {
            let rest = rest.trim();
            parsed.suggestions = if rest.is_empty() || rest.eq_ignore_ascii_case("none") {
                Vec::new()
            } else {
                rest.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
            };
            any_field_found = true;
        }
    }

    if !any_field_found {
        return ParsedResponse::default();
    }
    parsed
}

/// Run a single alignment check against the model, parse its response, and
/// apply the threshold function. Returns `(score, result, explanation,
/// suggestions)`.
pub async fn run_check(
    llm: &dyn LLMClient,
    cancel: &tokio_util::sync::CancellationToken,
    vision: &Vision,
    subject: &str,
    context: Option<&str>,
    config: &GuardianConfig,
) -> Result<(f64, CheckResult, String, Vec<String>)> {
    let system = system_prompt(vision);
    let user = user_prompt(subject, context);
    let raw = llm.complete_with_system(cancel, &system, &user).await?;
    let surface = crate::collaborators::PiggybackResponse::extract(&raw).surface;
    let parsed = parse_response(&surface);
    let result = decide(parsed.score, config);
    Ok((parsed.score, result, parsed.explanation, parsed.suggestions))
}

/// Exponential moving average update: `0.8·old + 0.2·new` (spec.md §4.3).
pub fn update_moving_average(old: f64, new_score: f64) -> f64 {
    0.8 * old + 0.2 * new_score
}

//! Tester task string grammar (spec.md §4.2 "Contract").
//!
//! `<action> key:value… <target words…>` — the action token is optional
//! (defaults to `run_tests`); `key:value` pairs are consumed wherever they
//! appear, everything else joins the bare target string. Total function,
//! never panics on malformed input.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TesterAction {
    RunTests,
    GenerateTests,
    Coverage,
    Tdd,
    RegenerateMocks,
    DetectStaleMocks,
}

const ACTION_TOKENS: &[(&str, TesterAction)] = &[
    ("run_tests", TesterAction::RunTests),
    ("test", TesterAction::RunTests),
    ("run", TesterAction::RunTests),
    ("generate_tests", TesterAction::GenerateTests),
    ("generate", TesterAction::GenerateTests),
    ("gen", TesterAction::GenerateTests),
    ("coverage", TesterAction::Coverage),
    ("cov", TesterAction::Coverage),
    ("tdd", TesterAction::Tdd),
    ("tdd_loop", TesterAction::Tdd),
    ("repair", TesterAction::Tdd),
    ("regenerate_mocks", TesterAction::RegenerateMocks),
    ("regen_mocks", TesterAction::RegenerateMocks),
    ("update_mocks", TesterAction::RegenerateMocks),
    ("detect_stale_mocks", TesterAction::DetectStaleMocks),
    ("check_mocks", TesterAction::DetectStaleMocks),
    ("stale_mocks", TesterAction::DetectStaleMocks),
];

const PARAM_KEYS: &[(&str, &str)] = &[
    ("file", "file"),
    ("function", "function"),
    ("func", "function"),
    ("package", "package"),
    ("pkg", "package"),
    ("in", "in"),
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTesterTask {
    pub action: Option<TesterAction>,
    pub target: String,
    pub file: Option<String>,
    pub function: Option<String>,
    pub package: Option<String>,
    pub in_dir: Option<String>,
}

impl ParsedTesterTask {
    pub fn action_or_default(&self) -> TesterAction {
        self.action.unwrap_or(TesterAction::RunTests)
    }
}

fn action_for(word: &str) -> Option<TesterAction> {
    ACTION_TOKENS
        .iter()
        .find(|(token, _)| *token == word)
        .map(|(_, action)| *action)
}

/// Parse a tester task string. Total function — malformed input just means
/// an empty target and the default action.
pub fn parse_tester_task(task: &str) -> ParsedTesterTask {
    let mut words = task.split_whitespace().peekable();
    let mut parsed = ParsedTesterTask::default();

    if let Some(first) = words.peek() {
        if let Some(action) = action_for(&first.to_lowercase()) {
            parsed.action = Some(action);
            words.next();
        }
    }

    let mut target_words = Vec::new();
    for word in words {
        if let Some((key, value)) = word.split_once(':') {
            if let Some((_, canonical)) = PARAM_KEYS.iter().find(|(k, _)| *k == key.to_lowercase()) {
                if !value.is_empty() {
                    match *canonical {
                        "file" => parsed.file = Some(value.to_string()),
                        "function" => parsed.function = Some(value.to_string()),
                        "package" => parsed.package = Some(value.to_string()),
                        "in" => parsed.in_dir = Some(value.to_string()),
                        _ => {}
                    }
                    continue;
                }
            }
        }
        target_words.push(word);
    }

    parsed.target = target_words.join(" ");
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_action_is_run_tests() {
        let parsed = parse_tester_task("src/lib.rs");
        assert_eq!(parsed.action, None);
        assert_eq!(parsed.action_or_default(), TesterAction::RunTests);
        assert_eq!(parsed.target, "src/lib.rs");
    }

    #[test]
    fn action_aliases_resolve() {
        assert_eq!(parse_tester_task("gen foo").action, Some(TesterAction::GenerateTests));
        assert_eq!(parse_tester_task("tdd_loop foo").action, Some(TesterAction::Tdd));
        assert_eq!(parse_tester_task("stale_mocks foo").action, Some(TesterAction::DetectStaleMocks));
    }

    #[test]
    fn keyword_params_are_extracted_and_excluded_from_target() {
        let parsed = parse_tester_task("run file:src/main.go function:Handler package:main in:./cmd");
        assert_eq!(parsed.action, Some(TesterAction::RunTests));
        assert_eq!(parsed.file, Some("src/main.go".to_string()));
        assert_eq!(parsed.function, Some("Handler".to_string()));
        assert_eq!(parsed.package, Some("main".to_string()));
        assert_eq!(parsed.in_dir, Some("./cmd".to_string()));
        assert_eq!(parsed.target, "");
    }

    #[test]
    fn bare_words_join_into_target() {
        let parsed = parse_tester_task("coverage internal/auth package:auth");
        assert_eq!(parsed.action, Some(TesterAction::Coverage));
        assert_eq!(parsed.target, "internal/auth");
        assert_eq!(parsed.package, Some("auth".to_string()));
    }

    #[test]
    fn empty_input_never_panics() {
        let parsed = parse_tester_task("");
        assert_eq!(parsed.action, None);
        assert_eq!(parsed.target, "");
    }

    #[test]
    fn unknown_key_colon_pair_becomes_part_of_target() {
        let parsed = parse_tester_task("run timeout:30s");
        assert_eq!(parsed.target, "timeout:30s");
    }
}

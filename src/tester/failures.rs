//! Per-framework failure and coverage parsing (spec.md §4.2 "Failure
//! parsing", "Coverage extraction"). Pytest has its own dedicated state
//! machine in `tester::pytest` — this module covers every other framework
//! with small, framework-specific regexes.

use regex::Regex;

use crate::tester::framework::Framework;

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTest {
    pub name: String,
    pub file: Option<String>,
    pub message: String,
}

/// A framework-agnostic location+message record (spec.md SPEC_FULL
/// supplemental note on `TestResult.diagnostics`).
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub severity: String,
    pub message: String,
}

fn gotest_failures(output: &str) -> Vec<FailedTest> {
    let name_re = Regex::new(r"^--- FAIL: (\S+)").expect("static regex");
    let loc_re = Regex::new(r"^\s*(\S+\.go):(\d+): (.+)$").expect("static regex");

    let mut failures = Vec::new();
    let mut current: Option<(String, Option<String>, Vec<String>)> = None;

    for line in output.lines() {
        if let Some(caps) = name_re.captures(line) {
            if let Some((name, file, messages)) = current.take() {
                failures.push(FailedTest { name, file, message: messages.join("; ") });
            }
            current = Some((caps[1].to_string(), None, Vec::new()));
            continue;
        }
        if let Some((_, file, messages)) = current.as_mut() {
            if let Some(caps) = loc_re.captures(line) {
                *file = Some(caps[1].to_string());
                messages.push(caps[3].to_string());
            }
        }
    }
    if let Some((name, file, messages)) = current {
        failures.push(FailedTest { name, file, message: messages.join("; ") });
    }
    failures
}

fn jest_failures(output: &str) -> Vec<FailedTest> {
    let re = Regex::new(r"✕\s+(.+)$").expect("static regex");
    output
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| FailedTest { name: caps[1].trim().to_string(), file: None, message: caps[1].trim().to_string() })
        .collect()
}

fn cargo_failures(output: &str) -> Vec<FailedTest> {
    let re = Regex::new(r"^test (\S+) \.\.\. FAILED").expect("static regex");
    output
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| FailedTest { name: caps[1].to_string(), file: None, message: "assertion failed".to_string() })
        .collect()
}

/// Parse failures for every framework except pytest, which has its own
/// dedicated parser in `tester::pytest`.
pub fn parse_failures(framework: Framework, output: &str) -> Vec<FailedTest> {
    match framework {
        Framework::GoTest => gotest_failures(output),
        Framework::Jest => jest_failures(output),
        Framework::Cargo => cargo_failures(output),
        // Junit/XUnit/RSpec/PhpUnit: no dedicated regex grounded for these
        // frameworks in the source material; a non-zero exit is still
        // reported as a fatal error by the caller, so an empty list here
        // does not hide the failure.
        _ => Vec::new(),
    }
}

/// Extract an overall coverage percentage, if present.
pub fn parse_coverage(framework: Framework, output: &str) -> Option<f64> {
    let re = match framework {
        Framework::GoTest => Regex::new(r"coverage:\s+([\d.]+)%").ok()?,
        Framework::Jest => Regex::new(r"All files\s*\|\s*([\d.]+)").ok()?,
        Framework::Pytest => Regex::new(r"TOTAL\s+\d+\s+\d+\s+([\d.]+)%").ok()?,
        _ => return None,
    };
    re.captures(output).and_then(|caps| caps[1].parse::<f64>().ok())
}

pub fn is_fail_signal(output: &str) -> bool {
    output.contains("FAIL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gotest_extracts_name_file_and_message() {
        let output = "--- FAIL: TestFoo (0.00s)\n    main_test.go:12: expected 1, got 2\nFAIL\n";
        let failures = gotest_failures(output);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "TestFoo");
        assert_eq!(failures[0].file.as_deref(), Some("main_test.go"));
        assert!(failures[0].message.contains("expected 1"));
    }

    #[test]
    fn jest_extracts_failing_case_names() {
        let output = "  ✕ renders without crashing (5 ms)\n  ✓ handles click\n";
        let failures = jest_failures(output);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "renders without crashing (5 ms)");
    }

    #[test]
    fn cargo_extracts_test_path() {
        let output = "test tests::it_fails ... FAILED\ntest tests::it_passes ... ok\n";
        let failures = cargo_failures(output);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "tests::it_fails");
    }

    #[test]
    fn coverage_percentages_are_extracted_per_framework() {
        assert_eq!(parse_coverage(Framework::GoTest, "coverage: 87.5% of statements"), Some(87.5));
        assert_eq!(parse_coverage(Framework::Jest, "All files | 72.1 |"), Some(72.1));
        assert_eq!(parse_coverage(Framework::Pytest, "TOTAL 120 30 75%"), Some(75.0));
    }

    #[test]
    fn fail_signal_detects_fail_text() {
        assert!(is_fail_signal("--- FAIL: TestFoo"));
        assert!(!is_fail_signal("ok  	example	0.002s"));
    }
}

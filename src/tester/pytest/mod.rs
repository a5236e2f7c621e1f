//! Deterministic pytest output parser (spec.md §4.2.1).
//!
//! A state machine over lines; states `idle|header|collecting|failures|
//! test_block|traceback|assertion_line|short_summary|results`. Pure
//! function over its input (spec.md §8 testable properties).

pub mod types;

use regex::Regex;

use types::{is_test_file, ParserState, PytestFailure, TracebackFrame};

struct Patterns {
    section_header: Regex,
    test_block_header: Regex,
    file_frame: Regex,
    summary_frame: Regex,
    short_summary: Regex,
    assert_expr: Regex,
    where_clause: Regex,
    error_type_msg: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            section_header: Regex::new(r"^=+\s*(.+?)\s*=+$").expect("static regex"),
            test_block_header: Regex::new(r"^_+\s*(.+?)\s*_+$").expect("static regex"),
            file_frame: Regex::new(r#"^File "(.+)", line (\d+), in (\S+)$"#).expect("static regex"),
            summary_frame: Regex::new(r"^(\S+\.py):(\d+):\s*(\w[\w.]*)$").expect("static regex"),
            short_summary: Regex::new(r"^FAILED\s+(\S+)::(\S+?)(?:\s+-\s+(\w[\w.]*):\s*(.*))?$").expect("static regex"),
            assert_expr: Regex::new(r"^assert\s+(.+?)\s*(==|!=|in\s|is\s|<=|>=|<|>)\s*(.+)$").expect("static regex"),
            where_clause: Regex::new(r"^where\s+(.+?)\s*=\s*(.+)$").expect("static regex"),
            error_type_msg: Regex::new(r"^(\w[\w.]*):\s*(.*)$").expect("static regex"),
        }
    }
}

fn split_dotted(name: &str) -> (Option<String>, String) {
    match name.rsplit_once("::").or_else(|| name.rsplit_once('.')) {
        Some((class, method)) => (Some(class.to_string()), method.to_string()),
        None => (None, name.to_string()),
    }
}

fn finalize(pending: &mut Option<PytestFailure>, failures: &mut Vec<PytestFailure>) {
    if let Some(mut failure) = pending.take() {
        failure.root_cause_frame = failure.traceback.iter().rev().find(|f| !f.is_test_file).cloned();
        failures.push(failure);
    }
}

/// Parse a pytest run's combined output into the failures it reports. Total
/// function over its input — malformed or unrecognized lines are skipped.
pub fn parse(output: &str) -> Vec<PytestFailure> {
    let patterns = Patterns::new();
    let lines: Vec<&str> = output.lines().collect();
    let mut state = ParserState::Idle;
    let mut failures: Vec<PytestFailure> = Vec::new();
    let mut pending: Option<PytestFailure> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = patterns.section_header.captures(line) {
            let name = caps[1].to_lowercase();
            if name.contains("failures") || name.contains("errors") {
                state = ParserState::Failures;
            } else if name.contains("short test summary") {
                finalize(&mut pending, &mut failures);
                state = ParserState::ShortSummary;
            } else if name.contains("passed") || name.contains("failed") || name.contains("error") {
                finalize(&mut pending, &mut failures);
                state = ParserState::Results;
            }
            i += 1;
            continue;
        }

        match state {
            ParserState::Failures | ParserState::TestBlock | ParserState::Traceback | ParserState::AssertionLine => {
                if let Some(caps) = patterns.test_block_header.captures(line) {
                    finalize(&mut pending, &mut failures);
                    let (class, method) = split_dotted(caps[1].trim());
                    pending = Some(PytestFailure { test_class: class, test_method: method, ..Default::default() });
                    state = ParserState::TestBlock;
                    i += 1;
                    continue;
                }

                let mut advanced = false;
                if let Some(failure) = pending.as_mut() {
                    if let Some(caps) = patterns.file_frame.captures(line.trim()) {
                        let path = caps[1].to_string();
                        let ln = caps[2].parse().unwrap_or(0);
                        let func = caps[3].to_string();
                        let code_line = lines.get(i + 1).and_then(|next| {
                            let trimmed = next.trim_start();
                            if trimmed.starts_with("E ") || trimmed.starts_with('>') || trimmed.is_empty() {
                                None
                            } else {
                                Some(next.trim().to_string())
                            }
                        });
                        if failure.test_file.is_empty() {
                            failure.test_file = path.clone();
                        }
                        failure.traceback.push(TracebackFrame {
                            file_path: path.clone(),
                            line: ln,
                            function: Some(func),
                            code_line,
                            is_test_file: is_test_file(&path),
                        });
                        state = ParserState::Traceback;
                        advanced = true;
                    } else if let Some(rest) = line.trim_start().strip_prefix("> ") {
                        failure.assertion_line = Some(rest.to_string());
                        state = ParserState::AssertionLine;
                        advanced = true;
                    } else if let Some(rest) = line.trim_start().strip_prefix("E ") {
                        let rest = rest.trim();
                        if let Some(caps) = patterns.where_clause.captures(rest) {
                            failure.variables.push((caps[1].to_string(), caps[2].to_string()));
                        } else if let Some(caps) = patterns.assert_expr.captures(rest) {
                            failure.error_type.get_or_insert_with(|| "AssertionError".to_string());
                            failure.error_message.get_or_insert_with(|| rest.to_string());
                            failure.variables.push((caps[1].trim().to_string(), caps[3].trim().to_string()));
                        } else if let Some(caps) = patterns.error_type_msg.captures(rest) {
                            failure.error_type = Some(caps[1].to_string());
                            failure.error_message = Some(caps[2].to_string());
                        } else {
                            failure.error_message.get_or_insert_with(|| rest.to_string());
                        }
                        advanced = true;
                    } else if let Some(caps) = patterns.summary_frame.captures(line.trim()) {
                        let path = caps[1].to_string();
                        let ln = caps[2].parse().unwrap_or(0);
                        let err = caps[3].to_string();
                        failure.error_type.get_or_insert_with(|| err);
                        failure.traceback.push(TracebackFrame {
                            file_path: path.clone(),
                            line: ln,
                            function: None,
                            code_line: None,
                            is_test_file: is_test_file(&path),
                        });
                        advanced = true;
                    }
                }
                if !advanced {
                    i += 1;
                    continue;
                }
                i += 1;
            }
            ParserState::ShortSummary => {
                if let Some(caps) = patterns.short_summary.captures(line.trim()) {
                    let path = caps[1].to_string();
                    let (class, method) = split_dotted(&caps[2]);
                    let error_type = caps.get(3).map(|m| m.as_str().to_string());
                    let error_message = caps.get(4).map(|m| m.as_str().to_string());

                    match failures.iter_mut().find(|f| f.test_file == path && f.test_method == method) {
                        Some(existing) => {
                            if error_type.is_some() {
                                existing.error_type = error_type;
                            }
                            if error_message.is_some() {
                                existing.error_message = error_message;
                            }
                            if existing.test_class.is_none() {
                                existing.test_class = class;
                            }
                        }
                        None => failures.push(PytestFailure {
                            test_file: path,
                            test_class: class,
                            test_method: method,
                            error_type,
                            error_message,
                            ..Default::default()
                        }),
                    }
                }
                i += 1;
            }
            ParserState::Idle | ParserState::Header | ParserState::Collecting | ParserState::Results => {
                i += 1;
            }
        }
    }

    finalize(&mut pending, &mut failures);
    failures
}

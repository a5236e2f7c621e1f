//! Pytest parser data model (spec.md §4.2.1).

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TracebackFrame {
    pub file_path: String,
    pub line: u32,
    pub function: Option<String>,
    pub code_line: Option<String>,
    pub is_test_file: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PytestFailure {
    pub test_file: String,
    pub test_class: Option<String>,
    pub test_method: String,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub assertion_line: Option<String>,
    pub variables: Vec<(String, String)>,
    pub traceback: Vec<TracebackFrame>,
    pub root_cause_frame: Option<TracebackFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ParserState {
    Idle,
    Header,
    Collecting,
    Failures,
    TestBlock,
    Traceback,
    AssertionLine,
    ShortSummary,
    Results,
}

/// A file is a "test file" if its basename matches `test_*`, `*_test.py`,
/// or `conftest.py`, or the path contains a `/tests/`, `/test/`, or
/// `/testing/` segment (spec.md §4.2.1 "Finalization").
pub fn is_test_file(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let by_name = basename.starts_with("test_") || basename.ends_with("_test.py") || basename == "conftest.py";
    let by_dir = ["/tests/", "/test/", "/testing/"].iter().any(|seg| path.contains(seg));
    by_name || by_dir
}

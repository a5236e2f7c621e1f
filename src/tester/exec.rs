//! Test execution (spec.md §4.2 "Execution"): prefer the virtual-action
//! router when bound, else run the framework CLI directly under a timeout,
//! capturing combined stdout+stderr.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::collaborators::{RouterOp, VirtualStore};
use crate::error::{Error, Result};
use crate::tester::failures::{is_fail_signal, parse_coverage, FailedTest};
use crate::tester::framework::{build_command, Framework, FrameworkCommand};
use crate::tester::pytest;

#[derive(Debug, Clone, PartialEq)]
pub struct TestRunResult {
    pub passed: bool,
    pub raw_output: String,
    pub failed_tests: Vec<FailedTest>,
    pub coverage_pct: Option<f64>,
}

/// Run the framework's CLI for `target` directly via `tokio::process`.
async fn run_direct(cancel: &CancellationToken, cmd: &FrameworkCommand, timeout: Duration) -> Result<(bool, String)> {
    let mut command = tokio::process::Command::new(&cmd.program);
    command.args(&cmd.args);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let child = command.spawn().map_err(|e| Error::Internal(format!("failed to spawn {}: {e}", cmd.program)))?;

    let wait = async move {
        let output = child.wait_with_output().await.map_err(|e| Error::Internal(e.to_string()))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok::<(bool, String), Error>((output.status.success(), combined))
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(timeout) => Err(Error::UpstreamTimeout(format!("{} timed out after {timeout:?}", cmd.program))),
        result = wait => result,
    }
}

/// Run tests through the router when one is bound, else fall back to a
/// direct process invocation.
pub async fn run_tests(
    cancel: &CancellationToken,
    router: Option<&dyn VirtualStore>,
    framework: Framework,
    target: Option<&str>,
    coverage: bool,
    timeout: Duration,
) -> Result<TestRunResult> {
    let cmd = build_command(framework, target, coverage);

    let (success, raw_output) = match router {
        Some(router) => {
            let op = if coverage { RouterOp::RunCoverage } else { RouterOp::RunTests };
            let mut args = vec![cmd.program.clone()];
            args.extend(cmd.args.clone());
            match router.route_action(cancel, op, args).await {
                Ok(output) => (!is_fail_signal(&output), output),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => return Err(err),
            }
        }
        None => run_direct(cancel, &cmd, timeout).await?,
    };

    if !success && !is_fail_signal(&raw_output) {
        return Err(Error::Internal(format!("test execution failed with no parseable failure output: {raw_output}")));
    }

    let failed_tests = if framework == Framework::Pytest {
        pytest::parse(&raw_output)
            .into_iter()
            .map(|f| crate::tester::failures::FailedTest {
                name: f.test_method,
                file: Some(f.test_file),
                message: f.error_message.unwrap_or_default(),
            })
            .collect()
    } else {
        crate::tester::failures::parse_failures(framework, &raw_output)
    };

    let coverage_pct = parse_coverage(framework, &raw_output);

    Ok(TestRunResult { passed: success, raw_output, failed_tests, coverage_pct })
}

/// Keywords that, when present in failed-test output, indicate the failure
/// is mock-related rather than a genuine logic defect (spec.md §4.2
/// "Mock-error reaction").
const MOCK_ERROR_KEYWORDS: &[&str] = &[
    "mock",
    "gomock",
    "mockgen",
    "unexpected call",
    "missing call",
    "wrong number of calls",
    "mock expectations",
    "stub",
    "spy",
    "double",
    "interface not implemented",
    "undefined: mock",
];

pub fn looks_mock_related(output: &str) -> bool {
    let lower = output.to_lowercase();
    MOCK_ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_error_detection_matches_any_keyword() {
        assert!(looks_mock_related("unexpected call to Foo()"));
        assert!(looks_mock_related("MockGen: interface not implemented"));
        assert!(!looks_mock_related("expected 1, got 2"));
    }
}

//! TDD repair loop (spec.md §4.2 "TDD repair loop"): bounded-retry state
//! machine `passing|failing|repairing|exhausted`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::collaborators::{LLMClient, VirtualStore};
use crate::error::{Error, Result};
use crate::tester::exec::{run_tests, TestRunResult};
use crate::tester::failures::Diagnostic;
use crate::tester::framework::Framework;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TddState {
    Passing,
    Failing,
    Repairing,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct TddOutcome {
    pub final_state: TddState,
    pub attempts: u32,
    pub last_result: Option<TestRunResult>,
    pub diagnostics: Vec<Diagnostic>,
}

fn repair_prompt(target: &str, last: &TestRunResult, attempt: u32) -> String {
    let failures = last
        .failed_tests
        .iter()
        .map(|f| format!("- {} ({}): {}", f.name, f.file.as_deref().unwrap_or("?"), f.message))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Repair attempt {attempt} for target `{target}`. The test suite is failing:\n{failures}\n\nRaw output tail:\n{}\n\nRespond with a unified diff patch that fixes the failures.",
        last.raw_output.chars().rev().take(2000).collect::<String>().chars().rev().collect::<String>()
    )
}

/// Run the bounded repair loop: execute tests, and while failing and
/// retries remain, ask the model for a patch, apply it via the router, and
/// retry. Emits one diagnostic per external (non-test-failure) error
/// encountered along the way rather than aborting the whole loop.
pub async fn run(
    cancel: &CancellationToken,
    router: &dyn VirtualStore,
    llm: &dyn LLMClient,
    framework: Framework,
    target: &str,
    max_retries: u32,
    test_timeout: Duration,
) -> Result<TddOutcome> {
    let mut attempt = 0;
    let mut diagnostics = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = match run_tests(cancel, Some(router), framework, Some(target), false, test_timeout).await {
            Ok(result) => result,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                diagnostics.push(Diagnostic {
                    file: None,
                    line: None,
                    column: None,
                    severity: "error".to_string(),
                    message: err.to_string(),
                });
                return Ok(TddOutcome { final_state: TddState::Exhausted, attempts: attempt, last_result: None, diagnostics });
            }
        };

        if result.passed {
            return Ok(TddOutcome { final_state: TddState::Passing, attempts: attempt, last_result: Some(result), diagnostics });
        }

        if attempt >= max_retries {
            return Ok(TddOutcome { final_state: TddState::Exhausted, attempts: attempt, last_result: Some(result), diagnostics });
        }

        attempt += 1;
        let prompt = repair_prompt(target, &result, attempt);
        match llm.complete(cancel, &prompt).await {
            Ok(raw) => {
                let surface = crate::collaborators::PiggybackResponse::extract(&raw).surface;
                if let Err(err) = router
                    .route_action(cancel, crate::collaborators::RouterOp::WriteFile, vec![target.to_string(), surface])
                    .await
                {
                    diagnostics.push(Diagnostic {
                        file: Some(target.to_string()),
                        line: None,
                        column: None,
                        severity: "error".to_string(),
                        message: format!("failed to apply repair patch: {err}"),
                    });
                }
            }
            Err(err) => {
                diagnostics.push(Diagnostic {
                    file: None,
                    line: None,
                    column: None,
                    severity: "error".to_string(),
                    message: format!("model call failed during repair: {err}"),
                });
            }
        }
    }
}

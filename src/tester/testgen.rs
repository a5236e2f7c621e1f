//! Test generation (spec.md §4.2 "Test generation"): read the target source
//! via the router, build a framework-scoped prompt enriched with "code-DOM"
//! facts, call the model with retry, extract the generated test file, write
//! it back, and assert facts.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{LLMClient, RouterOp, VirtualStore};
use crate::error::{Error, Result};
use crate::facts::{Fact, Kernel, Value};
use crate::retry::{default_is_retryable, BackoffPolicy};
use crate::tester::framework::Framework;

/// Test-file path derived from a source path, per framework naming
/// convention.
pub fn test_file_path(source_path: &str, framework: Framework) -> String {
    let path = std::path::Path::new(source_path);
    let dir = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();

    let file_name = match framework {
        Framework::GoTest => format!("{stem}_test.{ext}"),
        Framework::Jest => format!("{stem}.test.{ext}"),
        Framework::Pytest => format!("test_{stem}.{ext}"),
        Framework::Cargo => format!("{stem}_test.{ext}"),
        Framework::Junit => format!("{stem}Test.{ext}"),
        Framework::XUnit => format!("{stem}Tests.{ext}"),
        Framework::RSpec => format!("{stem}_spec.{ext}"),
        Framework::PhpUnit => format!("{stem}Test.{ext}"),
    };

    if dir.is_empty() {
        file_name
    } else {
        format!("{dir}/{file_name}")
    }
}

/// Strip a fenced code block's opening/closing backtick lines, and a bare
/// language tag line (first line, <20 chars, no space) if present.
pub fn extract_code_block(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fences = if let Some(inner) = trimmed.strip_prefix("```") {
        inner.trim_end().strip_suffix("```").unwrap_or(inner).to_string()
    } else {
        trimmed.to_string()
    };

    let mut lines = without_fences.lines();
    match lines.next() {
        Some(first) if first.len() < 20 && !first.contains(' ') && !first.trim().is_empty() => {
            lines.collect::<Vec<_>>().join("\n")
        }
        Some(first) => std::iter::once(first).chain(lines).collect::<Vec<_>>().join("\n"),
        None => String::new(),
    }
}

fn test_function_regex(framework: Framework) -> Regex {
    let pattern = match framework {
        Framework::GoTest => r"^func Test\w+\(",
        Framework::Jest => r"\b(it|test)\s*\(",
        Framework::Pytest => r"^def test_\w+\(",
        Framework::Cargo => r"#\[test\]",
        Framework::Junit => r"@Test",
        Framework::XUnit => r"\[Fact\]|\[Theory\]",
        Framework::RSpec => r"\bit\s*\(",
        Framework::PhpUnit => r"public function test\w+\(",
    };
    Regex::new(pattern).expect("static regex")
}

pub fn count_test_functions(framework: Framework, source: &str) -> usize {
    let re = test_function_regex(framework);
    source.lines().filter(|line| re.is_match(line)).count()
}

fn system_prompt(framework: Framework) -> String {
    format!(
        "You write idiomatic {} tests. Respond with a single fenced code block containing only the complete test file.",
        framework.name()
    )
}

fn code_dom_facts_summary(facts: &[Fact]) -> String {
    if facts.is_empty() {
        return "none".to_string();
    }
    facts
        .iter()
        .map(|f| format!("{}({})", f.predicate, f.args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn user_prompt(source_path: &str, source: &str, function_focus: Option<&str>, code_dom: &str) -> String {
    let focus = function_focus.map(|f| format!("Focus on the function `{f}`.")).unwrap_or_default();
    format!(
        "Generate tests for `{source_path}`.\n{focus}\nCode-DOM facts: {code_dom}\n\nSource:\n{source}"
    )
}

/// Read the target source, prompt the model (with exponential-backoff
/// retry), extract the generated test, write it through the router, and
/// assert `test_generated`/`file_topology` facts.
pub async fn generate(
    cancel: &CancellationToken,
    router: &dyn VirtualStore,
    llm: &dyn LLMClient,
    kernel: Option<&dyn Kernel>,
    framework: Framework,
    source_path: &str,
    function_focus: Option<&str>,
    retry: &BackoffPolicy,
) -> Result<String> {
    let source = router.route_action(cancel, RouterOp::ReadFile, vec![source_path.to_string()]).await?;

    let code_dom = match kernel {
        Some(kernel) => {
            let mut facts = Vec::new();
            for predicate in ["api_client", "api_handler", "external_caller", "requires_integration_test"] {
                facts.extend(kernel.query(predicate).await.unwrap_or_default());
            }
            code_dom_facts_summary(&facts)
        }
        None => "none".to_string(),
    };

    let system = system_prompt(framework);
    let user = user_prompt(source_path, &source, function_focus, &code_dom);

    let raw = retry
        .retry(cancel, default_is_retryable, || async { llm.complete_with_system(cancel, &system, &user).await })
        .await
        .map_err(|e| Error::ModelUnavailable(format!("LLM test generation failed after retries: {e}")))?;

    let surface = crate::collaborators::PiggybackResponse::extract(&raw).surface;
    let code = extract_code_block(&surface);
    let test_path = test_file_path(source_path, framework);

    router
        .route_action(cancel, RouterOp::WriteFile, vec![test_path.clone(), code.clone()])
        .await?;

    if let Some(kernel) = kernel {
        let count = count_test_functions(framework, &code);
        kernel
            .assert(Fact::new("test_generated", vec![Value::from(test_path.clone()), Value::from(count as i64)]))
            .await?;
        kernel
            .assert(Fact::new("file_topology", vec![Value::from(source_path.to_string()), Value::from(test_path.clone())]))
            .await?;
    }

    Ok(test_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_follows_framework_convention() {
        assert_eq!(test_file_path("internal/auth/login.go", Framework::GoTest), "internal/auth/login_test.go");
        assert_eq!(test_file_path("src/widget.tsx", Framework::Jest), "src/widget.test.tsx");
        assert_eq!(test_file_path("app/models.py", Framework::Pytest), "app/test_models.py");
    }

    #[test]
    fn extract_code_block_strips_fences_and_language_tag() {
        let raw = "```go\nfunc TestFoo(t *testing.T) {}\n```";
        assert_eq!(extract_code_block(raw), "func TestFoo(t *testing.T) {}");
    }

    #[test]
    fn extract_code_block_without_fences_is_unchanged() {
        let raw = "def test_foo():\n    assert True";
        assert_eq!(extract_code_block(raw), raw);
    }

    #[test]
    fn count_test_functions_per_framework() {
        let go_src = "func TestA(t *testing.T) {}\nfunc TestB(t *testing.T) {}\nfunc helper() {}";
        assert_eq!(count_test_functions(Framework::GoTest, go_src), 2);

        let py_src = "def test_one():\n    pass\ndef test_two():\n    pass\ndef helper():\n    pass";
        assert_eq!(count_test_functions(Framework::Pytest, py_src), 2);
    }
}

//! Tester shard (spec.md §4.2).
//!
//! DESIGN DECISION: same shape as `research::ResearchShard` — collaborators
//! injected as optional trait objects at construction, autopoiesis counters
//! owned for the shard's lifetime, `Execute` dispatching on a closed action
//! enumeration rather than virtual dispatch (spec.md §9 "Dynamic dispatch →
//! tagged variants").

pub mod autopoiesis;
pub mod exec;
pub mod failures;
pub mod framework;
pub mod mocks;
pub mod pytest;
pub mod task;
pub mod tdd;
pub mod testgen;

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::collaborators::{LLMClient, LearningStore, RouterOp, VirtualStore};
use crate::config::loader::TesterConfig;
use crate::error::{Error, Result};
use crate::facts::{Fact, Kernel, Value};
use crate::retry::BackoffPolicy;

use autopoiesis::TesterAutopoiesis;
use exec::TestRunResult;
use failures::Diagnostic;
use framework::Framework;
use task::{ParsedTesterTask, TesterAction};

/// Everything a single `Execute` call reports back (spec.md §4.2 "Fact
/// emission").
#[derive(Debug, Clone)]
pub struct TesterOutcome {
    pub summary: String,
    pub passed: bool,
    pub coverage_pct: Option<f64>,
    pub diagnostics: Vec<Diagnostic>,
    pub retry_count: u32,
    pub duration: Duration,
    pub facts_emitted: usize,
}

pub struct TesterShard {
    llm: Option<Box<dyn LLMClient>>,
    kernel: Option<Box<dyn Kernel>>,
    router: Option<Box<dyn VirtualStore>>,
    learning_store: Option<Box<dyn LearningStore>>,
    retry: BackoffPolicy,
    config: TesterConfig,
    autopoiesis: TesterAutopoiesis,
}

impl TesterShard {
    pub fn new(config: TesterConfig) -> Self {
        Self {
            llm: None,
            kernel: None,
            router: None,
            learning_store: None,
            retry: BackoffPolicy::default(),
            config,
            autopoiesis: TesterAutopoiesis::new(),
        }
    }

    pub fn set_llm(&mut self, llm: Box<dyn LLMClient>) {
        self.llm = Some(llm);
    }

    pub fn set_kernel(&mut self, kernel: Box<dyn Kernel>) {
        self.kernel = Some(kernel);
    }

    pub fn set_router(&mut self, router: Box<dyn VirtualStore>) {
        self.router = Some(router);
    }

    pub fn set_learning_store(&mut self, store: Box<dyn LearningStore>) {
        self.learning_store = Some(store);
    }

    /// Restore counters previously saturated and persisted to the learning
    /// store. Callers invoke this once after `set_learning_store`.
    pub async fn restore_autopoiesis(&mut self) -> Result<()> {
        if let Some(store) = &self.learning_store {
            self.autopoiesis = TesterAutopoiesis::restore(store.as_ref(), "tester").await?;
        }
        Ok(())
    }

    async fn persist_learning(&self) -> Result<()> {
        let Some(store) = &self.learning_store else {
            return Ok(());
        };
        self.autopoiesis.persist(store.as_ref(), "tester").await
    }

    fn framework_for(&self, parsed: &ParsedTesterTask) -> Framework {
        parsed
            .file
            .as_deref()
            .map(framework::detect_from_path)
            .unwrap_or_else(|| framework::detect_from_path(&parsed.target))
    }

    /// After a failing run, scan output for mock-related keywords and
    /// silently regenerate any stale mocks it finds (spec.md §4.2 "Mock-error
    /// reaction"). Never fails the overall run.
    async fn react_to_mock_errors(&self, cancel: &CancellationToken, framework: Framework, target_file: Option<&str>, output: &str) {
        if !exec::looks_mock_related(output) {
            return;
        }
        let (Some(router), Some(file)) = (&self.router, target_file) else {
            return;
        };
        let language = mocks::detect_language(file);
        if language == mocks::MockLanguage::Unknown {
            return;
        }
        let Ok(source) = router.route_action(cancel, RouterOp::ReadFile, vec![file.to_string()]).await else {
            return;
        };
        let descriptor = match language {
            mocks::MockLanguage::Go => mocks::parse_go_interfaces(&source),
            mocks::MockLanguage::TypeScript => mocks::parse_ts_interfaces(&source),
            mocks::MockLanguage::Python => mocks::parse_python_interfaces(&source),
            mocks::MockLanguage::Unknown => return,
        };
        let mock_path = mocks::mock_path_for(file, language);
        let existing = router
            .route_action(cancel, RouterOp::ReadFile, vec![mock_path.clone()])
            .await
            .ok();
        if !mocks::is_stale(&descriptor.interfaces, existing.as_deref()) {
            return;
        }
        let Some(llm) = &self.llm else {
            return;
        };
        if let Ok(code) = mocks::synthesize_mock_source(llm.as_ref(), cancel, &descriptor, language).await {
            let _ = router.route_action(cancel, RouterOp::WriteFile, vec![mock_path.clone(), code]).await;
            if let Some(kernel) = &self.kernel {
                let _ = kernel
                    .assert(Fact::new("mock_generated", vec![Value::from(mock_path), Value::from(framework.name().to_string())]))
                    .await;
            }
        }
    }

    async fn emit_run_facts(&self, outcome: &TestRunResult, framework: Framework, retry_count: u32, goal: f64) -> Result<usize> {
        let Some(kernel) = &self.kernel else {
            return Ok(0);
        };
        let mut emitted = 0;

        kernel
            .assert(Fact::new("test_state", vec![Value::from(if outcome.passed { "/passing" } else { "/failing" })]))
            .await?;
        emitted += 1;

        kernel.assert(Fact::new("test_type", vec![Value::from(framework.name())])).await?;
        emitted += 1;

        let truncated: String = outcome.raw_output.chars().take(2000).collect();
        kernel.assert(Fact::new("test_output", vec![Value::from(truncated)])).await?;
        emitted += 1;

        if let Some(pct) = outcome.coverage_pct {
            kernel.assert(Fact::new("coverage_metric", vec![Value::from(pct)])).await?;
            emitted += 1;
            if pct < goal {
                kernel
                    .assert(Fact::new("coverage_below_goal", vec![Value::from(pct), Value::from(goal)]))
                    .await?;
                emitted += 1;
            }
        }

        kernel.assert(Fact::new("retry_count", vec![Value::from(retry_count as i64)])).await?;
        emitted += 1;

        for failed in &outcome.failed_tests {
            kernel
                .assert(Fact::new(
                    "failed_test",
                    vec![
                        Value::from(failed.name.clone()),
                        Value::from(failed.file.clone().unwrap_or_default()),
                        Value::from(failed.message.clone()),
                    ],
                ))
                .await?;
            emitted += 1;
        }

        for (kind, pattern) in self.autopoiesis.promotions() {
            kernel
                .assert(Fact::new("promote_to_long_term", vec![Value::from(kind), Value::from(pattern)]))
                .await?;
            emitted += 1;
        }

        Ok(emitted)
    }

    async fn run_and_react(&mut self, cancel: &CancellationToken, framework: Framework, target: Option<&str>, coverage: bool) -> Result<TestRunResult> {
        let timeout = Duration::from_secs(if coverage { self.config.coverage_timeout_secs } else { self.config.test_timeout_secs });
        let result = exec::run_tests(cancel, self.router.as_deref(), framework, target, coverage, timeout).await?;

        if !result.passed {
            self.react_to_mock_errors(cancel, framework, target, &result.raw_output).await;
            for failed in &result.failed_tests {
                self.autopoiesis.record_failure(&failed.message);
            }
        } else {
            self.autopoiesis.record_success(target.unwrap_or("suite"));
        }
        Ok(result)
    }

    /// `Execute(task)`: dispatch on the task string's action token.
    #[instrument(skip(self, cancel))]
    pub async fn execute(&mut self, cancel: &CancellationToken, task_str: &str) -> Result<TesterOutcome> {
        let started = Instant::now();
        let parsed = task::parse_tester_task(task_str);
        let action = parsed.action_or_default();
        let framework = self.framework_for(&parsed);
        let target = if parsed.target.is_empty() { parsed.file.clone() } else { Some(parsed.target.clone()) };

        let outcome = match action {
            TesterAction::RunTests => self.do_run(cancel, framework, target.as_deref(), false).await?,
            TesterAction::Coverage => self.do_run(cancel, framework, target.as_deref(), true).await?,
            TesterAction::GenerateTests => self.do_generate(cancel, framework, &parsed).await?,
            TesterAction::Tdd => self.do_tdd(cancel, framework, &parsed).await?,
            TesterAction::RegenerateMocks => self.do_regenerate_mocks(cancel, &parsed).await?,
            TesterAction::DetectStaleMocks => self.do_detect_stale_mocks(cancel, &parsed).await?,
        };

        self.persist_learning().await?;
        let mut outcome = outcome;
        outcome.duration = started.elapsed();
        self.report(&outcome.summary);
        Ok(outcome)
    }

    async fn do_run(&mut self, cancel: &CancellationToken, framework: Framework, target: Option<&str>, coverage: bool) -> Result<TesterOutcome> {
        let result = self.run_and_react(cancel, framework, target, coverage).await?;
        let facts_emitted = self.emit_run_facts(&result, framework, 0, self.config.coverage_goal_pct).await?;
        Ok(TesterOutcome {
            summary: if result.passed { "tests passed".to_string() } else { format!("{} test(s) failed", result.failed_tests.len()) },
            passed: result.passed,
            coverage_pct: result.coverage_pct,
            diagnostics: Vec::new(),
            retry_count: 0,
            duration: Duration::default(),
            facts_emitted,
        })
    }

    async fn do_generate(&mut self, cancel: &CancellationToken, framework: Framework, parsed: &ParsedTesterTask) -> Result<TesterOutcome> {
        let (Some(router), Some(llm)) = (self.router.as_deref(), self.llm.as_deref()) else {
            return Err(Error::ModelUnavailable("test generation requires a router and a model client".to_string()));
        };
        let source_path = parsed.file.clone().unwrap_or_else(|| parsed.target.clone());
        let test_path = testgen::generate(
            cancel,
            router,
            llm,
            self.kernel.as_deref(),
            framework,
            &source_path,
            parsed.function.as_deref(),
            &self.retry,
        )
        .await?;

        Ok(TesterOutcome {
            summary: format!("generated {test_path}"),
            passed: true,
            coverage_pct: None,
            diagnostics: Vec::new(),
            retry_count: 0,
            duration: Duration::default(),
            facts_emitted: 2,
        })
    }

    async fn do_tdd(&mut self, cancel: &CancellationToken, framework: Framework, parsed: &ParsedTesterTask) -> Result<TesterOutcome> {
        let (Some(router), Some(llm)) = (self.router.as_deref(), self.llm.as_deref()) else {
            return Err(Error::ModelUnavailable("TDD repair requires a router and a model client".to_string()));
        };
        let target = if parsed.target.is_empty() {
            parsed.file.clone().unwrap_or_default()
        } else {
            parsed.target.clone()
        };
        let timeout = Duration::from_secs(self.config.test_timeout_secs);
        let outcome = tdd::run(cancel, router, llm, framework, &target, self.config.max_repair_retries, timeout).await?;

        let facts_emitted = match &outcome.last_result {
            Some(result) => self.emit_run_facts(result, framework, outcome.attempts, self.config.coverage_goal_pct).await?,
            None => 0,
        };

        Ok(TesterOutcome {
            summary: format!("{:?} after {} repair attempt(s)", outcome.final_state, outcome.attempts),
            passed: outcome.final_state == tdd::TddState::Passing,
            coverage_pct: outcome.last_result.as_ref().and_then(|r| r.coverage_pct),
            diagnostics: outcome.diagnostics,
            retry_count: outcome.attempts,
            duration: Duration::default(),
            facts_emitted,
        })
    }

    async fn do_regenerate_mocks(&mut self, cancel: &CancellationToken, parsed: &ParsedTesterTask) -> Result<TesterOutcome> {
        let Some(router) = self.router.as_deref() else {
            return Err(Error::ModelUnavailable("mock regeneration requires a router".to_string()));
        };
        let interface_path = parsed.file.clone().unwrap_or_else(|| parsed.target.clone());
        let language = mocks::detect_language(&interface_path);
        let source = router.route_action(cancel, RouterOp::ReadFile, vec![interface_path.clone()]).await?;
        let descriptor = match language {
            mocks::MockLanguage::Go => mocks::parse_go_interfaces(&source),
            mocks::MockLanguage::TypeScript => mocks::parse_ts_interfaces(&source),
            mocks::MockLanguage::Python => mocks::parse_python_interfaces(&source),
            mocks::MockLanguage::Unknown => return Err(Error::Internal(format!("mock regeneration not grounded for {language:?} sources"))),
        };
        let mock_path = mocks::mock_path_for(&interface_path, language);
        let existing = router.route_action(cancel, RouterOp::ReadFile, vec![mock_path.clone()]).await.ok();

        if !mocks::is_stale(&descriptor.interfaces, existing.as_deref()) {
            return Ok(TesterOutcome {
                summary: format!("{mock_path} is already up to date"),
                passed: true,
                coverage_pct: None,
                diagnostics: Vec::new(),
                retry_count: 0,
                duration: Duration::default(),
                facts_emitted: 0,
            });
        }

        let Some(llm) = self.llm.as_deref() else {
            return Err(Error::ModelUnavailable("mock synthesis requires a model client".to_string()));
        };
        let code = mocks::synthesize_mock_source(llm, cancel, &descriptor, language).await?;
        router.route_action(cancel, RouterOp::WriteFile, vec![mock_path.clone(), code]).await?;

        let mut facts_emitted = 0;
        if let Some(kernel) = &self.kernel {
            kernel
                .assert(Fact::new("mock_generated", vec![Value::from(mock_path.clone()), Value::from(interface_path)]))
                .await?;
            facts_emitted += 1;
        }

        Ok(TesterOutcome {
            summary: format!("regenerated {mock_path}"),
            passed: true,
            coverage_pct: None,
            diagnostics: Vec::new(),
            retry_count: 0,
            duration: Duration::default(),
            facts_emitted,
        })
    }

    async fn do_detect_stale_mocks(&mut self, cancel: &CancellationToken, parsed: &ParsedTesterTask) -> Result<TesterOutcome> {
        let Some(router) = self.router.as_deref() else {
            return Err(Error::ModelUnavailable("stale-mock detection requires a router".to_string()));
        };
        let interface_path = parsed.file.clone().unwrap_or_else(|| parsed.target.clone());
        let language = mocks::detect_language(&interface_path);
        let source = router.route_action(cancel, RouterOp::ReadFile, vec![interface_path.clone()]).await?;
        let descriptor = match language {
            mocks::MockLanguage::Go => mocks::parse_go_interfaces(&source),
            mocks::MockLanguage::TypeScript => mocks::parse_ts_interfaces(&source),
            mocks::MockLanguage::Python => mocks::parse_python_interfaces(&source),
            mocks::MockLanguage::Unknown => return Err(Error::Internal(format!("stale-mock detection not grounded for {language:?} sources"))),
        };
        let mock_path = mocks::mock_path_for(&interface_path, language);
        let existing = router.route_action(cancel, RouterOp::ReadFile, vec![mock_path.clone()]).await.ok();
        let stale = mocks::is_stale(&descriptor.interfaces, existing.as_deref());

        Ok(TesterOutcome {
            summary: if stale { format!("{mock_path} is stale") } else { format!("{mock_path} is current") },
            passed: !stale,
            coverage_pct: None,
            diagnostics: Vec::new(),
            retry_count: 0,
            duration: Duration::default(),
            facts_emitted: 0,
        })
    }

    fn report(&self, message: &str) {
        info!(%message, "tester progress");
    }
}

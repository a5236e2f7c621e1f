//! Research shard (spec.md §4.1).
//!
//! DESIGN DECISION: the shard owns its per-shard state (autopoiesis counters,
//! the rate-limit gate, the workspace root) behind an `RwLock`-free plain
//! struct — the contract's "per-shard, persist across calls" note (spec.md
//! §5 "Shared-resource policy") is satisfied by `&mut self` on
//! state-mutating methods, following the teacher's preference for ordinary
//! ownership over interior mutability wherever the call pattern allows it.

pub mod codebase;
pub mod github;
pub mod pipeline;
pub mod prompts;
pub mod synthesis;
pub mod task;

use std::path::PathBuf;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::collaborators::{HttpFetcher, LearningStore, LLMClient, LocalStore};
use crate::config::loader::ResearchConfig;
use crate::error::{Error, Result};
use crate::facts::{Fact, Kernel, Value};
use crate::knowledge::atom::{KnowledgeAtom, ResearchResult};
use crate::knowledge::{batching, coverage, Autopoiesis};
use crate::rate_limiter::SinglePermitGate;
use crate::retry::BackoffPolicy;

use pipeline::PipelineContext;

pub type ProgressCallback = Box<dyn Fn(&str) + Send + Sync>;

/// The research shard. Constructed once per runtime, reused across `Execute`
/// calls.
pub struct ResearchShard {
    llm: Option<Box<dyn LLMClient>>,
    kernel: Option<Box<dyn Kernel>>,
    local_store: Option<Box<dyn LocalStore>>,
    learning_store: Option<Box<dyn LearningStore>>,
    http: Box<dyn HttpFetcher>,
    gate: SinglePermitGate,
    retry: BackoffPolicy,
    config: ResearchConfig,
    workspace_root: PathBuf,
    autopoiesis: Autopoiesis,
    progress: Option<ProgressCallback>,
}

impl ResearchShard {
    pub fn new(http: Box<dyn HttpFetcher>, config: ResearchConfig) -> Self {
        Self {
            llm: None,
            kernel: None,
            local_store: None,
            learning_store: None,
            http,
            gate: SinglePermitGate::new(),
            retry: BackoffPolicy::default(),
            config,
            workspace_root: PathBuf::from("."),
            autopoiesis: Autopoiesis::new(),
            progress: None,
        }
    }

    pub fn set_llm(&mut self, llm: Box<dyn LLMClient>) {
        self.llm = Some(llm);
    }

    pub fn set_kernel(&mut self, kernel: Box<dyn Kernel>) {
        self.kernel = Some(kernel);
    }

    pub fn set_local_store(&mut self, store: Box<dyn LocalStore>) {
        self.local_store = Some(store);
    }

    pub fn set_learning_store(&mut self, store: Box<dyn LearningStore>) {
        self.learning_store = Some(store);
    }

    pub fn set_workspace_root(&mut self, root: impl Into<PathBuf>) {
        self.workspace_root = root.into();
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    fn report(&self, message: &str) {
        info!(message, "research progress");
        if let Some(cb) = &self.progress {
            cb(message);
        }
    }

    fn pipeline_context(&self) -> PipelineContext<'_> {
        PipelineContext {
            llm: self.llm.as_deref(),
            http: self.http.as_ref(),
            gate: &self.gate,
            retry: &self.retry,
            config: &self.config,
            workspace_root: &self.workspace_root,
        }
    }

    async fn emit_facts(&self, result: &ResearchResult) -> Result<usize> {
        let Some(kernel) = &self.kernel else {
            return Ok(0);
        };
        let mut emitted = 0;
        kernel
            .assert(Fact::new(
                "research_session",
                vec![Value::from(result.session_id.to_string()), Value::from(result.query.clone())],
            ))
            .await?;
        emitted += 1;
        for atom in &result.atoms {
            kernel
                .assert(Fact::new(
                    "knowledge_atom",
                    vec![
                        Value::from(atom.id().to_string()),
                        Value::from(atom.concept().as_str().to_string()),
                        Value::from(atom.confidence()),
                    ],
                ))
                .await?;
            emitted += 1;
        }

        let fragments = prompts::generate_prompt_fragments(&result.atoms);
        if !fragments.is_empty() {
            prompts::persist_fragments(kernel.as_ref(), &fragments).await?;
            emitted += fragments.len() * 2;
        }

        Ok(emitted)
    }

    async fn persist_atoms(&self, atoms: &[KnowledgeAtom]) -> Result<()> {
        let Some(store) = &self.local_store else {
            return Ok(());
        };
        for atom in atoms {
            store
                .store_knowledge_atom(atom.source(), atom.body(), atom.confidence())
                .await?;
        }
        Ok(())
    }

    fn record_outcomes(&mut self, query: &str, atoms: &[KnowledgeAtom]) {
        let avg = if atoms.is_empty() {
            0.0
        } else {
            atoms.iter().map(|a| a.confidence()).sum::<f64>() / atoms.len() as f64
        };
        self.autopoiesis.update_topic_quality(query, avg);
        self.autopoiesis.record_query_result(query, atoms.len());
        for atom in atoms {
            self.autopoiesis.record_atom_outcome(atom.source(), atom.confidence());
        }
    }

    async fn persist_learning(&self) -> Result<()> {
        let Some(store) = &self.learning_store else {
            return Ok(());
        };
        self.autopoiesis.persist(store.as_ref(), "research").await
    }

    /// `Execute(task)`: parse the task string, dispatch to codebase mode or
    /// single-topic web research, and return a completed `ResearchResult`.
    #[instrument(skip(self, cancel))]
    pub async fn execute(&mut self, cancel: &CancellationToken, task_str: &str) -> Result<ResearchResult> {
        let started = Instant::now();

        if task::is_codebase_mode(task_str) {
            return self.ingest_documentation(cancel).await;
        }

        let parsed = task::parse_task(task_str);
        let deep = task::is_deep_mode(task_str);
        self.report(&format!("researching \"{}\"", parsed.topic));

        let ctx = self.pipeline_context();
        let (atoms, sources, summary) = pipeline::run(
            &ctx,
            cancel,
            &parsed.topic,
            &parsed.keywords,
            &parsed.urls,
            deep,
        )
        .await
        .map_err(|e| Error::ResearchFailed(e.to_string()))?;

        self.persist_atoms(&atoms).await?;
        self.record_outcomes(&parsed.topic, &atoms);
        self.persist_learning().await?;

        let mut result = ResearchResult::empty(parsed.topic.clone(), parsed.keywords);
        result.atoms = atoms;
        result.summary = summary;
        result.sources_consulted = sources;
        result.duration = started.elapsed();
        result.facts_emitted = self.emit_facts(&result).await?;

        Ok(result)
    }

    /// `ResearchTopicsParallel(topics)`: batch topics by the adaptive batch
    /// size, sleeping between batches, aggregating atoms across all topics.
    /// An empty topic list returns an empty, successful result immediately
    /// (spec.md §8 "`ResearchTopicsParallel(empty)` returns zero atoms, zero
    /// pages, zero facts, and no error.").
    #[instrument(skip(self, cancel))]
    pub async fn research_topics_parallel(
        &mut self,
        cancel: &CancellationToken,
        topics: Vec<String>,
    ) -> Result<ResearchResult> {
        if topics.is_empty() {
            return Ok(ResearchResult::empty("", Vec::new()));
        }

        let started = Instant::now();
        let history = batching::BatchingHistory::default();
        let mut remaining = topics.clone();
        let mut atoms = Vec::new();
        let mut sources = 0usize;

        while !remaining.is_empty() {
            let batch_size = batching::adaptive_batch_size(&remaining, &history).max(1);
            let batch: Vec<String> = remaining.drain(..batch_size.min(remaining.len())).collect();
            self.report(&format!("researching batch of {} topics", batch.len()));

            for topic in &batch {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let keywords: Vec<String> = topic.to_lowercase().split_whitespace().map(str::to_string).collect();
                let ctx = self.pipeline_context();
                if let Ok((topic_atoms, topic_sources, _)) =
                    pipeline::run(&ctx, cancel, topic, &keywords, &[], false).await
                {
                    sources += topic_sources;
                    self.record_outcomes(topic, &topic_atoms);
                    atoms.extend(topic_atoms);
                }
            }

            if !remaining.is_empty() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(batching::INTER_BATCH_SLEEP) => {}
                }
            }
        }

        self.persist_atoms(&atoms).await?;
        self.persist_learning().await?;

        let mut result = ResearchResult::empty(topics.join(", "), topics);
        result.atoms = atoms;
        result.summary = format!("Researched {} topics.", result.keywords.len());
        result.sources_consulted = sources;
        result.duration = started.elapsed();
        result.facts_emitted = self.emit_facts(&result).await?;
        Ok(result)
    }

    /// `ResearchTopicsWithExistingKnowledge(topics, existingAtoms)`: skip
    /// topics already covered by `existing_atoms` (spec.md §4.1
    /// "Coverage-aware research") and only research the rest.
    #[instrument(skip(self, cancel, existing_atoms))]
    pub async fn research_topics_with_existing_knowledge(
        &mut self,
        cancel: &CancellationToken,
        topics: Vec<String>,
        existing_atoms: &[KnowledgeAtom],
    ) -> Result<ResearchResult> {
        let report = coverage::analyze_topics(&topics, existing_atoms);
        if report.researched.is_empty() {
            self.report("all topics already sufficiently covered");
            let mut result = ResearchResult::empty(topics.join(", "), topics);
            result.summary = "All topics already have sufficient coverage.".to_string();
            return Ok(result);
        }

        let targeted: Vec<String> = report
            .researched
            .iter()
            .map(|d| d.targeted_query.clone().unwrap_or_else(|| d.topic.clone()))
            .collect();

        self.report(&format!(
            "skipping {} already-covered topics, researching {}",
            report.skipped.len(),
            targeted.len()
        ));

        self.research_topics_parallel(cancel, targeted).await
    }

    /// `DeepResearch(topic, keywords)`: single-topic pipeline run with the
    /// extended-deep-search step enabled.
    #[instrument(skip(self, cancel))]
    pub async fn deep_research(
        &mut self,
        cancel: &CancellationToken,
        topic: String,
        keywords: Vec<String>,
    ) -> Result<ResearchResult> {
        let started = Instant::now();
        let ctx = self.pipeline_context();
        let (atoms, sources, summary) = pipeline::run(&ctx, cancel, &topic, &keywords, &[], true)
            .await
            .map_err(|e| Error::ResearchFailed(e.to_string()))?;

        self.persist_atoms(&atoms).await?;
        self.record_outcomes(&topic, &atoms);
        self.persist_learning().await?;

        let mut result = ResearchResult::empty(topic, keywords);
        result.atoms = atoms;
        result.summary = summary;
        result.sources_consulted = sources;
        result.duration = started.elapsed();
        result.facts_emitted = self.emit_facts(&result).await?;
        Ok(result)
    }

    /// `IngestDocumentation(workspace)`: reuses codebase-mode dispatch's
    /// analyzer to produce dependency/pattern/architecture atoms for the
    /// configured workspace root.
    #[instrument(skip(self, cancel))]
    pub async fn ingest_documentation(&mut self, cancel: &CancellationToken) -> Result<ResearchResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let started = Instant::now();
        let analysis = codebase::analyze(&self.workspace_root);
        let atoms = codebase::analysis_to_atoms(&analysis);
        let summary = codebase::summarize(&analysis, self.llm.as_deref(), cancel).await?;

        self.persist_atoms(&atoms).await?;
        self.record_outcomes("codebase analysis", &atoms);
        self.persist_learning().await?;

        let mut result = ResearchResult::empty("codebase analysis", Vec::new());
        result.atoms = atoms;
        result.summary = summary;
        result.sources_consulted = 1;
        result.duration = started.elapsed();
        result.facts_emitted = self.emit_facts(&result).await?;
        Ok(result)
    }
}

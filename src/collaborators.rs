//! Narrow collaborator contracts (spec.md §6).
//!
//! DESIGN DECISION: every external system the shards depend on — the model,
//! the virtual-action router, the local/learning/guardian stores — is
//! injected as a trait object at shard construction, never reached into
//! directly.
//! WHY: mirrors the teacher's `DomainAgent`/escalation-engine separation
//! (trait defines the contract, concrete implementations live elsewhere) and
//! satisfies spec.md §9's "Cyclic references" design note: the shard never
//! reaches back into the kernel's internals, and no reference graph outlives
//! the outer runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::facts::Fact;

/// A model response, split into the user-facing `surface` and an optional
/// structured `control` packet (GLOSSARY: "Piggyback").
///
/// DESIGN DECISION: only test/mock paths may route `control` to the fact
/// engine (spec.md §9); every other shard consumes `surface` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiggybackResponse {
    pub surface: String,
    pub control: Option<serde_json::Value>,
}

impl PiggybackResponse {
    /// Split a raw model response into surface text and an optional trailing
    /// `<!--control:{...}-->` JSON packet. Absence of the marker is not an
    /// error — most responses carry no control packet.
    pub fn extract(raw: &str) -> Self {
        const MARKER: &str = "<!--control:";
        match raw.rfind(MARKER) {
            Some(start) => {
                let after = &raw[start + MARKER.len()..];
                match after.find("-->") {
                    Some(end) => {
                        let payload = &after[..end];
                        let control = serde_json::from_str(payload).ok();
                        PiggybackResponse {
                            surface: raw[..start].trim_end().to_string(),
                            control,
                        }
                    }
                    None => PiggybackResponse {
                        surface: raw.to_string(),
                        control: None,
                    },
                }
            }
            None => PiggybackResponse {
                surface: raw.to_string(),
                control: None,
            },
        }
    }
}

/// The language-model inference service, invoked only through this contract
/// (spec.md §1 Non-goals: the inference service itself is an external
/// collaborator).
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, cancel: &tokio_util::sync::CancellationToken, prompt: &str) -> Result<String>;

    async fn complete_with_system(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        system: &str,
        user: &str,
    ) -> Result<String>;
}

/// One of the virtual-action router's named operations (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOp {
    ReadFile,
    WriteFile,
    StatFile,
    CreateDir,
    RunTests,
    RunCoverage,
    RunCommand,
}

impl RouterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RouterOp::ReadFile => "/read_file",
            RouterOp::WriteFile => "/write_file",
            RouterOp::StatFile => "/stat_file",
            RouterOp::CreateDir => "/create_dir",
            RouterOp::RunTests => "/run_tests",
            RouterOp::RunCoverage => "/run_coverage",
            RouterOp::RunCommand => "/run_command",
        }
    }
}

/// The virtual-action router: dispatches a `next_action` fact to whatever
/// actually touches the filesystem or a subprocess.
#[async_trait]
pub trait VirtualStore: Send + Sync {
    async fn route_action(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        op: RouterOp,
        args: Vec<String>,
    ) -> Result<String>;
}

/// The embedded relational/vector store, used for atom and link persistence.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn store_vector(&self, text: &str, metadata: serde_json::Value) -> Result<()>;
    async fn store_vector_with_embedding(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;
    async fn store_link(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        confidence: f64,
        metadata: serde_json::Value,
    ) -> Result<()>;
    async fn store_fact(&self, predicate: &str, args: Vec<String>, source: &str, priority: i64) -> Result<()>;
    async fn store_knowledge_atom(&self, source: &str, content: &str, confidence: f64) -> Result<()>;
}

/// HTTP transport, reached only through this narrow interface (spec.md §1:
/// "The filesystem, process launcher, HTTP transport, and embedded
/// relational store — used via narrow interfaces.").
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetch `url` as text, truncated to `max_bytes`. Implementations must
    /// honor cancellation.
    async fn fetch_text(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        url: &str,
        max_bytes: usize,
    ) -> Result<String>;
}

/// Default `HttpFetcher`, backed by `reqwest` (spec.md §9's narrow-interface
/// note describes *how* transport is reached, not that it must be faked;
/// only the model, kernel, and store collaborators are externally supplied
/// in every deployment).
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch_text(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        url: &str,
        max_bytes: usize,
    ) -> Result<String> {
        let fetch = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(crate::error::Error::from)?;
            let body = response.text().await.map_err(crate::error::Error::from)?;
            Ok(body.chars().take(max_bytes).collect())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(crate::error::Error::Cancelled),
            result = fetch => result,
        }
    }
}

/// Per-shard autopoiesis persistence (spec.md §4.1 "Learning", §4.2 "Autopoiesis").
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn save(&self, shard_name: &str, kind: &str, args: Vec<String>, extra: serde_json::Value) -> Result<()>;
    async fn load_by_predicate(&self, shard_name: &str, kind: &str) -> Result<Vec<Fact>>;
}

/// CRUD for the guardian's six tables (spec.md §6 "Guardian store").
#[async_trait]
pub trait GuardianStore: Send + Sync {
    async fn save_vision(&self, vision: &crate::guardian::vision::Vision) -> Result<()>;
    async fn load_vision(&self) -> Result<Option<crate::guardian::vision::Vision>>;
    async fn save_observation(&self, observation: &crate::guardian::vision::Observation) -> Result<()>;
    async fn save_alignment_check(&self, check: &crate::guardian::vision::AlignmentCheck) -> Result<()>;
    async fn save_drift_event(&self, event: &crate::guardian::vision::DriftEvent) -> Result<()>;
    async fn save_state(&self, state: &crate::guardian::vision::GuardianState) -> Result<()>;
    async fn load_state(&self) -> Result<crate::guardian::vision::GuardianState>;
}

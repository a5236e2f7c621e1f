//! End-to-end `ResearchShard::execute` against fake collaborators — no
//! network, no filesystem beyond a temp dir (SPEC_FULL.md §1.1 "Test
//! tooling": integration tests under `tests/` exercising a shard's `Execute`
//! entry point against fakes).

use async_trait::async_trait;
use shard_core::collaborators::HttpFetcher;
use shard_core::config::loader::ResearchConfig;
use shard_core::error::Result as CrateResult;
use shard_core::ResearchShard;
use tokio_util::sync::CancellationToken;

struct OfflineFetcher;

#[async_trait]
impl HttpFetcher for OfflineFetcher {
    async fn fetch_text(&self, _cancel: &CancellationToken, _url: &str, _max_bytes: usize) -> CrateResult<String> {
        Err(shard_core::Error::NetworkTransient("integration test runs fully offline".into()))
    }
}

#[tokio::test]
async fn execute_on_a_bare_topic_degrades_gracefully_with_no_collaborators() {
    let mut shard = ResearchShard::new(Box::new(OfflineFetcher), ResearchConfig::default());
    let cancel = CancellationToken::new();

    let result = shard.execute(&cancel, "topic:rust error handling patterns").await.unwrap();

    assert_eq!(result.query, "rust error handling patterns");
    assert!(result.atoms.is_empty());
    assert_eq!(result.facts_emitted, 0, "no kernel bound, so no facts should be emitted");
}

#[tokio::test]
async fn execute_on_a_codebase_task_never_errors_against_an_empty_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let mut shard = ResearchShard::new(Box::new(OfflineFetcher), ResearchConfig::default());
    shard.set_workspace_root(dir.path());
    let cancel = CancellationToken::new();

    let result = shard.execute(&cancel, "analyze this codebase").await.unwrap();

    assert!(result.summary.contains("unknown language"));
}

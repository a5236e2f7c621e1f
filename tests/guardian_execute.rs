//! End-to-end `VisionGuardian` against a real in-memory `SqliteStore` — no
//! LLM bound, exercising the documented no-model degraded path (SPEC_FULL.md
//! §1.1 "Test tooling"; spec.md §4.3 "No-model behavior").

use chrono::Utc;
use shard_core::guardian::vision::{CheckResult, Trigger, Vision};
use shard_core::{SqliteStore, VisionGuardian};
use shard_core::collaborators::GuardianStore;
use shard_core::config::loader::GuardianConfig;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn check_alignment_persists_through_a_real_sqlite_store_without_a_model() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut guardian = VisionGuardian::new(GuardianConfig::default(), "integration-session");
    guardian.set_store(Box::new(store));
    guardian
        .set_vision(
            Vision::new(
                "ship a reliable agent core".to_string(),
                "agents drift from their brief over long sessions".to_string(),
                "a guardian that keeps every shard honest".to_string(),
                Utc::now(),
            ),
            Utc::now(),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let check = guardian
        .check_alignment(&cancel, Trigger::Manual, "add a new retry policy", None, Utc::now())
        .await
        .unwrap();

    assert_eq!(check.result, CheckResult::Passed);
    assert_eq!(check.score, 0.8);
}

#[tokio::test]
async fn on_task_complete_fires_a_periodic_check_every_interval() {
    let store = SqliteStore::open_in_memory().unwrap();
    let config = GuardianConfig { periodic_interval: 2, ..GuardianConfig::default() };
    let mut guardian = VisionGuardian::new(config, "integration-session");
    guardian.set_store(Box::new(store));
    guardian
        .set_vision(
            Vision::new("ship it".to_string(), "drift".to_string(), "stay aligned".to_string(), Utc::now()),
            Utc::now(),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let first = guardian.on_task_complete(&cancel, "wrote a test", Utc::now()).await.unwrap();
    let second = guardian.on_task_complete(&cancel, "wrote another test", Utc::now()).await.unwrap();

    assert!(first.is_none());
    assert!(second.is_some());
}

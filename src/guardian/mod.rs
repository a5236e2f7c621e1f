//! Vision guardian (spec.md §4.3).
//!
//! DESIGN DECISION: state guarded by a single `tokio::sync::RwLock` (spec.md
//! §5 "Shared-resource policy": "The guardian's check map and state are
//! guarded by a single reader-writer lock"), unlike the research/tester
//! shards which use plain `&mut self` — this is the one shard whose contract
//! requires concurrent callers to observe the same state.

pub mod relevance;
pub mod scoring;
pub mod triggers;
pub mod vision;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::collaborators::{GuardianStore, LLMClient};
use crate::config::loader::GuardianConfig;
use crate::error::{Error, Result};
use vision::{AlignmentCheck, CheckResult, DriftEvent, DriftSeverity, GuardianState, Observation, ObservationType, Trigger, Vision};

pub struct VisionGuardian {
    llm: Option<Box<dyn LLMClient>>,
    store: Option<Box<dyn GuardianStore>>,
    config: GuardianConfig,
    vision: RwLock<Option<Vision>>,
    state: RwLock<GuardianState>,
    session_id: String,
}

impl VisionGuardian {
    pub fn new(config: GuardianConfig, session_id: impl Into<String>) -> Self {
        Self {
            llm: None,
            store: None,
            config,
            vision: RwLock::new(None),
            state: RwLock::new(GuardianState::default()),
            session_id: session_id.into(),
        }
    }

    pub fn set_llm(&mut self, llm: Box<dyn LLMClient>) {
        self.llm = Some(llm);
    }

    pub fn set_store(&mut self, store: Box<dyn GuardianStore>) {
        self.store = Some(store);
    }

    /// Restore vision + state from the durable store, if one is bound.
    pub async fn restore(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(vision) = store.load_vision().await? {
            *self.vision.write().await = Some(vision);
        }
        *self.state.write().await = store.load_state().await?;
        Ok(())
    }

    /// `SetVision`: overwrites any existing vision and bumps `updated`
    /// (SPEC_FULL.md §4.3 — "intentionally no versioning").
    pub async fn set_vision(&self, mut vision: Vision, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        vision.updated = now;
        {
            let mut guard = self.vision.write().await;
            if guard.is_none() {
                vision.created = now;
            } else {
                vision.created = guard.as_ref().unwrap().created;
            }
            *guard = Some(vision.clone());
        }
        self.state.write().await.vision_defined = true;

        if let Some(store) = &self.store {
            store.save_vision(&vision).await.map_err(|e| {
                warn!(error = %e, "failed to persist vision");
                e
            })?;
        }
        Ok(())
    }

    /// `ShouldCheckNow(trigger, files)`.
    pub async fn should_check_now(&self, trigger: Trigger, files: &[String]) -> bool {
        let vision_set = self.vision.read().await.is_some();
        let state = self.state.read().await;
        triggers::should_fire(trigger, &self.config, vision_set, state.tasks_since_check, files)
    }

    /// `CheckAlignment(trigger, subject, context)` (spec.md §4.3 "Check
    /// execution", "No-model behavior").
    #[instrument(skip(self, cancel, context))]
    pub async fn check_alignment(
        &self,
        cancel: &CancellationToken,
        trigger: Trigger,
        subject: &str,
        context: Option<&str>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AlignmentCheck> {
        let started = std::time::Instant::now();
        let vision_guard = self.vision.read().await;

        let Some(vision) = vision_guard.as_ref() else {
            return Ok(AlignmentCheck {
                id: Uuid::new_v4(),
                timestamp: now,
                trigger,
                subject: subject.to_string(),
                context: context.map(str::to_string),
                result: CheckResult::Skipped,
                score: 1.0,
                explanation: "no vision defined".to_string(),
                suggestions: Vec::new(),
                duration: started.elapsed(),
            });
        };

        let (score, result, explanation) = match &self.llm {
            Some(llm) => {
                let (score, result, explanation, suggestions) =
                    scoring::run_check(llm.as_ref(), cancel, vision, subject, context, &self.config).await?;
                drop(vision_guard);
                let check = AlignmentCheck {
                    id: Uuid::new_v4(),
                    timestamp: now,
                    trigger,
                    subject: subject.to_string(),
                    context: context.map(str::to_string),
                    result,
                    score,
                    explanation,
                    suggestions,
                    duration: started.elapsed(),
                };
                return self.finalize_check(check).await;
            }
            None => {
                // spec.md §4.3 "No-model behavior": vision exists, no model
                // client → passed@0.8, explanation notes degraded mode.
                (0.8, CheckResult::Passed, "degraded mode: no model client configured".to_string())
            }
        };
        drop(vision_guard);

        let check = AlignmentCheck {
            id: Uuid::new_v4(),
            timestamp: now,
            trigger,
            subject: subject.to_string(),
            context: context.map(str::to_string),
            result,
            score,
            explanation,
            suggestions: Vec::new(),
            duration: started.elapsed(),
        };
        self.finalize_check(check).await
    }

    async fn finalize_check(&self, check: AlignmentCheck) -> Result<AlignmentCheck> {
        {
            let mut state = self.state.write().await;
            state.last_check = Some(check.timestamp);
            state.tasks_since_check = 0;
            state.overall_alignment = scoring::update_moving_average(state.overall_alignment, check.score);
        }

        if let Some(store) = &self.store {
            store.save_alignment_check(&check).await?;
        }

        if matches!(check.result, CheckResult::Failed | CheckResult::Blocked) {
            let event = DriftEvent {
                id: Uuid::new_v4(),
                timestamp: check.timestamp,
                severity: DriftSeverity::from_score(check.score),
                category: format!("{:?}", check.trigger),
                description: check.explanation.clone(),
                evidence: check.suggestions.clone(),
                related_check_id: Some(check.id),
                resolved: false,
                resolved_at: None,
                resolution: None,
            };
            self.state.write().await.active_drift_count += 1;
            if let Some(store) = &self.store {
                store.save_drift_event(&event).await?;
            }
            if check.result == CheckResult::Blocked {
                return Err(Error::AlignmentBlocked(format!(
                    "{} (score {:.2}): {}",
                    check.subject, check.score, check.explanation
                )));
            }
        }

        if let Some(store) = &self.store {
            store.save_state(&*self.state.read().await).await?;
        }

        info!(result = ?check.result, score = check.score, "alignment check complete");
        Ok(check)
    }

    /// `OnTaskComplete(task)`: records an observation, increments the
    /// periodic counter, and fires a periodic check when due.
    pub async fn on_task_complete(
        &self,
        cancel: &CancellationToken,
        task: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<AlignmentCheck>> {
        self.observe_task_completion(task, now).await?;
        self.state.write().await.tasks_since_check += 1;

        if self.should_check_now(Trigger::Periodic, &[]).await {
            let check = self.check_alignment(cancel, Trigger::Periodic, task, None, now).await?;
            return Ok(Some(check));
        }
        Ok(None)
    }

    async fn record_observation(&self, observation: Observation) -> Result<()> {
        self.state.write().await.session_observation_count += 1;
        if let Some(store) = &self.store {
            store.save_observation(&observation).await?;
        }
        Ok(())
    }

    pub async fn observe_task_completion(&self, task: &str, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let relevance = {
            let vision = self.vision.read().await;
            relevance::content_relevance(task, vision.as_ref())
        };
        self.record_observation(Observation {
            session_id: self.session_id.clone(),
            timestamp: now,
            kind: ObservationType::TaskCompleted,
            subject: task.to_string(),
            content: task.to_string(),
            relevance,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
        })
        .await
    }

    pub async fn observe_file_change(&self, path: &str, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let relevance = relevance::file_relevance(path, &self.config.high_impact_globs);
        self.record_observation(Observation {
            session_id: self.session_id.clone(),
            timestamp: now,
            kind: ObservationType::FileChanged,
            subject: path.to_string(),
            content: path.to_string(),
            relevance,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
        })
        .await
    }

    pub async fn observe_decision(&self, decision: &str, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let relevance = {
            let vision = self.vision.read().await;
            relevance::content_relevance(decision, vision.as_ref())
        };
        self.record_observation(Observation {
            session_id: self.session_id.clone(),
            timestamp: now,
            kind: ObservationType::DecisionMade,
            subject: decision.to_string(),
            content: decision.to_string(),
            relevance,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        vision: Mutex<Option<Vision>>,
        state: Mutex<GuardianState>,
        checks: Mutex<Vec<AlignmentCheck>>,
        drifts: Mutex<Vec<DriftEvent>>,
    }

    #[async_trait]
    impl GuardianStore for MemoryStore {
        async fn save_vision(&self, vision: &Vision) -> Result<()> {
            *self.vision.lock().unwrap() = Some(vision.clone());
            Ok(())
        }
        async fn load_vision(&self) -> Result<Option<Vision>> {
            Ok(self.vision.lock().unwrap().clone())
        }
        async fn save_observation(&self, _observation: &Observation) -> Result<()> {
            Ok(())
        }
        async fn save_alignment_check(&self, check: &AlignmentCheck) -> Result<()> {
            self.checks.lock().unwrap().push(check.clone());
            Ok(())
        }
        async fn save_drift_event(&self, event: &DriftEvent) -> Result<()> {
            self.drifts.lock().unwrap().push(event.clone());
            Ok(())
        }
        async fn save_state(&self, state: &GuardianState) -> Result<()> {
            *self.state.lock().unwrap() = state.clone();
            Ok(())
        }
        async fn load_state(&self) -> Result<GuardianState> {
            Ok(self.state.lock().unwrap().clone())
        }
    }

    struct ScriptedLlm {
        response: String,
    }

    #[async_trait]
    impl LLMClient for ScriptedLlm {
        async fn complete(&self, _cancel: &CancellationToken, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
        async fn complete_with_system(&self, _cancel: &CancellationToken, _system: &str, _user: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn sample_vision() -> Vision {
        Vision::new("ship reliable software".to_string(), "teams ship broken releases".to_string(), "a calmer release process".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn check_alignment_without_vision_is_skipped_with_full_score() {
        let guardian = VisionGuardian::new(GuardianConfig::default(), "session-1");
        let cancel = CancellationToken::new();
        let check = guardian.check_alignment(&cancel, Trigger::Manual, "ship feature", None, Utc::now()).await.unwrap();
        assert_eq!(check.result, CheckResult::Skipped);
        assert_eq!(check.score, 1.0);
    }

    #[tokio::test]
    async fn check_alignment_without_model_is_passed_at_point_eight() {
        let mut guardian = VisionGuardian::new(GuardianConfig::default(), "session-1");
        guardian.set_vision(sample_vision(), Utc::now()).await.unwrap();
        let cancel = CancellationToken::new();
        let check = guardian.check_alignment(&cancel, Trigger::Manual, "ship feature", None, Utc::now()).await.unwrap();
        assert_eq!(check.result, CheckResult::Passed);
        assert_eq!(check.score, 0.8);
        assert!(check.explanation.contains("degraded"));
    }

    #[tokio::test]
    async fn scenario_5_alignment_decision_end_to_end() {
        let mut guardian = VisionGuardian::new(GuardianConfig::default(), "session-1");
        guardian.set_vision(sample_vision(), Utc::now()).await.unwrap();
        guardian.set_llm(Box::new(ScriptedLlm { response: "SCORE: 0.65\nRESULT: warning\nEXPLANATION: Minor issue\nSUGGESTIONS: none".to_string() }));
        let cancel = CancellationToken::new();
        let check = guardian.check_alignment(&cancel, Trigger::Manual, "ship feature", None, Utc::now()).await.unwrap();
        assert_eq!(check.result, CheckResult::Warning);
        assert_eq!(check.score, 0.65);
        assert!(check.suggestions.is_empty());
    }

    #[tokio::test]
    async fn blocked_result_is_surfaced_as_an_error() {
        let mut guardian = VisionGuardian::new(GuardianConfig::default(), "session-1");
        guardian.set_vision(sample_vision(), Utc::now()).await.unwrap();
        guardian.set_llm(Box::new(ScriptedLlm { response: "SCORE: 0.1\nRESULT: blocked\nEXPLANATION: severe drift\nSUGGESTIONS: none".to_string() }));
        let cancel = CancellationToken::new();
        let err = guardian.check_alignment(&cancel, Trigger::Manual, "ship feature", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::AlignmentBlocked(_)));
    }

    #[tokio::test]
    async fn scenario_6_periodic_trigger_fires_on_second_call() {
        let mut guardian = VisionGuardian::new(GuardianConfig { periodic_interval: 2, ..GuardianConfig::default() }, "session-1");
        guardian.set_vision(sample_vision(), Utc::now()).await.unwrap();
        guardian.set_llm(Box::new(ScriptedLlm { response: "SCORE: 0.9\nRESULT: passed\nEXPLANATION: fine\nSUGGESTIONS: none".to_string() }));
        let cancel = CancellationToken::new();

        let first = guardian.on_task_complete(&cancel, "task one", Utc::now()).await.unwrap();
        assert!(first.is_none());
        let second = guardian.on_task_complete(&cancel, "task two", Utc::now()).await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn periodic_checks_fire_floor_n_over_m_times() {
        let mut guardian = VisionGuardian::new(GuardianConfig { periodic_interval: 3, ..GuardianConfig::default() }, "session-1");
        guardian.set_vision(sample_vision(), Utc::now()).await.unwrap();
        guardian.set_llm(Box::new(ScriptedLlm { response: "SCORE: 0.9\nRESULT: passed\nEXPLANATION: fine\nSUGGESTIONS: none".to_string() }));
        let cancel = CancellationToken::new();

        let total_calls = 8; // floor(8/3) == 2
        let mut fired = 0;
        for i in 0..total_calls {
            if guardian.on_task_complete(&cancel, &format!("task {i}"), Utc::now()).await.unwrap().is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, total_calls / 3);
    }

    #[tokio::test]
    async fn restore_reloads_vision_and_state_from_the_store() {
        let store = MemoryStore::default();
        *store.vision.lock().unwrap() = Some(sample_vision());
        let mut guardian = VisionGuardian::new(GuardianConfig::default(), "session-1");
        guardian.set_store(Box::new(store));
        guardian.restore().await.unwrap();
        let cancel = CancellationToken::new();
        let check = guardian.check_alignment(&cancel, Trigger::Manual, "x", None, Utc::now()).await.unwrap();
        assert_eq!(check.result, CheckResult::Passed);
    }
}

//! `SqliteStore`: the one concrete durable-store adapter, implementing
//! `GuardianStore` + `LearningStore` + `LocalStore` over a single SQLite
//! file (spec.md §6, SPEC_FULL.md §6.1).
//!
//! DESIGN DECISION: `Arc<Mutex<Connection>>` guarding one connection, not a
//! pool — grounded in the teacher's `shared_knowledge::database::KnowledgeDatabase`
//! (same structure, same reasoning: SQLite connections aren't `Send` across
//! uncoordinated threads, WAL mode makes single-writer contention cheap).
//! Queries are small single-row reads/writes, so they run inline on the
//! async call site rather than hopping to a blocking pool, matching the
//! teacher's own `KnowledgeDatabase` methods.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::collaborators::{GuardianStore, LearningStore, LocalStore};
use crate::error::{Error, Result};
use crate::facts::{Fact, Value};
use crate::guardian::vision::{AlignmentCheck, DriftEvent, GuardianState, Observation, Vision};

use super::schema;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        schema::configure_connection(&conn)?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::configure_connection(&conn)?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

#[async_trait]
impl GuardianStore for SqliteStore {
    async fn save_vision(&self, vision: &Vision) -> Result<()> {
        let json = serde_json::to_string(vision)?;
        let created = to_timestamp(vision.created);
        let updated = to_timestamp(vision.updated);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO vision (id, vision_json, created, updated) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET vision_json = excluded.vision_json, updated = excluded.updated",
            params![json, created, updated],
        )?;
        Ok(())
    }

    async fn load_vision(&self) -> Result<Option<Vision>> {
        let conn = self.lock();
        let json: Option<String> = conn
            .query_row("SELECT vision_json FROM vision WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_observation(&self, observation: &Observation) -> Result<()> {
        let json = serde_json::to_string(observation)?;
        let timestamp = to_timestamp(observation.timestamp);
        let kind = format!("{:?}", observation.kind);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO observations (session_id, kind, timestamp, observation_json) VALUES (?1, ?2, ?3, ?4)",
            params![observation.session_id, kind, timestamp, json],
        )?;
        Ok(())
    }

    async fn save_alignment_check(&self, check: &AlignmentCheck) -> Result<()> {
        let json = serde_json::to_string(check)?;
        let timestamp = to_timestamp(check.timestamp);
        let result = format!("{:?}", check.result);
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO alignment_checks (id, timestamp, result, check_json) VALUES (?1, ?2, ?3, ?4)",
            params![check.id.to_string(), timestamp, result, json],
        )?;
        Ok(())
    }

    async fn save_drift_event(&self, event: &DriftEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let severity = format!("{:?}", event.severity);
        let related = event.related_check_id.map(|id| id.to_string());
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO drift_events (id, severity, resolved, related_check_id, event_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![event.id.to_string(), severity, event.resolved, related, json],
        )?;
        Ok(())
    }

    async fn save_state(&self, state: &GuardianState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO guardian_state (id, state_json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json",
            params![json],
        )?;
        Ok(())
    }

    async fn load_state(&self) -> Result<GuardianState> {
        let conn = self.lock();
        let json: Option<String> = conn
            .query_row("SELECT state_json FROM guardian_state WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(GuardianState::default()),
        }
    }
}

#[async_trait]
impl LearningStore for SqliteStore {
    async fn save(&self, shard_name: &str, kind: &str, args: Vec<String>, extra: serde_json::Value) -> Result<()> {
        let args_json = serde_json::to_string(&args)?;
        let extra_json = serde_json::to_string(&extra)?;
        let created_at = Utc::now().timestamp();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO learning_patterns (shard_name, kind, args, extra, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![shard_name, kind, args_json, extra_json, created_at],
        )?;
        Ok(())
    }

    async fn load_by_predicate(&self, shard_name: &str, kind: &str) -> Result<Vec<Fact>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT args FROM learning_patterns WHERE shard_name = ?1 AND kind = ?2")?;
        let rows = stmt.query_map(params![shard_name, kind], |row| row.get::<_, String>(0))?;

        let mut facts = Vec::new();
        for row in rows {
            let args_json = row.map_err(Error::from)?;
            let args: Vec<String> = serde_json::from_str(&args_json)?;
            facts.push(Fact::new(kind, args.into_iter().map(Value::from).collect()));
        }
        Ok(facts)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn store_vector(&self, text: &str, metadata: serde_json::Value) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&metadata)?;
        let created_at = Utc::now().timestamp();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO vectors (id, text, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, text, metadata_json, created_at],
        )?;
        Ok(())
    }

    async fn store_vector_with_embedding(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.store_vector(text, metadata).await
    }

    async fn store_link(&self, subject: &str, predicate: &str, object: &str, confidence: f64, metadata: serde_json::Value) -> Result<()> {
        let metadata_json = serde_json::to_string(&metadata)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO links (subject, predicate, object, confidence, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subject, predicate, object, confidence, metadata_json],
        )?;
        Ok(())
    }

    async fn store_fact(&self, predicate: &str, args: Vec<String>, source: &str, priority: i64) -> Result<()> {
        let args_json = serde_json::to_string(&args)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO stored_facts (predicate, args, source, priority) VALUES (?1, ?2, ?3, ?4)",
            params![predicate, args_json, source, priority],
        )?;
        Ok(())
    }

    async fn store_knowledge_atom(&self, source: &str, content: &str, confidence: f64) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let atom_json = serde_json::json!({
            "source": source,
            "content": content,
            "confidence": confidence,
            "extracted_at": Utc::now().to_rfc3339(),
        })
        .to_string();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ingested_docs (id, source, confidence, atom_json) VALUES (?1, ?2, ?3, ?4)",
            params![id, source, confidence, atom_json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardian::vision::{CheckResult, DriftSeverity, ObservationType, Trigger};

    fn sample_vision() -> Vision {
        Vision::new("mission".to_string(), "problem".to_string(), "vision statement".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn vision_round_trips_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load_vision().await.unwrap().is_none());

        let vision = sample_vision();
        store.save_vision(&vision).await.unwrap();
        let loaded = store.load_vision().await.unwrap().unwrap();
        assert_eq!(loaded, vision);
    }

    #[tokio::test]
    async fn guardian_state_round_trips_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let state = GuardianState {
            vision_defined: true,
            last_check: Some(Utc::now()),
            tasks_since_check: 4,
            active_drift_count: 2,
            overall_alignment: 0.73,
            session_observation_count: 11,
        };
        store.save_state(&state).await.unwrap();
        let loaded = store.load_state().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn alignment_check_and_drift_event_round_trip_on_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let check = AlignmentCheck {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            trigger: Trigger::HighImpact,
            subject: "rewrite auth".to_string(),
            context: Some("migrations/0005.sql".to_string()),
            result: CheckResult::Warning,
            score: 0.55,
            explanation: "touches a high-impact path".to_string(),
            suggestions: vec!["add a rollback plan".to_string()],
            duration: std::time::Duration::from_millis(42),
        };
        store.save_alignment_check(&check).await.unwrap();
        let conn = store.lock();
        let json: String = conn.query_row("SELECT check_json FROM alignment_checks WHERE id = ?1", params![check.id.to_string()], |row| row.get(0)).unwrap();
        drop(conn);
        let loaded: AlignmentCheck = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, check);

        let event = DriftEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity: DriftSeverity::Moderate,
            category: "high_impact".to_string(),
            description: check.explanation.clone(),
            evidence: check.suggestions.clone(),
            related_check_id: Some(check.id),
            resolved: false,
            resolved_at: None,
            resolution: None,
        };
        store.save_drift_event(&event).await.unwrap();
        let conn = store.lock();
        let json: String = conn.query_row("SELECT event_json FROM drift_events WHERE id = ?1", params![event.id.to_string()], |row| row.get(0)).unwrap();
        drop(conn);
        let loaded_event: DriftEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded_event, event);
    }

    #[tokio::test]
    async fn observation_round_trips_on_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let observation = Observation {
            session_id: "session-9".to_string(),
            timestamp: Utc::now(),
            kind: ObservationType::FileChanged,
            subject: "src/lib.rs".to_string(),
            content: "src/lib.rs".to_string(),
            relevance: 0.9,
            tags: vec!["rust".to_string()],
            metadata: serde_json::json!({"lines_changed": 12}),
        };
        store.save_observation(&observation).await.unwrap();
        let conn = store.lock();
        let json: String = conn.query_row("SELECT observation_json FROM observations WHERE subject = ?1", params![observation.subject], |row| row.get(0)).unwrap();
        drop(conn);
        let loaded: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, observation);
    }

    #[tokio::test]
    async fn saving_vision_twice_upserts_the_single_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut vision = sample_vision();
        store.save_vision(&vision).await.unwrap();
        vision.mission = "revised mission".to_string();
        store.save_vision(&vision).await.unwrap();

        let loaded = store.load_vision().await.unwrap().unwrap();
        assert_eq!(loaded.mission, "revised mission");

        let conn = store.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vision", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn guardian_state_defaults_when_never_saved() {
        let store = SqliteStore::open_in_memory().unwrap();
        let state = store.load_state().await.unwrap();
        assert_eq!(state.overall_alignment, 1.0);
    }

    #[tokio::test]
    async fn alignment_checks_and_drift_events_persist() {
        let store = SqliteStore::open_in_memory().unwrap();
        let check = AlignmentCheck {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            trigger: Trigger::Manual,
            subject: "ship feature".to_string(),
            context: None,
            result: CheckResult::Blocked,
            score: 0.1,
            explanation: "severe drift".to_string(),
            suggestions: vec!["stop".to_string()],
            duration: std::time::Duration::from_millis(5),
        };
        store.save_alignment_check(&check).await.unwrap();

        let event = DriftEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity: DriftSeverity::from_score(check.score),
            category: "manual".to_string(),
            description: check.explanation.clone(),
            evidence: check.suggestions.clone(),
            related_check_id: Some(check.id),
            resolved: false,
            resolved_at: None,
            resolution: None,
        };
        store.save_drift_event(&event).await.unwrap();

        let conn = store.lock();
        let events: i64 = conn.query_row("SELECT COUNT(*) FROM drift_events", [], |row| row.get(0)).unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    async fn observations_accumulate_without_overwriting() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .save_observation(&Observation {
                    session_id: "session-1".to_string(),
                    timestamp: Utc::now(),
                    kind: ObservationType::TaskCompleted,
                    subject: format!("task {i}"),
                    content: format!("task {i}"),
                    relevance: 0.5,
                    tags: Vec::new(),
                    metadata: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        let conn = store.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn learning_store_filters_by_shard_and_kind() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save("tester", "flaky_test", vec!["tests::foo".to_string()], serde_json::json!({})).await.unwrap();
        store.save("research", "flaky_test", vec!["unrelated".to_string()], serde_json::json!({})).await.unwrap();

        let facts = store.load_by_predicate("tester", "flaky_test").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].args, vec![Value::from("tests::foo".to_string())]);
    }

    #[tokio::test]
    async fn knowledge_atoms_land_in_ingested_docs() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_knowledge_atom("https://github.com/foo/bar", "body text", 0.8).await.unwrap();

        let conn = store.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ingested_docs", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}

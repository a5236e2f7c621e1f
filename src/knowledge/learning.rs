//! Autopoiesis: per-shard self-reinforcement bookkeeping (spec.md §4.1
//! "Learning", §9 "Global counters → owned maps").
//!
//! DESIGN DECISION: counters are owned `HashMap` fields on a struct the
//! research shard holds for its lifetime, not free-standing globals —
//! per spec.md §9's explicit redesign note for this exact pattern.
//! Persistence happens only through the `LearningStore` contract.

use std::collections::HashMap;

use crate::collaborators::LearningStore;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct Autopoiesis {
    topic_quality: HashMap<String, f64>,
    source_reliability: HashMap<String, u32>,
    source_failures: HashMap<String, u32>,
    query_failures: HashMap<String, u32>,
}

impl Autopoiesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exponential blend `0.7*old + 0.3*new`; first observation seeds the map.
    pub fn update_topic_quality(&mut self, topic: &str, observed: f64) {
        let entry = self.topic_quality.entry(topic.to_string()).or_insert(observed);
        *entry = 0.7 * *entry + 0.3 * observed;
    }

    /// Increment source reliability (and clear its failure count) on a
    /// confident atom (`>= 0.7`); increment source failures on a weak one
    /// (`< 0.4`).
    pub fn record_atom_outcome(&mut self, source: &str, confidence: f64) {
        if confidence >= 0.7 {
            *self.source_reliability.entry(source.to_string()).or_insert(0) += 1;
            self.source_failures.remove(source);
        } else if confidence < 0.4 {
            *self.source_failures.entry(source.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment query-failure count when a query produced zero atoms.
    pub fn record_query_result(&mut self, query: &str, atom_count: usize) {
        if atom_count == 0 {
            *self.query_failures.entry(query.to_string()).or_insert(0) += 1;
        }
    }

    pub fn reliable_source_count(&self) -> usize {
        self.source_reliability.values().filter(|&&n| n >= 3).count()
    }

    pub fn preferred_topics(&self) -> Vec<String> {
        self.topic_quality
            .iter()
            .filter(|(_, &q)| q >= 0.7)
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn difficult_topics(&self) -> Vec<String> {
        self.topic_quality
            .iter()
            .filter(|(_, &q)| q < 0.4)
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn reliable_sources(&self) -> Vec<String> {
        self.source_reliability
            .iter()
            .filter(|(_, &n)| n >= 3)
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn unreliable_sources(&self) -> Vec<String> {
        self.source_failures
            .iter()
            .filter(|(_, &n)| n >= 2)
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn failing_queries(&self) -> Vec<String> {
        self.query_failures
            .iter()
            .filter(|(_, &n)| n >= 2)
            .map(|(q, _)| q.clone())
            .collect()
    }

    /// Persist every promotion-worthy entry through the learning store.
    pub async fn persist(&self, store: &dyn LearningStore, shard_name: &str) -> Result<()> {
        for topic in self.preferred_topics() {
            store
                .save(shard_name, "preferred_topic", vec![topic], serde_json::Value::Null)
                .await?;
        }
        for topic in self.difficult_topics() {
            store
                .save(shard_name, "difficult_topic", vec![topic], serde_json::Value::Null)
                .await?;
        }
        for source in self.reliable_sources() {
            store
                .save(shard_name, "reliable_source", vec![source], serde_json::Value::Null)
                .await?;
        }
        for source in self.unreliable_sources() {
            store
                .save(shard_name, "unreliable_source", vec![source], serde_json::Value::Null)
                .await?;
        }
        for query in self.failing_queries() {
            store
                .save(shard_name, "failing_query", vec![query], serde_json::Value::Null)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    #[async_trait]
    impl LearningStore for RecordingStore {
        async fn save(&self, shard_name: &str, kind: &str, args: Vec<String>, _extra: serde_json::Value) -> Result<()> {
            self.saved
                .lock()
                .unwrap()
                .push((shard_name.to_string(), kind.to_string(), args));
            Ok(())
        }

        async fn load_by_predicate(&self, _shard_name: &str, _kind: &str) -> Result<Vec<crate::facts::Fact>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn topic_quality_blends_exponentially() {
        let mut tracker = Autopoiesis::new();
        tracker.update_topic_quality("rust", 0.9);
        tracker.update_topic_quality("rust", 0.9);
        assert!(tracker.preferred_topics().contains(&"rust".to_string()));
    }

    #[test]
    fn weak_topic_becomes_difficult() {
        let mut tracker = Autopoiesis::new();
        tracker.update_topic_quality("edge-case-topic", 0.1);
        assert!(tracker.difficult_topics().contains(&"edge-case-topic".to_string()));
    }

    #[test]
    fn confident_atom_clears_prior_failures() {
        let mut tracker = Autopoiesis::new();
        tracker.record_atom_outcome("example.com", 0.2);
        tracker.record_atom_outcome("example.com", 0.2);
        assert!(tracker.unreliable_sources().contains(&"example.com".to_string()));

        tracker.record_atom_outcome("example.com", 0.8);
        assert!(!tracker.unreliable_sources().contains(&"example.com".to_string()));
    }

    #[test]
    fn reliable_source_needs_three_confident_atoms() {
        let mut tracker = Autopoiesis::new();
        for _ in 0..3 {
            tracker.record_atom_outcome("docs.rs", 0.8);
        }
        assert!(tracker.reliable_sources().contains(&"docs.rs".to_string()));
        assert_eq!(tracker.reliable_source_count(), 1);
    }

    #[tokio::test]
    async fn persist_writes_every_category() {
        let mut tracker = Autopoiesis::new();
        tracker.update_topic_quality("rust", 0.9);
        tracker.record_atom_outcome("docs.rs", 0.9);
        tracker.record_atom_outcome("docs.rs", 0.9);
        tracker.record_atom_outcome("docs.rs", 0.9);
        tracker.record_query_result("dead query", 0);
        tracker.record_query_result("dead query", 0);

        let store = RecordingStore::default();
        tracker.persist(&store, "research").await.unwrap();

        let saved = store.saved.lock().unwrap();
        assert!(saved.iter().any(|(_, kind, _)| kind == "preferred_topic"));
        assert!(saved.iter().any(|(_, kind, _)| kind == "reliable_source"));
        assert!(saved.iter().any(|(_, kind, _)| kind == "failing_query"));
    }
}

//! Tester-scoped autopoiesis (spec.md §4.2 "Autopoiesis", §9 "Global
//! counters → owned maps"). Parallel structure to `knowledge::learning::Autopoiesis`,
//! but normalizes test names/messages instead of research topics/sources.

use std::collections::HashMap;

use regex::Regex;

use crate::collaborators::LearningStore;
use crate::error::Result;

const FAILURE_SATURATION: u32 = 3;
const SUCCESS_SATURATION: u32 = 5;

/// Collapse digits to `N`, lowercase, truncate to 100 chars — so
/// "expected 1, got 2" and "expected 42, got 7" land on the same pattern.
pub fn normalize_failure_message(message: &str) -> String {
    let digits = Regex::new(r"\d+").expect("static regex");
    let collapsed = digits.replace_all(message, "N").to_lowercase();
    collapsed.chars().take(100).collect()
}

pub fn normalize_test_name(name: &str) -> String {
    name.chars().take(100).collect()
}

#[derive(Debug, Clone, Default)]
pub struct TesterAutopoiesis {
    failure_patterns: HashMap<String, u32>,
    success_patterns: HashMap<String, u32>,
}

impl TesterAutopoiesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore counters previously saturated and persisted to the learning
    /// store (spec.md §4.2: "On shard creation with a learning store bound,
    /// restore counters from the store.").
    pub async fn restore(store: &dyn LearningStore, shard_name: &str) -> Result<Self> {
        let mut tracker = Self::new();
        for fact in store.load_by_predicate(shard_name, "avoid_pattern").await? {
            if let Some(crate::facts::Value::Str(pattern)) = fact.args.first() {
                tracker.failure_patterns.insert(pattern.clone(), FAILURE_SATURATION);
            }
        }
        for fact in store.load_by_predicate(shard_name, "test_template").await? {
            if let Some(crate::facts::Value::Str(pattern)) = fact.args.first() {
                tracker.success_patterns.insert(pattern.clone(), SUCCESS_SATURATION);
            }
        }
        Ok(tracker)
    }

    pub fn record_failure(&mut self, message: &str) {
        let pattern = normalize_failure_message(message);
        *self.failure_patterns.entry(pattern).or_insert(0) += 1;
    }

    pub fn record_success(&mut self, test_name: &str) {
        let pattern = normalize_test_name(test_name);
        *self.success_patterns.entry(pattern).or_insert(0) += 1;
    }

    fn saturated_failures(&self) -> Vec<String> {
        self.failure_patterns.iter().filter(|(_, &n)| n >= FAILURE_SATURATION).map(|(p, _)| p.clone()).collect()
    }

    fn saturated_successes(&self) -> Vec<String> {
        self.success_patterns.iter().filter(|(_, &n)| n >= SUCCESS_SATURATION).map(|(p, _)| p.clone()).collect()
    }

    /// `promote_to_long_term(avoid_pattern|test_template, <pattern>)` facts
    /// for every saturated counter (spec.md §4.2 "Fact emission").
    pub fn promotions(&self) -> Vec<(&'static str, String)> {
        let mut out: Vec<(&'static str, String)> = self.saturated_failures().into_iter().map(|p| ("avoid_pattern", p)).collect();
        out.extend(self.saturated_successes().into_iter().map(|p| ("test_template", p)));
        out
    }

    pub async fn persist(&self, store: &dyn LearningStore, shard_name: &str) -> Result<()> {
        for (kind, pattern) in self.promotions() {
            store.save(shard_name, kind, vec![pattern], serde_json::Value::Null).await?;
        }
        Ok(())
    }
}

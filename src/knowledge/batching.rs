//! Adaptive batching (spec.md §4.1 "Adaptive batching").

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "advanced",
    "architecture",
    "concurrent",
    "distributed",
    "optimization",
    "security",
    "protocol",
    "algorithm",
    "internals",
    "low-level",
    "performance",
    "memory",
    "async",
    "parallel",
    "threading",
];

fn topic_complexity(topic: &str) -> f64 {
    let word_count = topic.split_whitespace().count();
    let mut score = (word_count as f64 / 10.0).min(0.5);
    let lowered = topic.to_lowercase();
    if COMPLEXITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        score += 0.1;
    }
    score
}

/// Aggregate history fed into the `performance` term. All fields are raw
/// counters/sums the caller accumulates across past sessions.
#[derive(Debug, Clone, Default)]
pub struct BatchingHistory {
    pub quality_score_sum: f64,
    pub quality_score_count: usize,
    pub failed_queries: usize,
    pub reliable_sources: usize,
}

impl BatchingHistory {
    fn has_history(&self) -> bool {
        self.quality_score_count > 0
    }

    fn avg_quality(&self) -> f64 {
        if self.quality_score_count == 0 {
            0.0
        } else {
            self.quality_score_sum / self.quality_score_count as f64
        }
    }

    fn performance(&self) -> f64 {
        let mut performance = if self.has_history() {
            0.3 + self.avg_quality() * 0.5
        } else {
            0.5
        };

        let total = self.quality_score_count + self.failed_queries;
        performance -= 0.3 * (self.failed_queries as f64 / (total.max(1)) as f64);

        if self.reliable_sources >= 3 {
            performance += 0.1;
        }

        performance.clamp(0.1, 1.0)
    }
}

/// Compute the batch size for `topics.len()` topics, in `[1, min(4, N)]`.
pub fn adaptive_batch_size(topics: &[String], history: &BatchingHistory) -> usize {
    if topics.is_empty() {
        return 0;
    }

    let complexity = topics.iter().map(|t| topic_complexity(t)).sum::<f64>() / topics.len() as f64;
    let performance = history.performance();
    let combined = (1.0 - complexity) * 0.4 + performance * 0.6;
    let batch = (1.0 + combined * 3.0).clamp(1.0, 4.0) as usize;
    batch.min(topics.len())
}

/// Sleep duration between batches (not applied after the last batch).
pub const INTER_BATCH_SLEEP: std::time::Duration = std::time::Duration::from_millis(500);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_never_exceeds_four_or_topic_count() {
        for n in 0..10 {
            let topics: Vec<String> = (0..n).map(|i| format!("topic {i}")).collect();
            let history = BatchingHistory::default();
            let batch = adaptive_batch_size(&topics, &history);
            assert!(batch <= 4);
            assert!(batch <= topics.len());
            if n > 0 {
                assert!(batch >= 1);
            } else {
                assert_eq!(batch, 0);
            }
        }
    }

    #[test]
    fn complex_topics_shrink_batch_relative_to_simple_ones() {
        let simple = vec!["setup".to_string()];
        let complex = vec!["advanced distributed concurrent architecture optimization internals".to_string()];
        let history = BatchingHistory::default();
        assert!(adaptive_batch_size(&complex, &history) <= adaptive_batch_size(&simple, &history));
    }

    #[test]
    fn strong_history_increases_batch_size_over_no_history() {
        let topics = vec!["topic a".to_string(), "topic b".to_string(), "topic c".to_string()];
        let weak = BatchingHistory::default();
        let strong = BatchingHistory {
            quality_score_sum: 9.0,
            quality_score_count: 10,
            failed_queries: 0,
            reliable_sources: 5,
        };
        assert!(adaptive_batch_size(&topics, &strong) >= adaptive_batch_size(&topics, &weak));
    }
}

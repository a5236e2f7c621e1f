//! Exponential backoff with jitter (spec.md §2, §5: "Retry backoff doubles
//! from 1s to a cap of 8s, with up to 3 attempts. Cancellation always wins
//! over a pending backoff.").
//!
//! DESIGN DECISION: generalize the teacher's `AgentConnection::retry_with_backoff`
//! (`agent_network.rs`: `100ms * 2^retry_count`, capped by `max_retries`) into a
//! reusable policy object rather than re-deriving the doubling arithmetic at
//! each call site, and add jitter since this policy wraps network calls
//! (github, package indexes, web search) rather than the teacher's
//! same-process agent queries.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given (zero-indexed) retry attempt, doubling from
    /// `base` and capped at `cap`, with up to 20% jitter to avoid thundering
    /// herds against the same upstream host.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = doubled.min(self.cap);
        let jitter_frac = rand::thread_rng().gen_range(0.0..0.2);
        capped.mul_f64(1.0 - jitter_frac)
    }

    /// Run `op` up to `max_attempts` times, sleeping with exponential
    /// backoff between attempts, honoring cancellation at every suspension
    /// point (the sleep, and implicitly the operation itself).
    ///
    /// `is_retryable` decides whether a given error is worth retrying; the
    /// final attempt's error is always returned verbatim regardless.
    pub async fn retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut is_retryable: impl FnMut(&Error) -> bool,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(attempt, ?delay, error = %err, "retrying after backoff");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// Default retryability predicate matching the tester shard's test-generation
/// retry rule (spec.md §4.2 "Test generation"): retry on
/// `timeout|connection|network|temporary|rate limit|503|502|429`, and — per
/// the Open Question in spec.md §9 ("`isRetryableError` defaults to `true`
/// even for unclassified errors") — default to retryable for anything else.
pub fn default_is_retryable(err: &Error) -> bool {
    let needle = err.to_string().to_lowercase();
    const PATTERNS: &[&str] = &[
        "timeout",
        "connection",
        "network",
        "temporary",
        "rate limit",
        "503",
        "502",
        "429",
    ];
    if PATTERNS.iter().any(|p| needle.contains(p)) {
        return true;
    }
    // Conservative default kept intentionally per spec.md §9 Open Question (2).
    true
}

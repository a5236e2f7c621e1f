//! Single-permit rate limiter (spec.md §4.1.1, §9).
//!
//! DESIGN DECISION: the gate is a `tokio::sync::Semaphore` with exactly one
//! permit, not a mutex.
//! WHY: spec.md §9 is explicit — "Single-permit gate → semaphore or bounded
//! channel. Implement as an abstract 'at most one in flight' token, not as a
//! mutex; cancellation must be able to abort acquisition." A semaphore's
//! `acquire()` is cancel-safe inside `tokio::select!`/cancellation tokens in
//! a way a `Mutex::lock().await` is not guaranteed to be by contract.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-shard gate: at most one outbound model call in flight at a time.
pub struct SinglePermitGate {
    semaphore: Arc<Semaphore>,
}

impl Default for SinglePermitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SinglePermitGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Acquire the single permit, honoring cancellation while waiting.
    pub async fn acquire<'a>(&'a self, cancel: &CancellationToken) -> Result<SemaphorePermit<'a>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| Error::Internal("rate limiter semaphore closed".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_permit_available_at_a_time() {
        let gate = SinglePermitGate::new();
        let cancel = CancellationToken::new();

        let first = gate.acquire(&cancel).await.unwrap();
        assert_eq!(gate.semaphore.available_permits(), 0);
        drop(first);
        assert_eq!(gate.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_a_pending_acquire() {
        let gate = SinglePermitGate::new();
        let cancel = CancellationToken::new();

        let _held = gate.acquire(&cancel).await.unwrap();
        cancel.cancel();
        let result = gate.acquire(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

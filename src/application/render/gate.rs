use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::gauge;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) const IN_FLIGHT_GAUGE: &str = "folio_render_in_flight";

/// Bounded admission for engine invocations.
///
/// Waiters are admitted first-come-first-served (tokio's semaphore is fair).
/// A waiter that is not admitted within `queue_wait` gives up without ever
/// touching the engine.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    queue_wait: Duration,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no render slot became free within {waited:?}")]
    QueueTimeout { waited: Duration },
    #[error("render gate closed")]
    Closed,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize, queue_wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            queue_wait,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free. Informational only; never blocks.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn acquire(&self) -> Result<GateSlot, GateError> {
        let started_at = Instant::now();
        let permit = tokio::time::timeout(self.queue_wait, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| GateError::QueueTimeout {
                waited: started_at.elapsed(),
            })?
            .map_err(|_| GateError::Closed)?;

        gauge!(IN_FLIGHT_GAUGE).increment(1.0);
        Ok(GateSlot {
            _permit: permit,
            waited: started_at.elapsed(),
        })
    }
}

/// Held for the duration of one engine call. Dropping it frees the slot,
/// including when the owning request is cancelled.
#[derive(Debug)]
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl GateSlot {
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for GateSlot {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_GAUGE).decrement(1.0);
    }
}

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::FutureExt;
use tracing::warn;

use crate::domain::{
    document::{RenderRequest, RenderResult},
    error::RenderError,
};

use super::engine::{EngineFault, RenderEngine};

/// Sole failure-isolation point between caller markup and the engine.
///
/// Enforces the per-call wall-clock timeout and artifact ceiling, contains
/// panics raised by in-process engines, and rejects empty artifacts.
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn RenderEngine>,
    timeout: Duration,
    max_artifact_bytes: u64,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn RenderEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            max_artifact_bytes: u64::MAX,
        }
    }

    /// Artifacts larger than `limit` fail with `ResourceExhausted`.
    pub fn with_max_artifact_bytes(mut self, limit: u64) -> Self {
        self.max_artifact_bytes = limit;
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let started_at = Instant::now();
        let call = AssertUnwindSafe(self.engine.render(request)).catch_unwind();

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => Err(EngineFault::Panicked(panic_message(payload.as_ref()))),
            Err(_) => {
                warn!(
                    target = "folio::render::adapter",
                    engine = self.engine.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Render engine call timed out"
                );
                return Err(RenderError::engine_timeout(format!(
                    "rendering did not finish within {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        let outcome = outcome.and_then(|artifact| {
            if artifact.len() as u64 > self.max_artifact_bytes {
                Err(EngineFault::ArtifactTooLarge {
                    limit: self.max_artifact_bytes,
                })
            } else {
                Ok(artifact)
            }
        });

        match outcome {
            Ok(artifact) => RenderResult::from_artifact(artifact).ok_or_else(|| {
                warn!(
                    target = "folio::render::adapter",
                    engine = self.engine.name(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Render engine returned an empty artifact"
                );
                RenderError::engine_crash("render engine produced no output")
            }),
            Err(fault) => {
                warn!(
                    target = "folio::render::adapter",
                    engine = self.engine.name(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = fault.code(),
                    error = %fault,
                    "Render engine fault"
                );
                Err(map_fault(fault))
            }
        }
    }
}

fn map_fault(fault: EngineFault) -> RenderError {
    match fault {
        EngineFault::Crashed { .. } | EngineFault::Panicked(_) => {
            RenderError::engine_crash("render engine failed on this document")
        }
        EngineFault::OutOfMemory { .. } => {
            RenderError::resource_exhausted("render engine ran out of memory")
        }
        EngineFault::ArtifactTooLarge { limit } => {
            RenderError::resource_exhausted(format!("rendered document exceeds {limit} bytes"))
        }
        EngineFault::Unavailable { detail } => {
            RenderError::internal(format!("render engine unavailable: {detail}"))
        }
        EngineFault::Io(err) => RenderError::internal(format!("render engine i/o: {err}")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

use std::time::{Duration, Instant};

use folio_api_types::RenderRequestBody;
use metrics::{counter, histogram};
use tracing::{error, info, warn};

use crate::{
    application::validate::RequestValidator,
    domain::{
        document::{RenderRequest, RenderResult},
        error::{RenderError, RenderErrorKind},
    },
};

use super::{
    adapter::EngineAdapter,
    gate::{ConcurrencyGate, GateError},
};

pub(crate) const RENDER_TOTAL: &str = "folio_render_total";
pub(crate) const RENDER_DURATION_MS: &str = "folio_render_duration_ms";
pub(crate) const RENDER_QUEUE_WAIT_MS: &str = "folio_render_queue_wait_ms";

/// A successful render together with the request that produced it, so the
/// transport can derive download names and echo caller metadata.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub request: RenderRequest,
    pub result: RenderResult,
}

/// The request pipeline: validate, wait for a slot, render, release.
///
/// Each call is a single attempt. Whether to retry is up to the caller,
/// guided by [`RenderError::retryable`].
#[derive(Clone)]
pub struct RenderOrchestrator {
    validator: RequestValidator,
    adapter: EngineAdapter,
    gate: ConcurrencyGate,
}

impl RenderOrchestrator {
    pub fn new(validator: RequestValidator, adapter: EngineAdapter, gate: ConcurrencyGate) -> Self {
        Self {
            validator,
            adapter,
            gate,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    pub async fn handle(&self, raw: RenderRequestBody) -> Result<RenderedDocument, RenderError> {
        let started_at = Instant::now();
        let content_bytes = raw.content.as_ref().map_or(0, String::len);

        let request = match self.validator.validate(raw) {
            Ok(request) => request,
            Err(err) => {
                record_rejection(&err, content_bytes);
                return Err(err);
            }
        };

        let mut cancel_watch = CancelWatch::armed(content_bytes);

        let slot = match self.gate.acquire().await {
            Ok(slot) => slot,
            Err(GateError::QueueTimeout { waited }) => {
                cancel_watch.disarm();
                let err = RenderError::resource_exhausted(format!(
                    "all {} render slots stayed busy for {} ms",
                    self.gate.capacity(),
                    waited.as_millis()
                ));
                record_failure(&err, started_at.elapsed(), waited, content_bytes);
                return Err(err);
            }
            Err(GateError::Closed) => {
                cancel_watch.disarm();
                let err = RenderError::internal("render gate closed");
                record_failure(&err, started_at.elapsed(), Duration::ZERO, content_bytes);
                return Err(err);
            }
        };
        let queued = slot.waited();
        histogram!(RENDER_QUEUE_WAIT_MS).record(queued.as_millis() as f64);

        let outcome = self.adapter.render(&request).await;
        drop(slot);
        cancel_watch.disarm();

        let elapsed = started_at.elapsed();
        histogram!(RENDER_DURATION_MS).record(elapsed.as_millis() as f64);

        match outcome {
            Ok(result) => {
                counter!(RENDER_TOTAL, "outcome" => "succeeded").increment(1);
                info!(
                    target = "folio::render",
                    op = "render::handle",
                    result = "succeeded",
                    engine = self.adapter.engine_name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    queue_ms = queued.as_millis() as u64,
                    content_bytes,
                    artifact_bytes = result.byte_length(),
                    page_size = %request.options().page_size,
                    "Document rendered"
                );
                Ok(RenderedDocument { request, result })
            }
            Err(err) => {
                record_failure(&err, elapsed, queued, content_bytes);
                Err(err)
            }
        }
    }
}

fn record_rejection(err: &RenderError, content_bytes: usize) {
    counter!(RENDER_TOTAL, "outcome" => "rejected", "kind" => err.kind().as_str()).increment(1);
    warn!(
        target = "folio::render",
        op = "render::handle",
        result = "rejected",
        kind = %err.kind(),
        content_bytes,
        detail = err.message(),
        "Render request rejected"
    );
}

fn record_failure(err: &RenderError, elapsed: Duration, queued: Duration, content_bytes: usize) {
    counter!(RENDER_TOTAL, "outcome" => "failed", "kind" => err.kind().as_str()).increment(1);
    if err.kind() == RenderErrorKind::InternalError {
        error!(
            target = "folio::render",
            op = "render::handle",
            result = "failed",
            kind = %err.kind(),
            elapsed_ms = elapsed.as_millis() as u64,
            queue_ms = queued.as_millis() as u64,
            content_bytes,
            detail = err.message(),
            "Render failed"
        );
    } else {
        warn!(
            target = "folio::render",
            op = "render::handle",
            result = "failed",
            kind = %err.kind(),
            retryable = err.retryable(),
            elapsed_ms = elapsed.as_millis() as u64,
            queue_ms = queued.as_millis() as u64,
            content_bytes,
            detail = err.message(),
            "Render failed"
        );
    }
}

/// Logs when a render is abandoned before completing, which happens when the
/// caller disconnects and the handler future is dropped.
struct CancelWatch {
    armed: bool,
    started_at: Instant,
    content_bytes: usize,
}

impl CancelWatch {
    fn armed(content_bytes: usize) -> Self {
        Self {
            armed: true,
            started_at: Instant::now(),
            content_bytes,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelWatch {
    fn drop(&mut self) {
        if self.armed {
            counter!(RENDER_TOTAL, "outcome" => "cancelled").increment(1);
            info!(
                target = "folio::render",
                op = "render::handle",
                result = "cancelled",
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                content_bytes = self.content_bytes,
                "Render abandoned by caller"
            );
        }
    }
}

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::document::RenderRequest;

/// Failures raised by a layout engine. These never cross the adapter boundary;
/// [`EngineAdapter`](super::EngineAdapter) maps them onto [`RenderError`](crate::domain::error::RenderError).
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("engine crashed: {detail}")]
    Crashed { detail: String },
    #[error("engine ran out of memory: {detail}")]
    OutOfMemory { detail: String },
    #[error("engine output exceeded {limit} bytes")]
    ArtifactTooLarge { limit: u64 },
    #[error("engine unavailable: {detail}")]
    Unavailable { detail: String },
    #[error("engine i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine panicked: {0}")]
    Panicked(String),
}

impl EngineFault {
    pub fn crashed(detail: impl Into<String>) -> Self {
        Self::Crashed {
            detail: detail.into(),
        }
    }

    pub fn out_of_memory(detail: impl Into<String>) -> Self {
        Self::OutOfMemory {
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineFault::Crashed { .. } => "crashed",
            EngineFault::OutOfMemory { .. } => "out_of_memory",
            EngineFault::ArtifactTooLarge { .. } => "artifact_too_large",
            EngineFault::Unavailable { .. } => "unavailable",
            EngineFault::Io(_) => "io",
            EngineFault::Panicked(_) => "panicked",
        }
    }
}

/// Black-box layout and rasterization capability.
///
/// Implementations receive a validated request and return the raw artifact
/// bytes. Dropping the returned future must abandon the work: the adapter
/// relies on that for timeouts and for callers that disconnect mid-render.
/// CPU-bound in-process engines should move their work onto
/// `tokio::task::spawn_blocking` so request I/O is never starved.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, EngineFault>;

    /// Startup check that the engine's runtime is usable.
    async fn probe(&self) -> Result<(), EngineFault> {
        Ok(())
    }
}

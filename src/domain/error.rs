use std::fmt;

use folio_api_types::{RenderErrorBody, kinds};
use thiserror::Error;

/// Failure categories surfaced by the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderErrorKind {
    /// The caller sent something that can never render as-is.
    ValidationError,
    EngineTimeout,
    /// The document triggered a fault inside the engine.
    EngineCrash,
    /// The service is saturated or the engine ran out of memory.
    ResourceExhausted,
    InternalError,
}

impl RenderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderErrorKind::ValidationError => kinds::VALIDATION_ERROR,
            RenderErrorKind::EngineTimeout => kinds::ENGINE_TIMEOUT,
            RenderErrorKind::EngineCrash => kinds::ENGINE_CRASH,
            RenderErrorKind::ResourceExhausted => kinds::RESOURCE_EXHAUSTED,
            RenderErrorKind::InternalError => kinds::INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a render call. Exactly one of this or a
/// [`RenderResult`](super::document::RenderResult) is produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RenderError {
    kind: RenderErrorKind,
    message: String,
    retryable: bool,
}

impl RenderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::ValidationError, message, false)
    }

    /// Validation failure attributed to a single request field.
    pub fn invalid_field(field: &str, reason: impl fmt::Display) -> Self {
        Self::validation(format!("invalid `{field}`: {reason}"))
    }

    pub fn engine_timeout(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::EngineTimeout, message, true)
    }

    pub fn engine_crash(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::EngineCrash, message, false)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::ResourceExhausted, message, true)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::InternalError, message, false)
    }

    fn new(kind: RenderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn kind(&self) -> RenderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_payload_too_large(&self) -> bool {
        self.kind == RenderErrorKind::ValidationError && self.message == PAYLOAD_TOO_LARGE
    }

    /// Body safe to show to callers. Internal errors never echo their detail.
    pub fn to_body(&self) -> RenderErrorBody {
        let message = match self.kind {
            RenderErrorKind::InternalError => "internal error".to_string(),
            _ => self.message.clone(),
        };
        RenderErrorBody {
            kind: self.kind.as_str().to_string(),
            message,
            retryable: self.retryable,
        }
    }
}

pub const CONTENT_REQUIRED: &str = "content required";
pub const PAYLOAD_TOO_LARGE: &str = "payload too large";

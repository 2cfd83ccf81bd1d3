//! Wire types for the Folio rendering API.
//!
//! The server deserializes [`RenderRequestBody`] and answers with either a PDF
//! payload, a [`Base64RenderResponse`], or a [`RenderErrorBody`]. Field names
//! are part of the public contract; the aliases keep older callers working.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Incoming render payload, before validation.
///
/// Every field is optional at this layer so the validator can report a precise
/// message instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequestBody {
    #[serde(default, alias = "html")]
    pub content: Option<String>,
    #[serde(default, alias = "pdf_options")]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl RenderRequestBody {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Structured failure body returned for every non-success outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

/// Error kinds as they appear in [`RenderErrorBody::kind`].
pub mod kinds {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const ENGINE_TIMEOUT: &str = "engine_timeout";
    pub const ENGINE_CRASH: &str = "engine_crash";
    pub const RESOURCE_EXHAUSTED: &str = "resource_exhausted";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: HealthState,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
}

/// Response of the base64 render endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base64RenderResponse {
    pub pdf_base64: String,
    pub filename: String,
    pub size_bytes: u64,
    pub generated_at: String,
    pub scan_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIndex {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

use std::sync::{Arc, OnceLock};

use folio_api_types::{HealthBody, HealthState};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Liveness snapshot. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: HealthState,
    pub timestamp: OffsetDateTime,
}

impl HealthStatus {
    pub fn to_body(&self) -> HealthBody {
        HealthBody {
            status: self.status,
            timestamp: self
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string()),
        }
    }
}

/// Answers health queries without touching the render path or the gate.
///
/// The only input is a one-shot record of a startup failure, such as the
/// engine's runtime failing to load.
#[derive(Debug, Clone, Default)]
pub struct HealthReporter {
    init_failure: Arc<OnceLock<String>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a catastrophic initialization failure. Only the first is kept.
    pub fn record_init_failure(&self, reason: impl Into<String>) {
        let _ = self.init_failure.set(reason.into());
    }

    pub fn init_failure(&self) -> Option<&str> {
        self.init_failure.get().map(String::as_str)
    }

    pub fn check(&self) -> HealthStatus {
        let status = if self.init_failure.get().is_some() {
            HealthState::Degraded
        } else {
            HealthState::Ok
        };
        HealthStatus {
            status,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

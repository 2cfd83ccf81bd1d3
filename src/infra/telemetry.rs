use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::render::{IN_FLIGHT_GAUGE, RENDER_DURATION_MS, RENDER_QUEUE_WAIT_MS, RENDER_TOTAL},
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Connection-level chatter from the HTTP stack stays out of request logs.
const QUIET_DEPENDENCIES: [&str; 2] = ["hyper_util=warn", "h2=warn"];

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    for directive in QUIET_DEPENDENCIES {
        let directive = directive.parse::<Directive>().map_err(|err| {
            InfraError::telemetry(format!("invalid filter directive `{directive}`: {err}"))
        })?;
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            RENDER_TOTAL,
            Unit::Count,
            "Render calls by outcome (succeeded, rejected, failed, cancelled) and error kind."
        );
        describe_histogram!(
            RENDER_DURATION_MS,
            Unit::Milliseconds,
            "End-to-end render latency in milliseconds, including queue wait."
        );
        describe_histogram!(
            RENDER_QUEUE_WAIT_MS,
            Unit::Milliseconds,
            "Time spent waiting for a render slot in milliseconds."
        );
        describe_gauge!(
            IN_FLIGHT_GAUGE,
            Unit::Count,
            "Engine invocations currently holding a render slot."
        );
    });
}

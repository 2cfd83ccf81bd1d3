//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const PLATFORM_PORT_VAR: &str = "PORT";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
pub(crate) const DEFAULT_ENGINE_PATH: &str = "weasyprint";
const DEFAULT_MAX_CONTENT_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_RENDER_CONCURRENCY: u32 = 4;
const DEFAULT_RENDER_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_QUEUE_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Deadline callers are promised; every render budget must fit inside it.
    pub request_timeout: Duration,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub engine_path: PathBuf,
    pub max_content_bytes: NonZeroU64,
    /// Ceiling on a single rendered artifact; larger output is abandoned.
    pub max_artifact_bytes: NonZeroU64,
    pub concurrency: NonZeroU32,
    pub render_timeout: Duration,
    pub queue_wait_timeout: Duration,
    pub presentational_hints: bool,
    pub optimize_images: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_platform_port(std::env::var(PLATFORM_PORT_VAR).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    /// Hosting platforms hand out the listen port via `PORT`; it only fills a gap.
    fn apply_platform_port(&mut self, port: Option<String>) -> Result<(), LoadError> {
        if self.server.port.is_some() {
            return Ok(());
        }
        if let Some(value) = port.filter(|value| !value.trim().is_empty()) {
            let parsed = value
                .trim()
                .parse::<u16>()
                .map_err(|err| LoadError::invalid("PORT", format!("failed to parse: {err}")))?;
            self.server.port = Some(parsed);
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_request_timeout_seconds {
            self.server.request_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(concurrency) = overrides.render_concurrency {
            self.render.concurrency = Some(concurrency);
        }
        if let Some(ms) = overrides.render_queue_wait_timeout_ms {
            self.render.queue_wait_timeout_ms = Some(ms);
        }
        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.engine_path.as_ref() {
            self.render.engine_path = Some(path.clone());
        }
        if let Some(ms) = overrides.render_timeout_ms {
            self.render.render_timeout_ms = Some(ms);
        }
        if let Some(bytes) = overrides.max_content_bytes {
            self.render.max_content_bytes = Some(bytes);
        }
        if let Some(bytes) = overrides.max_artifact_bytes {
            self.render.max_artifact_bytes = Some(bytes);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        let render_budget = render.render_timeout + render.queue_wait_timeout;
        if render_budget >= server.request_timeout {
            return Err(LoadError::invalid(
                "render.render_timeout_ms",
                format!(
                    "render timeout plus queue wait ({} ms) must stay below the request timeout ({} ms)",
                    render_budget.as_millis(),
                    server.request_timeout.as_millis()
                ),
            ));
        }

        Ok(Self {
            server,
            logging,
            render,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let request_timeout_secs = server
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if request_timeout_secs == 0 {
        return Err(LoadError::invalid(
            "server.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        request_timeout: Duration::from_secs(request_timeout_secs),
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let engine_path = render
        .engine_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_PATH));
    if engine_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.engine_path",
            "path must not be empty",
        ));
    }

    let max_content_bytes_value = render
        .max_content_bytes
        .unwrap_or(DEFAULT_MAX_CONTENT_BYTES);
    let max_content_bytes = NonZeroU64::new(max_content_bytes_value).ok_or_else(|| {
        LoadError::invalid("render.max_content_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_content_bytes_value).map_err(|_| {
        LoadError::invalid(
            "render.max_content_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let max_artifact_bytes = NonZeroU64::new(
        render
            .max_artifact_bytes
            .unwrap_or(DEFAULT_MAX_ARTIFACT_BYTES),
    )
    .ok_or_else(|| {
        LoadError::invalid("render.max_artifact_bytes", "must be greater than zero")
    })?;

    let concurrency = non_zero_u32(
        render
            .concurrency
            .unwrap_or(DEFAULT_RENDER_CONCURRENCY)
            .into(),
        "render.concurrency",
    )?;

    let render_timeout = non_zero_millis(
        render.render_timeout_ms.unwrap_or(DEFAULT_RENDER_TIMEOUT_MS),
        "render.render_timeout_ms",
    )?;
    let queue_wait_timeout = non_zero_millis(
        render
            .queue_wait_timeout_ms
            .unwrap_or(DEFAULT_QUEUE_WAIT_TIMEOUT_MS),
        "render.queue_wait_timeout_ms",
    )?;

    Ok(RenderSettings {
        engine_path,
        max_content_bytes,
        max_artifact_bytes,
        concurrency,
        render_timeout,
        queue_wait_timeout,
        presentational_hints: render.presentational_hints.unwrap_or(true),
        optimize_images: render.optimize_images.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    request_timeout_seconds: Option<u64>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    engine_path: Option<PathBuf>,
    max_content_bytes: Option<u64>,
    max_artifact_bytes: Option<u64>,
    concurrency: Option<u32>,
    render_timeout_ms: Option<u64>,
    queue_wait_timeout_ms: Option<u64>,
    presentational_hints: Option<bool>,
    optimize_images: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

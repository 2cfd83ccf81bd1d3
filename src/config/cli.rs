use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "HTML to PDF rendering service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP rendering service.
    Serve(Box<ServeArgs>),
    /// Render a local HTML file to PDF through the same pipeline the service uses.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the render engine executable.
    #[arg(long = "render-engine-path", value_name = "PATH")]
    pub engine_path: Option<PathBuf>,

    /// Override the per-call render timeout in milliseconds.
    #[arg(long = "render-timeout-ms", value_name = "MS")]
    pub render_timeout_ms: Option<u64>,

    /// Override the maximum accepted document size in bytes.
    #[arg(long = "render-max-content-bytes", value_name = "BYTES")]
    pub max_content_bytes: Option<u64>,

    /// Override the largest PDF a single render may produce, in bytes.
    #[arg(long = "render-max-artifact-bytes", value_name = "BYTES")]
    pub max_artifact_bytes: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the client-facing request timeout.
    #[arg(long = "server-request-timeout-seconds", value_name = "SECONDS")]
    pub server_request_timeout_seconds: Option<u64>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the number of concurrent engine invocations.
    #[arg(long = "render-concurrency", value_name = "COUNT")]
    pub render_concurrency: Option<u32>,

    /// Override how long a request may wait for a render slot, in milliseconds.
    #[arg(long = "render-queue-wait-timeout-ms", value_name = "MS")]
    pub render_queue_wait_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// HTML document to render.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Where to write the PDF; defaults to the input path with a `.pdf` extension.
    #[arg(short = 'o', long = "output", value_name = "OUTPUT", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Page size (A3, A4, A5, B4, B5, letter, legal, ledger).
    #[arg(long = "page-size", value_name = "SIZE")]
    pub page_size: Option<String>,

    /// Page margin, in millimetres or as a CSS length such as `2cm`.
    #[arg(long = "margin", value_name = "LENGTH")]
    pub margin: Option<String>,

    /// Base URL for resolving relative asset references.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,
}

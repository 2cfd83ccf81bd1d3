use std::{
    future::IntoFuture,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use folio::{
    application::{
        error::AppError,
        health::HealthReporter,
        render::{ConcurrencyGate, EngineAdapter, RenderEngine, RenderOrchestrator},
        validate::RequestValidator,
    },
    config::{self, RenderArgs, RenderSettings},
    domain::document::RenderOptions,
    infra::{
        engine::WeasyPrintEngine,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use folio_api_types::RenderRequestBody;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let engine = Arc::new(weasyprint(&settings.render));
    let health = HealthReporter::new();

    if let Err(fault) = engine.probe().await {
        warn!(
            target = "folio::startup",
            engine = engine.name(),
            program = %engine.program().display(),
            error = %fault,
            "Render engine probe failed; health will report degraded"
        );
        health.record_init_failure(fault.to_string());
    }

    let orchestrator = build_orchestrator(&settings.render, engine)?;
    let state = HttpState::new(orchestrator, health);
    let router = http::build_router(state, settings.server.request_timeout);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(
        target = "folio::startup",
        addr = %settings.server.addr,
        concurrency = settings.render.concurrency.get(),
        render_timeout_ms = settings.render.render_timeout.as_millis() as u64,
        queue_wait_timeout_ms = settings.render.queue_wait_timeout.as_millis() as u64,
        "Folio listening"
    );

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(draining_rx, grace) => {
            warn!(
                target = "folio::shutdown",
                grace_seconds = grace.as_secs(),
                "In-flight requests did not drain in time; exiting"
            );
        }
    }

    info!(target = "folio::shutdown", "Folio stopped");
    Ok(())
}

async fn run_render(settings: config::Settings, args: RenderArgs) -> Result<(), AppError> {
    let engine = Arc::new(weasyprint(&settings.render));
    let orchestrator = build_orchestrator(&settings.render, engine)?;

    let content = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::document(&args.input, err)))?;

    let mut body = RenderRequestBody::with_content(content);
    if let Some(page_size) = args.page_size {
        body = body.option("page_size", page_size);
    }
    if let Some(margin) = args.margin {
        body = body.option("margin", margin);
    }
    match args.base_url {
        Some(base_url) => body = body.option("base_url", base_url),
        None => {
            if let Some(base_url) = directory_url(&args.input) {
                body = body.option("base_url", Value::String(base_url.into()));
            }
        }
    }

    let document = orchestrator.handle(body).await?;
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("pdf"));
    tokio::fs::write(&output, document.result.bytes())
        .await
        .map_err(|err| AppError::from(InfraError::document(&output, err)))?;

    info!(
        target = "folio::cli::render",
        input = %args.input.display(),
        output = %output.display(),
        pdf_bytes = document.result.byte_length(),
        "Rendered document"
    );
    Ok(())
}

fn weasyprint(settings: &RenderSettings) -> WeasyPrintEngine {
    WeasyPrintEngine::new(settings.engine_path.clone(), settings.max_artifact_bytes.get())
}

fn build_orchestrator(
    settings: &RenderSettings,
    engine: Arc<dyn RenderEngine>,
) -> Result<RenderOrchestrator, AppError> {
    let max_content_bytes = usize::try_from(settings.max_content_bytes.get()).map_err(|_| {
        AppError::from(InfraError::configuration(
            "render.max_content_bytes exceeds the platform's address space",
        ))
    })?;
    let defaults = RenderOptions {
        presentational_hints: settings.presentational_hints,
        optimize_images: settings.optimize_images,
        ..RenderOptions::default()
    };

    Ok(RenderOrchestrator::new(
        RequestValidator::new(max_content_bytes, defaults),
        EngineAdapter::new(engine, settings.render_timeout)
            .with_max_artifact_bytes(settings.max_artifact_bytes.get()),
        ConcurrencyGate::new(settings.concurrency.get() as usize, settings.queue_wait_timeout),
    ))
}

/// Relative references in a local document resolve against its own directory.
fn directory_url(input: &Path) -> Option<Url> {
    let parent = input.parent().map(Path::to_path_buf).unwrap_or_default();
    let parent = if parent.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        parent
    };
    let absolute = std::fs::canonicalize(parent).ok()?;
    Url::from_directory_path(absolute).ok()
}

async fn drain_deadline(draining: oneshot::Receiver<()>, grace: Duration) {
    if draining.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "folio::shutdown", error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "folio::shutdown", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "folio::shutdown", "Shutdown signal received; draining in-flight requests");
}

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, header},
    response::Response,
};
use folio::{
    application::{
        health::HealthReporter,
        render::{ConcurrencyGate, EngineAdapter, EngineFault, RenderEngine, RenderOrchestrator},
        validate::RequestValidator,
    },
    domain::document::{RenderOptions, RenderRequest},
    infra::http::{HttpState, build_router},
};
use http_body_util::BodyExt;

pub const TITLE_DOCUMENT: &str = "<html><body><h1>Title</h1></body></html>";

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Pdf,
    Slow(Duration),
    Hang,
    Crash,
    Empty,
    OutOfMemory,
    Unavailable,
}

/// Scriptable engine that records how it was driven.
pub struct FakeEngine {
    behaviour: Behaviour,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl FakeEngine {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the active count even when the render future is dropped.
struct ActiveCall(Arc<AtomicUsize>);

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic stand-in for a PDF: same input, same bytes.
pub fn fake_pdf(request: &RenderRequest) -> Vec<u8> {
    format!(
        "%PDF-1.7\n% {} {} bytes\n%%EOF\n",
        request.options().page_size,
        request.content().len()
    )
    .into_bytes()
}

#[async_trait]
impl RenderEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, EngineFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveCall(Arc::clone(&self.active));

        match self.behaviour {
            Behaviour::Pdf => Ok(fake_pdf(request)),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(fake_pdf(request))
            }
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Crash => Err(EngineFault::crashed("segfault in table layout")),
            Behaviour::Empty => Ok(Vec::new()),
            Behaviour::OutOfMemory => Err(EngineFault::out_of_memory("MemoryError")),
            Behaviour::Unavailable => Err(EngineFault::unavailable("libpango not found")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub capacity: usize,
    pub render_timeout: Duration,
    pub queue_wait: Duration,
    pub max_content_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            render_timeout: Duration::from_secs(5),
            queue_wait: Duration::from_secs(5),
            max_content_bytes: 1024 * 1024,
        }
    }
}

pub fn orchestrator(engine: Arc<FakeEngine>, config: PipelineConfig) -> RenderOrchestrator {
    RenderOrchestrator::new(
        RequestValidator::new(config.max_content_bytes, RenderOptions::default()),
        EngineAdapter::new(engine, config.render_timeout),
        ConcurrencyGate::new(config.capacity, config.queue_wait),
    )
}

pub fn router(orchestrator: RenderOrchestrator, health: HealthReporter) -> Router {
    router_with_timeout(orchestrator, health, Duration::from_secs(60))
}

pub fn router_with_timeout(
    orchestrator: RenderOrchestrator,
    health: HealthReporter,
    request_timeout: Duration,
) -> Router {
    build_router(HttpState::new(orchestrator, health), request_timeout)
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn body_bytes(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Poll until `condition` holds, failing the test after `limit`.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold before the deadline");
}

mod error;
mod middleware;
mod render;

pub use error::RenderFailure;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use render::{GENERATED_AT_HEADER, SCAN_ID_HEADER};

use std::{collections::BTreeMap, time::Duration};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    middleware as axum_middleware,
    routing::{get, post},
};
use folio_api_types::{HealthBody, ServiceIndex};

use crate::application::{health::HealthReporter, render::RenderOrchestrator};

use middleware::{enforce_request_timeout, log_responses, set_request_context};

/// JSON escapes a control character as `\u00XX`, six bytes per content byte.
const JSON_ESCAPE_FACTOR: usize = 6;
/// Headroom for the remaining fields of the request body.
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: RenderOrchestrator,
    pub health: HealthReporter,
}

impl HttpState {
    pub fn new(orchestrator: RenderOrchestrator, health: HealthReporter) -> Self {
        Self {
            orchestrator,
            health,
        }
    }
}

pub fn build_router(state: HttpState, request_timeout: Duration) -> Router {
    let body_limit = body_limit_for(state.orchestrator.validator().max_content_bytes());

    let render_routes = Router::new()
        .route("/render", post(render::render_pdf))
        .route("/generate-pdf", post(render::render_pdf))
        .route("/render/base64", post(render::render_base64))
        .route("/generate-pdf-base64", post(render::render_base64))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            request_timeout,
            enforce_request_timeout,
        ));

    // Health stays outside the timeout layer and never shares state with renders.
    Router::new()
        .route("/", get(service_index))
        .route("/health", get(health))
        .merge(render_routes)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn body_limit_for(max_content_bytes: usize) -> usize {
    max_content_bytes
        .saturating_mul(JSON_ESCAPE_FACTOR)
        .saturating_add(BODY_ENVELOPE_BYTES)
}

async fn health(State(state): State<HttpState>) -> Json<HealthBody> {
    Json(state.health.check().to_body())
}

async fn service_index() -> Json<ServiceIndex> {
    let endpoints = BTreeMap::from([
        ("GET /".to_string(), "this index".to_string()),
        ("GET /health".to_string(), "liveness probe".to_string()),
        ("POST /render".to_string(), "render HTML to a PDF download".to_string()),
        (
            "POST /render/base64".to_string(),
            "render HTML to a base64-encoded PDF in JSON".to_string(),
        ),
    ]);
    Json(ServiceIndex {
        message: "Folio HTML to PDF service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    application::error::ErrorReport,
    domain::error::{PAYLOAD_TOO_LARGE, RenderError, RenderErrorKind},
};

const RETRY_AFTER_SECONDS: &str = "1";

/// HTTP face of a [`RenderError`].
#[derive(Debug)]
pub struct RenderFailure {
    source: &'static str,
    error: RenderError,
}

impl RenderFailure {
    pub fn new(source: &'static str, error: RenderError) -> Self {
        Self { source, error }
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.error)
    }

    /// Body-level problems surface as validation errors so every non-success
    /// answer shares one body shape.
    pub fn from_rejection(rejection: JsonRejection) -> Self {
        let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RenderError::validation(PAYLOAD_TOO_LARGE)
        } else {
            RenderError::validation(format!("malformed request body: {}", rejection.body_text()))
        };
        Self::new("infra::http::render::body", error)
    }
}

impl From<RenderError> for RenderFailure {
    fn from(error: RenderError) -> Self {
        Self::new("infra::http::render", error)
    }
}

impl IntoResponse for RenderFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.error.to_body())).into_response();
        if self.error.kind() == RenderErrorKind::ResourceExhausted {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECONDS),
            );
        }
        ErrorReport::from_error(self.source, status, &self.error).attach(&mut response);
        response
    }
}

fn status_for(error: &RenderError) -> StatusCode {
    match error.kind() {
        RenderErrorKind::ValidationError if error.is_payload_too_large() => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        RenderErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        RenderErrorKind::EngineTimeout => StatusCode::GATEWAY_TIMEOUT,
        RenderErrorKind::EngineCrash | RenderErrorKind::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        RenderErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
    }
}

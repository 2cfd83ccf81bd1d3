use std::fmt::Write as _;

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use folio_api_types::{Base64RenderResponse, RenderRequestBody};
use time::{
    OffsetDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

use crate::{application::render::RenderedDocument, domain::document::PDF_MEDIA_TYPE};

use super::{HttpState, error::RenderFailure};

pub const GENERATED_AT_HEADER: HeaderName = HeaderName::from_static("x-generated-at");
pub const SCAN_ID_HEADER: HeaderName = HeaderName::from_static("x-scan-id");

const UNKNOWN_SCAN_ID: &str = "unknown";
const FILENAME_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

pub(super) async fn render_pdf(
    State(state): State<HttpState>,
    payload: Result<Json<RenderRequestBody>, JsonRejection>,
) -> Result<Response, RenderFailure> {
    let document = run(&state, payload).await?;
    let delivery = Delivery::new(&document);

    let mut response = (StatusCode::OK, Body::from(document.result.into_bytes())).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PDF_MEDIA_TYPE));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(delivery.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&delivery.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&delivery.generated_at) {
        headers.insert(GENERATED_AT_HEADER, value);
    }
    let scan_id = HeaderValue::from_str(&delivery.scan_id)
        .unwrap_or_else(|_| HeaderValue::from_static(UNKNOWN_SCAN_ID));
    headers.insert(SCAN_ID_HEADER, scan_id);
    Ok(response)
}

pub(super) async fn render_base64(
    State(state): State<HttpState>,
    payload: Result<Json<RenderRequestBody>, JsonRejection>,
) -> Result<Json<Base64RenderResponse>, RenderFailure> {
    let document = run(&state, payload).await?;
    let delivery = Delivery::new(&document);

    Ok(Json(Base64RenderResponse {
        pdf_base64: STANDARD.encode(document.result.bytes()),
        filename: delivery.filename,
        size_bytes: delivery.size_bytes,
        generated_at: delivery.generated_at,
        scan_id: delivery.scan_id,
    }))
}

async fn run(
    state: &HttpState,
    payload: Result<Json<RenderRequestBody>, JsonRejection>,
) -> Result<RenderedDocument, RenderFailure> {
    let Json(body) = payload.map_err(RenderFailure::from_rejection)?;
    Ok(state.orchestrator.handle(body).await?)
}

/// Response metadata shared by both delivery formats.
struct Delivery {
    filename: String,
    size_bytes: u64,
    generated_at: String,
    scan_id: String,
}

impl Delivery {
    fn new(document: &RenderedDocument) -> Self {
        let now = OffsetDateTime::now_utc();
        let scan_id = document
            .request
            .scan_id()
            .unwrap_or(UNKNOWN_SCAN_ID)
            .to_string();
        let filename = match document.request.filename() {
            Some(name) => name.to_string(),
            None => default_filename(&scan_id, now),
        };
        Self {
            filename,
            size_bytes: document.result.byte_length() as u64,
            generated_at: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| now.unix_timestamp().to_string()),
            scan_id,
        }
    }
}

fn default_filename(scan_id: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(FILENAME_STAMP)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let scan_id: String = scan_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("document_{scan_id}_{stamp}.pdf")
}

/// `attachment` disposition with an ASCII fallback name plus an RFC 5987
/// `filename*` when the real name is not plain ASCII.
fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        return format!("attachment; filename=\"{filename}\"");
    }
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

//! Request validation: turns an untrusted [`RenderRequestBody`] into a
//! [`RenderRequest`] or a validation [`RenderError`]. No engine work happens
//! here and nothing outside the input is read.

use folio_api_types::RenderRequestBody;
use serde_json::{Map, Value};
use url::Url;

use crate::domain::{
    document::{Margin, PageSize, RenderOptions, RenderRequest},
    error::{CONTENT_REQUIRED, PAYLOAD_TOO_LARGE, RenderError},
};

const DOCTYPE_PREFIX: &str = "<!DOCTYPE";
const MAX_FILENAME_BYTES: usize = 255;

#[derive(Debug, Clone)]
pub struct RequestValidator {
    max_content_bytes: usize,
    defaults: RenderOptions,
}

impl RequestValidator {
    pub fn new(max_content_bytes: usize, defaults: RenderOptions) -> Self {
        Self {
            max_content_bytes,
            defaults,
        }
    }

    pub fn max_content_bytes(&self) -> usize {
        self.max_content_bytes
    }

    pub fn validate(&self, raw: RenderRequestBody) -> Result<RenderRequest, RenderError> {
        let RenderRequestBody {
            content,
            options,
            filename,
            metadata,
        } = raw;

        let content = content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| RenderError::validation(CONTENT_REQUIRED))?;
        if content.len() > self.max_content_bytes {
            return Err(RenderError::validation(PAYLOAD_TOO_LARGE));
        }

        let options = self.resolve_options(options.unwrap_or_default())?;
        let filename = filename.map(|name| normalize_filename(&name)).transpose()?;
        let scan_id = metadata.as_ref().and_then(scan_id_from_metadata);

        Ok(RenderRequest::new(
            ensure_doctype(content),
            options,
            filename,
            scan_id,
        ))
    }

    fn resolve_options(&self, raw: Map<String, Value>) -> Result<RenderOptions, RenderError> {
        let mut options = self.defaults.clone();

        for (key, value) in raw {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "page_size" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| RenderError::invalid_field("page_size", "must be a string"))?;
                    options.page_size = name
                        .parse::<PageSize>()
                        .map_err(|err| RenderError::invalid_field("page_size", err))?;
                }
                "margin" => {
                    options.margin = Some(parse_margin(&value)?);
                }
                "base_url" => {
                    options.base_url = Some(parse_base_url(&value)?);
                }
                "presentational_hints" => {
                    options.presentational_hints = expect_bool("presentational_hints", &value)?;
                }
                "optimize_images" => {
                    options.optimize_images = expect_bool("optimize_images", &value)?;
                }
                other => {
                    return Err(RenderError::validation(format!("unknown option `{other}`")));
                }
            }
        }

        Ok(options)
    }
}

fn parse_margin(value: &Value) -> Result<Margin, RenderError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| "must be a finite number".to_string())
            .and_then(Margin::millimetres),
        Value::String(text) => text.parse::<Margin>(),
        _ => Err("must be a number of millimetres or a CSS length".to_string()),
    };
    parsed.map_err(|reason| RenderError::invalid_field("margin", reason))
}

fn parse_base_url(value: &Value) -> Result<Url, RenderError> {
    let raw = value
        .as_str()
        .ok_or_else(|| RenderError::invalid_field("base_url", "must be a string"))?;
    let url = Url::parse(raw.trim())
        .map_err(|err| RenderError::invalid_field("base_url", format!("not an absolute URI: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(RenderError::invalid_field(
            "base_url",
            "URI cannot serve as a base for relative references",
        ));
    }
    Ok(url)
}

fn expect_bool(field: &str, value: &Value) -> Result<bool, RenderError> {
    value
        .as_bool()
        .ok_or_else(|| RenderError::invalid_field(field, "must be a boolean"))
}

fn normalize_filename(raw: &str) -> Result<String, RenderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RenderError::invalid_field("filename", "must not be empty"));
    }
    if trimmed
        .chars()
        .any(|c| c.is_control() || matches!(c, '/' | '\\' | '"'))
    {
        return Err(RenderError::invalid_field(
            "filename",
            "must not contain path separators, quotes or control characters",
        ));
    }

    let name = if trimmed.to_ascii_lowercase().ends_with(".pdf") {
        trimmed.to_string()
    } else {
        format!("{trimmed}.pdf")
    };
    if name.len() > MAX_FILENAME_BYTES {
        return Err(RenderError::invalid_field(
            "filename",
            format!("must not exceed {MAX_FILENAME_BYTES} bytes"),
        ));
    }
    Ok(name)
}

fn scan_id_from_metadata(metadata: &Map<String, Value>) -> Option<String> {
    match metadata.get("scanId")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn ensure_doctype(content: String) -> String {
    let head = content.trim_start();
    let has_doctype = head
        .get(..DOCTYPE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DOCTYPE_PREFIX));
    if has_doctype {
        content
    } else {
        format!("<!DOCTYPE html>\n{content}")
    }
}

//! Accepted render requests and the artifacts they produce.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use url::Url;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Paper sizes understood by the `@page { size }` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    B4,
    B5,
    Letter,
    Legal,
    Ledger,
}

impl PageSize {
    pub const ALL: [PageSize; 8] = [
        PageSize::A3,
        PageSize::A4,
        PageSize::A5,
        PageSize::B4,
        PageSize::B5,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Ledger,
    ];

    pub fn css_keyword(self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::B4 => "B4",
            PageSize::B5 => "B5",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
            PageSize::Ledger => "ledger",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.css_keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPageSize(pub String);

impl fmt::Display for UnknownPageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = PageSize::ALL
            .iter()
            .map(|size| size.css_keyword())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "unknown page size `{}` (expected one of {known})", self.0)
    }
}

impl FromStr for PageSize {
    type Err = UnknownPageSize;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        PageSize::ALL
            .into_iter()
            .find(|size| size.css_keyword().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownPageSize(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Mm,
    Cm,
    In,
    Pt,
    Px,
}

impl LengthUnit {
    fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::In => "in",
            LengthUnit::Pt => "pt",
            LengthUnit::Px => "px",
        }
    }

    fn millimetres_per_unit(self) -> f64 {
        match self {
            LengthUnit::Mm => 1.0,
            LengthUnit::Cm => 10.0,
            LengthUnit::In => 25.4,
            LengthUnit::Pt => 25.4 / 72.0,
            LengthUnit::Px => 25.4 / 96.0,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        [
            LengthUnit::Mm,
            LengthUnit::Cm,
            LengthUnit::In,
            LengthUnit::Pt,
            LengthUnit::Px,
        ]
        .into_iter()
        .find(|unit| unit.suffix().eq_ignore_ascii_case(suffix))
    }
}

/// Page margin applied on all four sides. Bare numbers are millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    value: f64,
    unit: LengthUnit,
}

impl Margin {
    /// Largest margin accepted, expressed in millimetres.
    pub const MAX_MM: f64 = 100.0;

    pub fn new(value: f64, unit: LengthUnit) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("must be a finite number".to_string());
        }
        if value < 0.0 {
            return Err("must not be negative".to_string());
        }
        let margin = Self { value, unit };
        if margin.as_millimetres() > Self::MAX_MM {
            return Err(format!("must not exceed {}mm", Self::MAX_MM));
        }
        Ok(margin)
    }

    pub fn millimetres(value: f64) -> Result<Self, String> {
        Self::new(value, LengthUnit::Mm)
    }

    pub fn as_millimetres(&self) -> f64 {
        self.value * self.unit.millimetres_per_unit()
    }

    pub fn to_css(&self) -> String {
        format!("{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Margin {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, suffix) = trimmed.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("`{raw}` is not a length"))?;
        let unit = if suffix.is_empty() {
            LengthUnit::Mm
        } else {
            LengthUnit::from_suffix(suffix)
                .ok_or_else(|| format!("unsupported unit `{suffix}` (use mm, cm, in, pt or px)"))?
        };
        Margin::new(value, unit)
    }
}

/// Resolved rendering options.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub page_size: PageSize,
    /// `None` keeps the engine's default margin.
    pub margin: Option<Margin>,
    /// Absent means relative asset references cannot be resolved.
    pub base_url: Option<Url>,
    pub presentational_hints: bool,
    pub optimize_images: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            margin: None,
            base_url: None,
            presentational_hints: true,
            optimize_images: true,
        }
    }
}

impl RenderOptions {
    /// Stylesheet carrying the page geometry, handed to the engine alongside the document.
    ///
    /// The engine treats it as a user stylesheet, so both declarations are
    /// `!important` to win over `@page` rules inside the document.
    pub fn page_stylesheet(&self) -> String {
        match self.margin {
            Some(margin) => format!(
                "@page {{ size: {} !important; margin: {} !important; }}\n",
                self.page_size.css_keyword(),
                margin.to_css()
            ),
            None => format!(
                "@page {{ size: {} !important; }}\n",
                self.page_size.css_keyword()
            ),
        }
    }
}

/// A validated request. Only the validator constructs one.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    content: String,
    options: RenderOptions,
    filename: Option<String>,
    scan_id: Option<String>,
}

impl RenderRequest {
    pub(crate) fn new(
        content: String,
        options: RenderOptions,
        filename: Option<String>,
        scan_id: Option<String>,
    ) -> Self {
        Self {
            content,
            options,
            filename,
            scan_id,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Caller-chosen download name, already normalised to end in `.pdf`.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn scan_id(&self) -> Option<&str> {
        self.scan_id.as_deref()
    }
}

/// Rendered artifact. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    artifact: Bytes,
}

impl RenderResult {
    /// Wrap engine output, refusing empty artifacts.
    pub fn from_artifact(artifact: impl Into<Bytes>) -> Option<Self> {
        let artifact = artifact.into();
        (!artifact.is_empty()).then_some(Self { artifact })
    }

    pub fn media_type(&self) -> &'static str {
        PDF_MEDIA_TYPE
    }

    pub fn byte_length(&self) -> usize {
        self.artifact.len()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.artifact
    }

    pub fn into_bytes(self) -> Bytes {
        self.artifact
    }
}

//! Recognition types
//!
//! Shared shapes for provider output, corrected identifier fields and the
//! merged extraction record handed back to the operator.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::color::ColorLabel;

/// What the operator was photographing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureKind {
    /// Container front wall (container number + ISO code)
    ContainerFrontWall,
    /// Trailer rear (license plate)
    Trailer,
    /// Anything else
    Generic,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::ContainerFrontWall => "container-front-wall",
            CaptureKind::Trailer => "trailer",
            CaptureKind::Generic => "generic",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognition provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    /// Container code OCR service
    ContainerOcr,
    /// License plate recognition service
    PlateRecognizer,
    /// General OCR + image properties service
    Vision,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderId::ContainerOcr => "container-ocr",
            ProviderId::PlateRecognizer => "plate-recognizer",
            ProviderId::Vision => "vision",
        };
        f.write_str(name)
    }
}

/// Hint passed along with the image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionHint {
    /// Plate jurisdiction (e.g. "us")
    pub region: Option<String>,
}

/// What a raw reading claims to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingKind {
    /// Unstructured text; searched for every identifier
    Text,
    ContainerNumber,
    IsoCode,
    Plate,
}

/// A piece of text as the provider returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub kind: ReadingKind,
    pub text: String,
    /// Provider-reported confidence (0-1), if any
    pub confidence: Option<f32>,
}

impl RawReading {
    pub fn new(kind: ReadingKind, text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            kind,
            text: text.into(),
            confidence,
        }
    }
}

/// A color reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSample {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Share of the image covered by this color (0-1)
    pub pixel_fraction: f32,
    /// Provider score (0-1)
    pub score: f32,
}

impl ColorSample {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }
}

/// Normalized output of one provider call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOutput {
    pub readings: Vec<RawReading>,
    pub colors: Vec<ColorSample>,
}

impl ProviderOutput {
    pub fn is_empty(&self) -> bool {
        self.readings.iter().all(|r| r.text.trim().is_empty()) && self.colors.is_empty()
    }
}

/// One identifier after correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionField {
    pub raw_value: String,
    pub corrected_value: String,
    pub confidence: f32,
    pub was_corrected: bool,
    pub provider: Option<ProviderId>,
}

impl ExtractionField {
    /// Nothing detected
    pub fn empty() -> Self {
        Self {
            raw_value: String::new(),
            corrected_value: String::new(),
            confidence: 0.0,
            was_corrected: false,
            provider: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.corrected_value.is_empty()
    }

    pub fn from_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }
}

impl Default for ExtractionField {
    fn default() -> Self {
        Self::empty()
    }
}

/// Visible value of a field plus every provider's contribution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedField {
    pub value: ExtractionField,
    pub candidates: Vec<ExtractionField>,
}

/// Dominant color mapped onto the palette
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedColor {
    pub label: ColorLabel,
    pub sample: ColorSample,
    pub provider: ProviderId,
}

/// Priority of a provider for a capture kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Primary,
    Secondary,
}

/// How a provider call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOutcome {
    Ok,
    Timeout,
    Error,
}

/// Per-provider diagnostics for one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReport {
    pub provider: ProviderId,
    pub role: ProviderRole,
    pub outcome: ProviderOutcome,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Merged, confidence-tagged result of one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub kind: CaptureKind,
    pub container_number: ResolvedField,
    pub iso_code: ResolvedField,
    pub plate: ResolvedField,
    pub color: Option<ResolvedColor>,
    pub reports: Vec<ProviderReport>,
}

impl ExtractionRecord {
    /// Record with every field empty
    pub fn empty(kind: CaptureKind) -> Self {
        Self {
            kind,
            container_number: ResolvedField::default(),
            iso_code: ResolvedField::default(),
            plate: ResolvedField::default(),
            color: None,
            reports: Vec::new(),
        }
    }
}

/// Recognition error types
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RecognitionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RecognitionError::InvalidResponse(err.to_string())
        } else {
            RecognitionError::Transport(err.to_string())
        }
    }
}

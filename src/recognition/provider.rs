//! Recognition providers
//!
//! Defines the provider trait and one adapter per external service. Each
//! adapter owns its response-shape parsing and returns a normalized
//! `ProviderOutput`; merging happens in the gateway.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use super::types::{
    ColorSample, ProviderId, ProviderOutput, RawReading, ReadingKind, RecognitionError,
    RecognitionHint,
};

/// Recognition provider trait
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Get the provider identity
    fn id(&self) -> ProviderId;

    /// Recognize identifiers in an image
    async fn recognize(
        &self,
        image_data: &[u8],
        hint: &RecognitionHint,
    ) -> Result<ProviderOutput, RecognitionError>;
}

/// Endpoint and credential for an HTTP provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

fn encode_image(image_data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image_data)
}

/// Send a request and decode a JSON body, mapping non-2xx to `Api`
async fn send_json<T: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
) -> Result<T, RecognitionError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(RecognitionError::Api { status, body });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| RecognitionError::InvalidResponse(e.to_string()))
}

// ============================================================================
// Container OCR
// ============================================================================

/// Container code OCR service
pub struct ContainerOcrProvider {
    client: reqwest::Client,
    endpoint: HttpEndpoint,
}

impl ContainerOcrProvider {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerOcrResponse {
    #[serde(default)]
    pub results: Vec<ContainerOcrResult>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerOcrResult {
    #[serde(default, alias = "code")]
    pub container_number: Option<String>,
    #[serde(default, alias = "iso")]
    pub iso_code: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Use the most confident result; keep free text for the ISO fallback
pub fn parse_container_response(response: ContainerOcrResponse) -> ProviderOutput {
    let best = response.results.into_iter().max_by(|a, b| {
        a.confidence
            .unwrap_or(0.0)
            .total_cmp(&b.confidence.unwrap_or(0.0))
    });

    let mut output = ProviderOutput::default();
    if let Some(result) = best {
        let confidence = result.confidence.map(normalize_score);
        if let Some(number) = result.container_number.filter(|s| !s.trim().is_empty()) {
            output
                .readings
                .push(RawReading::new(ReadingKind::ContainerNumber, number, confidence));
        }
        if let Some(iso) = result.iso_code.filter(|s| !s.trim().is_empty()) {
            output
                .readings
                .push(RawReading::new(ReadingKind::IsoCode, iso, confidence));
        }
        if let Some(text) = result.text.filter(|s| !s.trim().is_empty()) {
            output.readings.push(RawReading::new(ReadingKind::Text, text, None));
        }
    }
    output
}

#[async_trait]
impl RecognitionProvider for ContainerOcrProvider {
    fn id(&self) -> ProviderId {
        ProviderId::ContainerOcr
    }

    async fn recognize(
        &self,
        image_data: &[u8],
        _hint: &RecognitionHint,
    ) -> Result<ProviderOutput, RecognitionError> {
        let body = serde_json::json!({ "image": encode_image(image_data) });

        let mut request = self.client.post(&self.endpoint.url).json(&body);
        if let Some(ref key) = self.endpoint.api_key {
            request = request.header("x-api-key", key);
        }

        let response: ContainerOcrResponse = send_json(request).await?;
        Ok(parse_container_response(response))
    }
}

// ============================================================================
// Plate recognition
// ============================================================================

/// License plate recognition service
pub struct PlateRecognizerProvider {
    client: reqwest::Client,
    endpoint: HttpEndpoint,
}

impl PlateRecognizerProvider {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlateResponse {
    #[serde(default)]
    pub results: Vec<PlateResult>,
}

#[derive(Debug, Deserialize)]
pub struct PlateResult {
    pub plate: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub region: Option<PlateRegion>,
}

#[derive(Debug, Deserialize)]
pub struct PlateRegion {
    pub code: String,
}

/// Highest-scoring plate only
pub fn parse_plate_response(response: PlateResponse) -> ProviderOutput {
    let best = response
        .results
        .into_iter()
        .filter(|r| !r.plate.trim().is_empty())
        .max_by(|a, b| a.score.unwrap_or(0.0).total_cmp(&b.score.unwrap_or(0.0)));

    let mut output = ProviderOutput::default();
    if let Some(result) = best {
        if let Some(ref region) = result.region {
            tracing::debug!(region = %region.code, "Plate region reported");
        }
        output.readings.push(RawReading::new(
            ReadingKind::Plate,
            result.plate,
            result.score.map(normalize_score),
        ));
    }
    output
}

#[async_trait]
impl RecognitionProvider for PlateRecognizerProvider {
    fn id(&self) -> ProviderId {
        ProviderId::PlateRecognizer
    }

    async fn recognize(
        &self,
        image_data: &[u8],
        hint: &RecognitionHint,
    ) -> Result<ProviderOutput, RecognitionError> {
        let regions: Vec<&str> = hint.region.as_deref().into_iter().collect();
        let body = serde_json::json!({
            "upload": encode_image(image_data),
            "regions": regions,
        });

        let mut request = self.client.post(&self.endpoint.url).json(&body);
        if let Some(ref token) = self.endpoint.api_key {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response: PlateResponse = send_json(request).await?;
        Ok(parse_plate_response(response))
    }
}

// ============================================================================
// General vision (text + image properties)
// ============================================================================

/// General OCR and dominant-color service
pub struct VisionProvider {
    client: reqwest::Client,
    endpoint: HttpEndpoint,
}

impl VisionProvider {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionResponse {
    #[serde(default)]
    pub responses: Vec<VisionAnnotation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionAnnotation {
    #[serde(default)]
    pub full_text_annotation: Option<VisionFullText>,
    #[serde(default)]
    pub text_annotations: Vec<VisionTextAnnotation>,
    #[serde(default)]
    pub image_properties_annotation: Option<VisionImageProperties>,
    #[serde(default)]
    pub error: Option<VisionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct VisionFullText {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct VisionTextAnnotation {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionImageProperties {
    pub dominant_colors: VisionDominantColors,
}

#[derive(Debug, Deserialize)]
pub struct VisionDominantColors {
    #[serde(default)]
    pub colors: Vec<VisionColorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionColorInfo {
    pub color: VisionColor,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub pixel_fraction: f32,
}

/// Channels are omitted by the service when zero
#[derive(Debug, Deserialize)]
pub struct VisionColor {
    #[serde(default)]
    pub red: f32,
    #[serde(default)]
    pub green: f32,
    #[serde(default)]
    pub blue: f32,
}

#[derive(Debug, Deserialize)]
pub struct VisionStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

pub fn parse_vision_response(response: VisionResponse) -> Result<ProviderOutput, RecognitionError> {
    let mut output = ProviderOutput::default();
    let Some(annotation) = response.responses.into_iter().next() else {
        return Ok(output);
    };

    if let Some(status) = annotation.error {
        return Err(RecognitionError::Api {
            status: 200,
            body: format!("code {}: {}", status.code, status.message),
        });
    }

    let text = annotation
        .full_text_annotation
        .map(|t| t.text)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            annotation
                .text_annotations
                .into_iter()
                .next()
                .map(|t| t.description)
        });
    if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        output.readings.push(RawReading::new(ReadingKind::Text, text, None));
    }

    if let Some(properties) = annotation.image_properties_annotation {
        output.colors = properties
            .dominant_colors
            .colors
            .into_iter()
            .map(|info| ColorSample {
                red: channel(info.color.red),
                green: channel(info.color.green),
                blue: channel(info.color.blue),
                pixel_fraction: info.pixel_fraction.clamp(0.0, 1.0),
                score: info.score.clamp(0.0, 1.0),
            })
            .collect();
    }

    Ok(output)
}

#[async_trait]
impl RecognitionProvider for VisionProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Vision
    }

    async fn recognize(
        &self,
        image_data: &[u8],
        _hint: &RecognitionHint,
    ) -> Result<ProviderOutput, RecognitionError> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": encode_image(image_data) },
                "features": [
                    { "type": "TEXT_DETECTION" },
                    { "type": "IMAGE_PROPERTIES" }
                ]
            }]
        });

        let mut request = self.client.post(&self.endpoint.url).json(&body);
        if let Some(ref key) = self.endpoint.api_key {
            request = request.query(&[("key", key)]);
        }

        let response: VisionResponse = send_json(request).await?;
        parse_vision_response(response)
    }
}

fn channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Scores above 1 are treated as percentages
fn normalize_score(score: f32) -> f32 {
    if score > 1.0 {
        (score / 100.0).clamp(0.0, 1.0)
    } else {
        score.max(0.0)
    }
}

/// Mock provider for testing
#[cfg(test)]
pub struct MockProvider {
    pub id: ProviderId,
    pub response: Result<ProviderOutput, String>,
    pub delay: Option<std::time::Duration>,
    pub calls: std::sync::atomic::AtomicUsize,
    pub last_hint: parking_lot::Mutex<Option<RecognitionHint>>,
}

#[cfg(test)]
impl MockProvider {
    pub fn returning(id: ProviderId, output: ProviderOutput) -> Self {
        Self {
            id,
            response: Ok(output),
            delay: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
            last_hint: parking_lot::Mutex::new(None),
        }
    }

    pub fn failing(id: ProviderId, message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            ..Self::returning(id, ProviderOutput::default())
        }
    }

    pub fn delayed(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl RecognitionProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn recognize(
        &self,
        _image_data: &[u8],
        hint: &RecognitionHint,
    ) -> Result<ProviderOutput, RecognitionError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        *self.last_hint.lock() = Some(hint.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response
            .clone()
            .map_err(RecognitionError::Transport)
    }
}

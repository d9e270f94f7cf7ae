//! Extraction Gateway
//!
//! Fans a cropped image out to the providers registered for a capture kind,
//! bounds every call with a timeout and merges whatever came back into one
//! [`ExtractionRecord`].

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use super::{
    color::ColorClassifier,
    corrector::TextCorrector,
    provider::{ContainerOcrProvider, PlateRecognizerProvider, RecognitionProvider, VisionProvider},
    types::{
        CaptureKind, ColorSample, ExtractionField, ExtractionRecord, ProviderId, ProviderOutcome,
        ProviderOutput, ProviderReport, ProviderRole, ReadingKind, RecognitionError,
        RecognitionHint, ResolvedColor, ResolvedField,
    },
};
use crate::config::ProvidersConfig;

/// Deadline for a single provider call
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Jurisdiction sent with trailer plate lookups
pub const PLATE_REGION_HINT: &str = "us";

struct Registration {
    provider: Arc<dyn RecognitionProvider>,
    kinds: Vec<(CaptureKind, ProviderRole)>,
}

impl Registration {
    fn role_for(&self, kind: CaptureKind) -> Option<ProviderRole> {
        self.kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, role)| *role)
    }
}

/// Provider fan-out and result merging
pub struct ExtractionGateway {
    registrations: Vec<Registration>,
    corrector: TextCorrector,
    classifier: ColorClassifier,
}

impl Default for ExtractionGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionGateway {
    /// Gateway with no providers; every extraction yields an empty record
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            corrector: TextCorrector::new(),
            classifier: ColorClassifier::new(),
        }
    }

    /// Register a provider for the given capture kinds
    pub fn with_provider(
        mut self,
        provider: Arc<dyn RecognitionProvider>,
        kinds: &[(CaptureKind, ProviderRole)],
    ) -> Self {
        self.registrations.push(Registration {
            provider,
            kinds: kinds.to_vec(),
        });
        self
    }

    /// Build from configuration, registering only configured providers
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut gateway = Self::new();

        if let Some(ocr) = &config.container_ocr {
            gateway = gateway.with_provider(
                Arc::new(ContainerOcrProvider::new(ocr.endpoint())),
                &[(CaptureKind::ContainerFrontWall, ProviderRole::Primary)],
            );
        }

        if let Some(plates) = &config.plate_recognizer {
            gateway = gateway.with_provider(
                Arc::new(PlateRecognizerProvider::new(plates.endpoint())),
                &[(CaptureKind::Trailer, ProviderRole::Primary)],
            );
        }

        if let Some(vision) = &config.vision {
            gateway = gateway.with_provider(
                Arc::new(VisionProvider::new(vision.endpoint())),
                &[
                    (CaptureKind::ContainerFrontWall, ProviderRole::Secondary),
                    (CaptureKind::Trailer, ProviderRole::Secondary),
                    (CaptureKind::Generic, ProviderRole::Primary),
                ],
            );
        }

        tracing::info!(
            providers = gateway.registrations.len(),
            "Extraction gateway configured"
        );
        gateway
    }

    /// Providers dispatched for `kind`, primary first
    pub fn providers_for(&self, kind: CaptureKind) -> Vec<(ProviderId, ProviderRole)> {
        self.dispatch_plan(kind)
            .into_iter()
            .map(|(provider, role)| (provider.id(), role))
            .collect()
    }

    fn dispatch_plan(&self, kind: CaptureKind) -> Vec<(Arc<dyn RecognitionProvider>, ProviderRole)> {
        let mut plan: Vec<_> = self
            .registrations
            .iter()
            .filter_map(|r| r.role_for(kind).map(|role| (r.provider.clone(), role)))
            .collect();
        // Stable: registration order breaks ties within a role
        plan.sort_by_key(|(_, role)| *role);
        plan
    }

    /// Hint sent to every provider for `kind`
    pub fn hint_for(kind: CaptureKind) -> RecognitionHint {
        match kind {
            CaptureKind::Trailer => RecognitionHint {
                region: Some(PLATE_REGION_HINT.to_string()),
            },
            _ => RecognitionHint::default(),
        }
    }

    /// Run every relevant provider concurrently and merge the results.
    ///
    /// Never fails: providers that time out or error contribute nothing and
    /// are reported in `reports`.
    pub async fn extract(&self, image: &[u8], kind: CaptureKind) -> ExtractionRecord {
        let plan = self.dispatch_plan(kind);
        let hint = Self::hint_for(kind);

        let calls = plan.iter().map(|(provider, role)| {
            let hint = &hint;
            async move {
                let started = Instant::now();
                let result = tokio::time::timeout(PROVIDER_TIMEOUT, provider.recognize(image, hint))
                    .await
                    .unwrap_or_else(|_| Err(RecognitionError::Timeout(PROVIDER_TIMEOUT.as_secs())));
                let elapsed_ms = started.elapsed().as_millis() as u64;
                (provider.id(), *role, result, elapsed_ms)
            }
        });

        let results = join_all(calls).await;

        let mut record = ExtractionRecord::empty(kind);
        let mut outputs: Vec<(ProviderId, ProviderOutput)> = Vec::new();

        for (provider, role, result, elapsed_ms) in results {
            let report = match result {
                Ok(output) => {
                    tracing::debug!(
                        provider = %provider,
                        readings = output.readings.len(),
                        elapsed_ms,
                        "Provider returned"
                    );
                    outputs.push((provider, output));
                    ProviderReport {
                        provider,
                        role,
                        outcome: ProviderOutcome::Ok,
                        elapsed_ms,
                        message: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %provider,
                        kind = %kind,
                        elapsed_ms,
                        "Provider degraded to empty: {}",
                        e
                    );
                    let outcome = match e {
                        RecognitionError::Timeout(_) => ProviderOutcome::Timeout,
                        _ => ProviderOutcome::Error,
                    };
                    ProviderReport {
                        provider,
                        role,
                        outcome,
                        elapsed_ms,
                        message: Some(e.to_string()),
                    }
                }
            };
            record.reports.push(report);
        }

        record.container_number = resolve(outputs.iter().map(|(id, output)| {
            self.field_from(output, ReadingKind::ContainerNumber, |text| {
                self.corrector.extract_container_number(text)
            })
            .from_provider(*id)
        }));

        record.iso_code = resolve(outputs.iter().map(|(id, output)| {
            self.field_from(output, ReadingKind::IsoCode, |text| {
                self.corrector.extract_iso_code(text)
            })
            .from_provider(*id)
        }));

        record.plate = resolve(outputs.iter().map(|(id, output)| {
            self.plate_from(output).from_provider(*id)
        }));

        record.color = outputs.iter().find_map(|(id, output)| {
            dominant_color(&output.colors).map(|sample| ResolvedColor {
                label: self.classifier.classify(sample.rgb()),
                sample,
                provider: *id,
            })
        });

        record
    }

    /// Typed readings are tried before free text
    fn field_from<F>(&self, output: &ProviderOutput, kind: ReadingKind, extract: F) -> ExtractionField
    where
        F: Fn(&str) -> ExtractionField,
    {
        let typed = output.readings.iter().filter(|r| r.kind == kind);
        let text = output.readings.iter().filter(|r| r.kind == ReadingKind::Text);

        typed
            .chain(text)
            .map(|reading| extract(&reading.text))
            .find(|field| !field.is_empty())
            .unwrap_or_else(ExtractionField::empty)
    }

    /// Plates only come from plate readings
    fn plate_from(&self, output: &ProviderOutput) -> ExtractionField {
        output
            .readings
            .iter()
            .filter(|r| r.kind == ReadingKind::Plate)
            .find_map(|reading| {
                let mut field = self.corrector.extract_plate(&reading.text);
                if field.is_empty() {
                    return None;
                }
                if let Some(confidence) = reading.confidence {
                    field.confidence = confidence.clamp(0.0, 1.0);
                }
                Some(field)
            })
            .unwrap_or_else(ExtractionField::empty)
    }
}

/// Keep every non-empty candidate in priority order; the first one is shown
fn resolve(fields: impl Iterator<Item = ExtractionField>) -> ResolvedField {
    let candidates: Vec<ExtractionField> = fields.filter(|f| !f.is_empty()).collect();
    let value = candidates
        .first()
        .cloned()
        .unwrap_or_else(ExtractionField::empty);
    ResolvedField { value, candidates }
}

/// Largest pixel fraction wins, score breaks ties
fn dominant_color(colors: &[ColorSample]) -> Option<ColorSample> {
    colors.iter().copied().max_by(|a, b| {
        a.pixel_fraction
            .partial_cmp(&b.pixel_fraction)
            .unwrap_or(Ordering::Equal)
            .then(a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
    })
}

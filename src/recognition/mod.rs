//! Recognition Module
//!
//! Turns a cropped capture into structured identifiers.
//!
//! - `provider`: one adapter per external recognition service
//! - `gateway`: concurrent fan-out with per-call timeouts and merging
//! - `corrector`: container number / ISO code / plate extraction
//! - `color`: palette classification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use yardcam_server::recognition::{CaptureKind, ExtractionGateway};
//!
//! let gateway = ExtractionGateway::from_config(&config.providers);
//! let record = gateway.extract(&cropped_jpeg, CaptureKind::ContainerFrontWall).await;
//! println!("{}", record.container_number.value.corrected_value);
//! ```

mod color;
mod corrector;
mod gateway;
mod provider;
mod types;

pub use color::{ColorClassifier, ColorLabel, PaletteEntry, UnknownColor, CONTAINER_PALETTE};
pub use corrector::{ocr_confusion, TextCorrector, CORRECTED_CONFIDENCE, EXACT_MATCH_CONFIDENCE};
pub use gateway::{ExtractionGateway, PLATE_REGION_HINT, PROVIDER_TIMEOUT};
pub use provider::{
    parse_container_response, parse_plate_response, parse_vision_response, ContainerOcrProvider,
    HttpEndpoint, PlateRecognizerProvider, RecognitionProvider, VisionProvider,
};
pub use types::{
    CaptureKind, ColorSample, ExtractionField, ExtractionRecord, ProviderId, ProviderOutcome,
    ProviderOutput, ProviderReport, ProviderRole, RawReading, ReadingKind, RecognitionError,
    RecognitionHint, ResolvedColor, ResolvedField,
};

#[cfg(test)]
pub(crate) use provider::MockProvider;

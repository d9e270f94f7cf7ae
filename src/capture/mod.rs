//! Capture Module
//!
//! Everything between the shutter and the photo store: guide-frame cropping,
//! the per-capture state machine and the pipeline that ties them to
//! extraction and storage.

mod frame;
mod pipeline;
mod session;

pub use frame::{
    CropOutcome, CropRectangle, CroppedPhoto, FrameMapper, GeometryError, GuideFrame, RawPhoto,
    ScreenGeometry,
};
pub use pipeline::{CapturePipeline, CaptureResult, ExtractionPreview, InboundCaptureRequest};
pub use session::{CaptureSession, CaptureState, ConfirmedFields, FieldEdit, SessionError};

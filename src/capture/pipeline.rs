//! Capture Pipeline
//!
//! crop → extract → (operator fields) → store, driven through a
//! [`CaptureSession`].

use std::sync::Arc;

use serde::Serialize;

use super::frame::{CropOutcome, CroppedPhoto, FrameMapper, RawPhoto, ScreenGeometry};
use super::session::{CaptureSession, ConfirmedFields};
use crate::error::{AppError, Result};
use crate::photos::{PhotoLocation, PhotoRecord, PhotoStore};
use crate::recognition::{CaptureKind, ExtractionGateway, ExtractionRecord};

/// A capture as received from the device
#[derive(Debug, Clone)]
pub struct InboundCaptureRequest {
    pub subject_id: String,
    pub location: String,
    /// Defaults to the location's usual kind
    pub capture_kind: Option<CaptureKind>,
    pub image: Vec<u8>,
    pub mime_type: String,
    pub screen: ScreenGeometry,
    pub raw_width: u32,
    pub raw_height: u32,
}

impl InboundCaptureRequest {
    fn raw_photo(&self) -> RawPhoto {
        RawPhoto {
            width: self.raw_width,
            height: self.raw_height,
            bytes: self.image.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Crop and extraction without storage
#[derive(Debug, Clone)]
pub struct ExtractionPreview {
    pub location: PhotoLocation,
    pub kind: CaptureKind,
    pub photo: CroppedPhoto,
    pub extraction: ExtractionRecord,
}

/// Outcome of a stored capture
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub crop: CropOutcome,
    pub extraction_record: ExtractionRecord,
    pub photo_record: PhotoRecord,
    /// Blobs left behind by the replaced photo
    pub orphaned_blobs: Vec<String>,
}

/// Wires the frame mapper, extraction gateway and photo store together
#[derive(Clone)]
pub struct CapturePipeline {
    mapper: FrameMapper,
    gateway: Arc<ExtractionGateway>,
    store: PhotoStore,
}

impl CapturePipeline {
    pub fn new(gateway: Arc<ExtractionGateway>, store: PhotoStore) -> Self {
        Self {
            mapper: FrameMapper::new(),
            gateway,
            store,
        }
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    /// Crop and run extraction; nothing is stored
    pub async fn preview(&self, request: &InboundCaptureRequest) -> Result<ExtractionPreview> {
        let location = PhotoLocation::parse(&request.location)
            .map_err(crate::photos::PhotoStoreError::from)?;
        let kind = request
            .capture_kind
            .unwrap_or_else(|| location.default_capture_kind());

        let photo = self.mapper.crop_photo(&request.screen, request.raw_photo());
        let extraction = self.gateway.extract(&photo.bytes, kind).await;

        Ok(ExtractionPreview {
            location,
            kind,
            photo,
            extraction,
        })
    }

    /// Full capture: crop, extract, apply operator values, store.
    ///
    /// Fields present in `confirmed` override what extraction found, and a
    /// `null` clears the field. Providers are called again here, so a client
    /// that wants the preview's values stored should send them back. Only a
    /// photo store write failure makes this fail after the location label
    /// has been accepted.
    pub async fn submit(
        &self,
        request: &InboundCaptureRequest,
        confirmed: Option<ConfirmedFields>,
    ) -> Result<CaptureResult> {
        let location = PhotoLocation::parse(&request.location)
            .map_err(crate::photos::PhotoStoreError::from)?;
        let kind = request
            .capture_kind
            .unwrap_or_else(|| location.default_capture_kind());

        let mut session = CaptureSession::new(request.subject_id.clone(), location, kind);

        let photo = self.mapper.crop_photo(&request.screen, request.raw_photo());
        let crop = photo.outcome.clone();
        session.capture(photo)?;

        let extraction = {
            let image = session.begin_extraction()?;
            self.gateway.extract(image, kind).await
        };
        session.finish_extraction(extraction.clone())?;

        for edit in confirmed.map(ConfirmedFields::into_edits).unwrap_or_default() {
            session.edit(edit)?;
        }

        let (upload, metadata) = session.begin_submit()?;
        let label = location.label();

        match self
            .store
            .put(&request.subject_id, &label, upload, metadata)
            .await
        {
            Ok(outcome) => {
                let photo_record = outcome.records.first().cloned().ok_or_else(|| {
                    AppError::Internal("Photo store returned no records".to_string())
                })?;
                let orphaned_blobs = outcome.orphaned_blobs.clone();
                session.submit_succeeded(outcome)?;

                tracing::info!(
                    subject_id = %request.subject_id,
                    location = %label,
                    kind = %kind,
                    cropped = crop.is_cropped(),
                    "Capture stored"
                );

                Ok(CaptureResult {
                    crop,
                    extraction_record: extraction,
                    photo_record,
                    orphaned_blobs,
                })
            }
            Err(e) => {
                session.submit_failed(e.to_string())?;
                Err(e.into())
            }
        }
    }
}

//! Capture Session
//!
//! Tracks one capture from shutter to storage:
//! `Idle → Captured → Extracting → ReadyToSubmit → Submitting → Stored | Failed`.
//! The session owns the capture buffers; they are dropped on retake and once
//! the photo is stored.

use serde::{Deserialize, Deserializer, Serialize};

use super::frame::CroppedPhoto;
use crate::photos::{PhotoLocation, PhotoMetadata, PhotoUpload, PutOutcome};
use crate::recognition::{CaptureKind, ColorLabel, ExtractionRecord};

/// Capture progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureState {
    Idle,
    Captured,
    Extracting,
    ReadyToSubmit,
    Submitting,
    Stored,
    Failed,
}

impl CaptureState {
    /// Nothing has been handed to the photo store yet
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            CaptureState::Idle
                | CaptureState::Captured
                | CaptureState::Extracting
                | CaptureState::ReadyToSubmit
                | CaptureState::Failed
        )
    }
}

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {action} while {from:?}")]
    InvalidTransition {
        from: CaptureState,
        action: &'static str,
    },
}

/// A single field change made by the operator
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    ContainerNumber(Option<String>),
    IsoCode(Option<String>),
    Plate(Option<String>),
    Color(Option<ColorLabel>),
}

/// Operator-confirmed values sent with a submit.
///
/// Each field is tri-state: absent keeps the extracted value, `null` clears
/// it, and a value replaces it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedFields {
    #[serde(default, deserialize_with = "present")]
    pub container_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub iso_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub plate: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub color: Option<Option<ColorLabel>>,
}

/// A field that appears in the body, `null` included
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ConfirmedFields {
    /// Edits for the fields the operator touched
    pub fn into_edits(self) -> Vec<FieldEdit> {
        let mut edits = Vec::new();
        if let Some(value) = self.container_number {
            edits.push(FieldEdit::ContainerNumber(value));
        }
        if let Some(value) = self.iso_code {
            edits.push(FieldEdit::IsoCode(value));
        }
        if let Some(value) = self.plate {
            edits.push(FieldEdit::Plate(value));
        }
        if let Some(value) = self.color {
            edits.push(FieldEdit::Color(value));
        }
        edits
    }
}

/// One capture in progress
#[derive(Debug)]
pub struct CaptureSession {
    subject_id: String,
    location: PhotoLocation,
    kind: CaptureKind,
    state: CaptureState,
    photo: Option<CroppedPhoto>,
    extraction: Option<ExtractionRecord>,
    fields: PhotoMetadata,
    stored: Option<PutOutcome>,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new(subject_id: impl Into<String>, location: PhotoLocation, kind: CaptureKind) -> Self {
        Self {
            subject_id: subject_id.into(),
            location,
            kind,
            state: CaptureState::Idle,
            photo: None,
            extraction: None,
            fields: PhotoMetadata::default(),
            stored: None,
            last_error: None,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn location(&self) -> PhotoLocation {
        self.location
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn photo(&self) -> Option<&CroppedPhoto> {
        self.photo.as_ref()
    }

    pub fn extraction(&self) -> Option<&ExtractionRecord> {
        self.extraction.as_ref()
    }

    /// Operator-editable field values
    pub fn fields(&self) -> &PhotoMetadata {
        &self.fields
    }

    pub fn stored(&self) -> Option<&PutOutcome> {
        self.stored.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn expect_state(&self, expected: CaptureState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    /// Idle → Captured
    pub fn capture(&mut self, photo: CroppedPhoto) -> Result<(), SessionError> {
        self.expect_state(CaptureState::Idle, "capture")?;
        self.photo = Some(photo);
        self.state = CaptureState::Captured;
        Ok(())
    }

    /// Captured → Extracting; returns the bytes to send to the providers
    pub fn begin_extraction(&mut self) -> Result<&[u8], SessionError> {
        self.expect_state(CaptureState::Captured, "start extraction")?;
        self.state = CaptureState::Extracting;
        Ok(self
            .photo
            .as_ref()
            .map(|photo| photo.bytes.as_slice())
            .unwrap_or_default())
    }

    /// Extracting → ReadyToSubmit, pre-filling the editable fields
    pub fn finish_extraction(&mut self, record: ExtractionRecord) -> Result<(), SessionError> {
        self.expect_state(CaptureState::Extracting, "finish extraction")?;

        let visible = |field: &crate::recognition::ResolvedField| {
            Some(field.value.corrected_value.clone()).filter(|v| !v.is_empty())
        };
        self.fields = PhotoMetadata {
            container_number: visible(&record.container_number),
            iso_code: visible(&record.iso_code),
            plate: visible(&record.plate),
            color: record.color.as_ref().map(|c| c.label),
        };
        self.extraction = Some(record);
        self.state = CaptureState::ReadyToSubmit;
        Ok(())
    }

    /// Operator edit; only allowed while reviewing
    pub fn edit(&mut self, edit: FieldEdit) -> Result<(), SessionError> {
        self.expect_state(CaptureState::ReadyToSubmit, "edit fields")?;
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
        };
        match edit {
            FieldEdit::ContainerNumber(value) => self.fields.container_number = clean(value),
            FieldEdit::IsoCode(value) => self.fields.iso_code = clean(value),
            FieldEdit::Plate(value) => self.fields.plate = clean(value),
            FieldEdit::Color(value) => self.fields.color = value,
        }
        Ok(())
    }

    /// ReadyToSubmit → Submitting; returns what to hand the photo store
    pub fn begin_submit(&mut self) -> Result<(PhotoUpload, PhotoMetadata), SessionError> {
        self.expect_state(CaptureState::ReadyToSubmit, "submit")?;
        let photo = self.photo.as_ref().ok_or(SessionError::InvalidTransition {
            from: self.state,
            action: "submit without a photo",
        })?;

        self.state = CaptureState::Submitting;
        self.last_error = None;
        Ok((
            PhotoUpload::new(photo.bytes.clone(), photo.mime_type.clone()),
            self.fields.clone(),
        ))
    }

    /// Submitting → Stored; buffers are released
    pub fn submit_succeeded(&mut self, outcome: PutOutcome) -> Result<(), SessionError> {
        self.expect_state(CaptureState::Submitting, "complete submit")?;
        self.photo = None;
        self.stored = Some(outcome);
        self.state = CaptureState::Stored;
        Ok(())
    }

    /// Submitting → Failed; buffers are kept for a retry
    pub fn submit_failed(&mut self, error: impl Into<String>) -> Result<(), SessionError> {
        self.expect_state(CaptureState::Submitting, "fail submit")?;
        self.last_error = Some(error.into());
        self.state = CaptureState::Failed;
        Ok(())
    }

    /// Failed → ReadyToSubmit
    pub fn retry_submit(&mut self) -> Result<(), SessionError> {
        self.expect_state(CaptureState::Failed, "retry submit")?;
        self.state = CaptureState::ReadyToSubmit;
        Ok(())
    }

    /// Back to Idle from any pre-submission state, discarding buffers
    pub fn retake(&mut self) -> Result<(), SessionError> {
        if !self.state.is_pre_submission() {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "retake",
            });
        }
        self.photo = None;
        self.extraction = None;
        self.fields = PhotoMetadata::default();
        self.last_error = None;
        self.state = CaptureState::Idle;
        Ok(())
    }
}

//! Capture routes
//!
//! Crop + extraction preview, and full capture submission.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::{decode_image, encode_image};
use crate::capture::{
    CaptureResult, ConfirmedFields, CropOutcome, InboundCaptureRequest, ScreenGeometry,
};
use crate::error::Result;
use crate::photos::PhotoLocation;
use crate::recognition::{CaptureKind, ExtractionRecord};
use crate::state::AppState;

/// Create the captures router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_capture))
        .route("/extract", post(extract_capture))
}

/// Capture request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureBody {
    pub subject_id: String,
    pub location: String,
    #[serde(default)]
    pub capture_kind: Option<CaptureKind>,
    /// Base64 image bytes
    pub image: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub screen: ScreenGeometry,
    pub raw_width: u32,
    pub raw_height: u32,
    /// Operator-confirmed values; only used on submit. A `null` field clears it.
    #[serde(default)]
    pub metadata: Option<ConfirmedFields>,
}

fn default_mime_type() -> String {
    "image/jpeg".to_string()
}

impl CaptureBody {
    fn into_request(self) -> Result<(InboundCaptureRequest, Option<ConfirmedFields>)> {
        let image = decode_image("image", &self.image)?;
        Ok((
            InboundCaptureRequest {
                subject_id: self.subject_id,
                location: self.location,
                capture_kind: self.capture_kind,
                image,
                mime_type: self.mime_type,
                screen: self.screen,
                raw_width: self.raw_width,
                raw_height: self.raw_height,
            },
            self.metadata,
        ))
    }
}

/// Extraction preview response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub location: PhotoLocation,
    pub kind: CaptureKind,
    pub crop: CropOutcome,
    pub extraction: ExtractionRecord,
    /// Base64 of the image that was sent to the providers
    pub cropped_image: String,
    pub cropped_mime_type: String,
}

/// Crop and extract without storing
async fn extract_capture(
    State(state): State<AppState>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<ExtractResponse>> {
    let (request, _) = body.into_request()?;
    let preview = state.pipeline().preview(&request).await?;

    Ok(Json(ExtractResponse {
        location: preview.location,
        kind: preview.kind,
        crop: preview.photo.outcome,
        extraction: preview.extraction,
        cropped_image: encode_image(&preview.photo.bytes),
        cropped_mime_type: preview.photo.mime_type,
    }))
}

/// Crop, extract and store
async fn submit_capture(
    State(state): State<AppState>,
    Json(body): Json<CaptureBody>,
) -> Result<(StatusCode, Json<CaptureResult>)> {
    let (request, confirmed) = body.into_request()?;
    let result = state.pipeline().submit(&request, confirmed).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use image::{ImageBuffer, Rgb};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::recognition::{
        CaptureKind, ExtractionGateway, MockProvider, ProviderId, ProviderOutput, ProviderRole,
        RawReading, ReadingKind,
    };
    use crate::routes::test_support::*;
    use crate::routes::{app, encode_image};

    fn jpeg_base64() -> String {
        let img = ImageBuffer::from_pixel(300, 400, Rgb([200u8, 40, 30]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
            .unwrap();
        encode_image(&buffer)
    }

    fn capture_body(location: &str) -> serde_json::Value {
        json!({
            "subjectId": "TS1",
            "location": location,
            "image": jpeg_base64(),
            "mimeType": "image/jpeg",
            "screen": {
                "width": 300.0,
                "height": 400.0,
                "frame": { "x": 50.0, "y": 100.0, "width": 200.0, "height": 150.0 }
            },
            "rawWidth": 300,
            "rawHeight": 400
        })
    }

    fn plate_gateway() -> ExtractionGateway {
        ExtractionGateway::new().with_provider(
            Arc::new(MockProvider::returning(
                ProviderId::PlateRecognizer,
                ProviderOutput {
                    readings: vec![RawReading::new(ReadingKind::Plate, "7abc123", Some(0.91))],
                    colors: vec![],
                },
            )),
            &[(CaptureKind::Trailer, ProviderRole::Primary)],
        )
    }

    #[tokio::test]
    async fn test_extract_returns_crop_and_fields() {
        let (state, _dir) = test_state(plate_gateway()).await;

        let response = app(state)
            .oneshot(json_request("POST", "/api/v1/captures/extract", capture_body("trailer")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "trailer");
        assert_eq!(body["crop"]["mode"], "cropped");
        assert_eq!(body["crop"]["rect"]["width"], 200);
        assert_eq!(body["extraction"]["plate"]["value"]["correctedValue"], "7ABC123");
        assert_eq!(body["croppedMimeType"], "image/jpeg");
        assert!(body["croppedImage"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn test_submit_stores_photo() {
        let (state, _dir) = test_state(plate_gateway()).await;
        let app = app(state.clone());

        let mut body = capture_body("trailer");
        body["metadata"] = json!({ "color": "grey" });

        let response = app
            .oneshot(json_request("POST", "/api/v1/captures", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["photoRecord"]["location"], "trailer");
        assert_eq!(body["photoRecord"]["metadata"]["plate"], "7ABC123");
        assert_eq!(body["photoRecord"]["metadata"]["color"], "Gray");

        let stored = state.photo_store().list_location("TS1", "trailer").await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_null_clears_plate() {
        let (state, _dir) = test_state(plate_gateway()).await;

        let mut body = capture_body("trailer");
        body["metadata"] = json!({ "plate": null });

        let response = app(state.clone())
            .oneshot(json_request("POST", "/api/v1/captures", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert!(body["photoRecord"]["metadata"].get("plate").is_none());

        let stored = state.photo_store().list_location("TS1", "trailer").await.unwrap();
        assert_eq!(stored[0].metadata.plate, None);
    }

    #[tokio::test]
    async fn test_invalid_location_is_unprocessable() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;

        let response = app(state)
            .oneshot(json_request("POST", "/api/v1/captures", capture_body("bonnet")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_location_label");
    }

    #[tokio::test]
    async fn test_bad_base64_is_rejected() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;
        let mut body = capture_body("inside");
        body["image"] = json!("%%%");

        let response = app(state)
            .oneshot(json_request("POST", "/api/v1/captures/extract", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

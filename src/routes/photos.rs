//! Photo routes
//!
//! Per-subject photo storage: replace a location's photos, list them and
//! serve their bytes.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::decode_image;
use crate::error::{AppError, Result};
use crate::photos::{PhotoMetadata, PhotoRecord, PhotoUpload, PutOutcome, SlotState};
use crate::state::AppState;

/// Create the photos router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:subject_id/photos", get(list_photos))
        .route(
            "/:subject_id/photos/:location",
            get(list_location_photos).put(put_photos),
        )
        .route(
            "/:subject_id/photos/:location/:sequence/content",
            get(photo_content),
        )
}

/// One photo in a put request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPayload {
    /// Base64 image bytes
    pub image: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "image/jpeg".to_string()
}

/// Put request body
#[derive(Debug, Deserialize)]
pub struct PutPhotosBody {
    pub photos: Vec<PhotoPayload>,
    #[serde(default)]
    pub metadata: PhotoMetadata,
}

/// Photos at one location
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPhotos {
    pub state: SlotState,
    pub photos: Vec<PhotoRecord>,
}

/// Replace the photos at a location
async fn put_photos(
    State(state): State<AppState>,
    Path((subject_id, location)): Path<(String, String)>,
    Json(body): Json<PutPhotosBody>,
) -> Result<Json<PutOutcome>> {
    let uploads = body
        .photos
        .iter()
        .enumerate()
        .map(|(i, photo)| {
            decode_image(&format!("photos[{}].image", i), &photo.image)
                .map(|bytes| PhotoUpload::new(bytes, photo.content_type.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let outcome = state
        .photo_store()
        .put_batch(&subject_id, &location, uploads, body.metadata)
        .await?;

    Ok(Json(outcome))
}

/// List every photo of a subject
async fn list_photos(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<PhotoRecord>>> {
    Ok(Json(state.photo_store().list(&subject_id).await?))
}

/// List the photos at one location
async fn list_location_photos(
    State(state): State<AppState>,
    Path((subject_id, location)): Path<(String, String)>,
) -> Result<Json<LocationPhotos>> {
    let store = state.photo_store();
    let photos = store.list_location(&subject_id, &location).await?;
    let slot = store.slot_state(&subject_id, &location).await?;

    Ok(Json(LocationPhotos {
        state: slot,
        photos,
    }))
}

/// Serve the bytes of one photo
async fn photo_content(
    State(state): State<AppState>,
    Path((subject_id, location, sequence)): Path<(String, String, u32)>,
) -> Result<impl IntoResponse> {
    let store = state.photo_store();
    let record = store
        .find(&subject_id, &location, sequence)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No photo {} at {} for {}",
                sequence, location, subject_id
            ))
        })?;

    let bytes = store.fetch_blob(&record).await?;

    Ok((
        [
            (header::CONTENT_TYPE, record.content_type),
            (header::ETAG, format!("\"{}\"", record.content_hash)),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::recognition::ExtractionGateway;
    use crate::routes::test_support::*;
    use crate::routes::{app, encode_image};

    fn put_body(photos: &[&[u8]]) -> serde_json::Value {
        json!({
            "photos": photos
                .iter()
                .map(|bytes| json!({ "image": encode_image(bytes), "contentType": "image/png" }))
                .collect::<Vec<_>>(),
            "metadata": { "containerNumber": "MSCU1234567" }
        })
    }

    #[tokio::test]
    async fn test_put_then_replace_damage_batch() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;
        let uri = "/api/v1/subjects/TS1/photos/damage@Front%20Wall";

        let response = app(state.clone())
            .oneshot(json_request("PUT", uri, put_body(&[b"p1", b"p2"])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["records"].as_array().map(|r| r.len()), Some(2));
        assert_eq!(body["replaced"], 0);

        let response = app(state.clone())
            .oneshot(json_request("PUT", uri, put_body(&[b"p3"])))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["replaced"], 2);

        let response = app(state).oneshot(get_request(uri)).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["state"], "present");
        let photos = body["photos"].as_array().cloned().unwrap_or_default();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0]["location"], "damage@Front Wall");
        assert_eq!(photos[0]["metadata"]["containerNumber"], "MSCU1234567");
    }

    #[tokio::test]
    async fn test_singleton_rejects_multiple_photos() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;

        let response = app(state)
            .oneshot(json_request(
                "PUT",
                "/api/v1/subjects/TS1/photos/front-wall",
                put_body(&[b"a", b"b"]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "singleton_batch");
    }

    #[tokio::test]
    async fn test_content_and_listing() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;

        app(state.clone())
            .oneshot(json_request(
                "PUT",
                "/api/v1/subjects/TS1/photos/driver",
                put_body(&[b"driver photo"]),
            ))
            .await
            .unwrap();

        let response = app(state.clone())
            .oneshot(get_request("/api/v1/subjects/TS1/photos/driver/0/content"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("image/png")
        );
        assert_eq!(body_bytes(response).await, b"driver photo");

        let response = app(state.clone())
            .oneshot(get_request("/api/v1/subjects/TS1/photos/driver/1/content"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(state)
            .oneshot(get_request("/api/v1/subjects/TS1/photos"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(|p| p.len()), Some(1));
    }

    #[tokio::test]
    async fn test_empty_location_state() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;

        let response = app(state)
            .oneshot(get_request("/api/v1/subjects/TS9/photos/inside"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["state"], "empty");
        assert_eq!(body["photos"], json!([]));
    }
}

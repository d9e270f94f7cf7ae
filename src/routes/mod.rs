//! Route modules for Yardcam Server

pub mod captures;
pub mod health;
pub mod photos;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use base64::Engine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Images travel base64-encoded inside JSON, so bodies get large
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/captures", captures::router())
        .nest("/api/v1/subjects", photos::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Decode a base64 image field, accepting an optional data-URL prefix
pub(crate) fn decode_image(field: &str, value: &str) -> Result<Vec<u8>> {
    let payload = match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(format!("{} is not valid base64: {}", field, e)))
}

pub(crate) fn encode_image(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response};
    use tempfile::TempDir;

    use crate::config::Config;
    use crate::db::memory_pool;
    use crate::recognition::ExtractionGateway;
    use crate::state::AppState;
    use crate::storage::LocalBlobStorage;

    pub async fn test_state(gateway: ExtractionGateway) -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let blobs = Arc::new(LocalBlobStorage::new(temp_dir.path().to_path_buf()));
        let state = AppState::new(Config::default(), blobs, memory_pool().await, gateway);
        (state, temp_dir)
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    pub async fn body_json(response: Response<Body>) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::recognition::ExtractionGateway;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn test_decode_image() {
        assert_eq!(decode_image("image", "aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_image("image", "data:image/jpeg;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(matches!(
            decode_image("image", "not base64!"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state(ExtractionGateway::new()).await;

        let response = app(state).oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "local");
        assert_eq!(body["providers"].as_array().map(|p| p.len()), Some(3));
    }
}

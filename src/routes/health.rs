//! Health check route

use axum::{extract::State, Json};
use serde::Serialize;

use crate::recognition::CaptureKind;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
    /// Providers registered per capture kind
    providers: Vec<ProviderSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    kind: CaptureKind,
    providers: Vec<String>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = [
        CaptureKind::ContainerFrontWall,
        CaptureKind::Trailer,
        CaptureKind::Generic,
    ]
    .into_iter()
    .map(|kind| ProviderSummary {
        kind,
        providers: state
            .gateway()
            .providers_for(kind)
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect(),
    })
    .collect();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        storage: state.blobs().backend(),
        providers,
    })
}

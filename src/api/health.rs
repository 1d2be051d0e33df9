use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;
use crate::ml::{artifact::ArtifactFormat, transform::TargetTransform, FeatureColumn};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    model: ModelInfo,
}

/// What the server loaded at startup
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    format: ArtifactFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    target_transform: TargetTransform,
    target_unit: String,
    feature_columns: Vec<FeatureColumn>,
}

/// GET /health - Health check endpoint
///
/// The artifact is validated before the listener starts, so a running
/// server always reports healthy along with what it is serving.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let predictor = &state.predictor;
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        model: ModelInfo {
            format: predictor.format(),
            version: predictor.version(),
            target_transform: predictor.transform(),
            target_unit: predictor.target_unit().to_string(),
            feature_columns: predictor.feature_columns().to_vec(),
        },
    };

    (StatusCode::OK, Json(response))
}

/// GET /healthz - Liveness probe
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}

pub mod error;
pub mod health;
pub mod predict;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    config::{InputBounds, ServerConfig},
    ml::inference::SolarPredictor,
};

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<SolarPredictor>,
    pub bounds: InputBounds,
}

impl AppState {
    pub fn new(predictor: SolarPredictor, bounds: InputBounds) -> Self {
        Self {
            predictor: Arc::new(predictor),
            bounds,
        }
    }
}

pub fn router(state: AppState, cfg: &ServerConfig) -> Router {
    Router::new()
        .route("/predict", post(predict::predict))
        .route("/health", get(health::health_check))
        .route("/healthz", get(health::liveness_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(cfg.body_limit_bytes))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}

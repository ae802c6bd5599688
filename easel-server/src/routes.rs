use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use easel_core::{generate_data_url, GenerationRequest, ModelHandle, ModelUnavailable};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Serialize)]
struct GenerationResponse {
    url: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

// Application state: the handle built at startup and the name it was built from.
pub struct AppState {
    pub model_name: String,
    pub handle: ModelHandle,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] JsonRejection),
    #[error(transparent)]
    NotInitialized(#[from] ModelUnavailable),
    #[error("{0}")]
    Generation(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Self::Rejected(rejection) => (rejection.status(), rejection.body_text()),
            Self::NotInitialized(_) | Self::Generation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/generate-image", post(generate_image_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Runs the shared pipeline inline; the worker is blocked until inference ends.
async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let Json(request) = payload?;
    let model = state
        .handle
        .model()
        .inspect_err(|e| warn!("rejecting generation request: {e}"))?;

    let url = generate_data_url(model.as_ref(), &request).map_err(|e| {
        error!("error generating image: {e:#}");
        ApiError::Generation(format!("{e:#}"))
    })?;

    Ok(Json(GenerationResponse { url }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.handle {
        ModelHandle::Ready { placement, .. } => Json(json!({
            "status": "ready",
            "model": state.model_name,
            "device": placement.device_map.to_string(),
            "precision": placement.precision.to_string(),
        }))
        .into_response(),
        ModelHandle::Unavailable { reason } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "model": state.model_name,
                "error": &**reason,
            })),
        )
            .into_response(),
    }
}

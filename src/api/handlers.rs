use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::{gather_metrics, metrics_content_type};
use crate::ml::registry::ModelInfo;
use crate::serving::{RetrainTrigger, RiskRequest, RiskResponse};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.serving.is_loaded(),
        model: state.serving.model_info(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
}

/// Score one student record
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<RiskRequest>,
) -> Result<Json<RiskResponse>> {
    let response = state.serving.predict(&request)?;
    Ok(Json(response))
}

/// Resolve the production alias again and swap the served model
pub async fn reload_model(State(state): State<AppState>) -> Result<Json<ReloadResponse>> {
    let serving = state.serving.clone();
    let info = tokio::task::spawn_blocking(move || serving.reload())
        .await
        .map_err(|e| AppError::Reload(format!("reload task failed: {}", e)))??;

    Ok(Json(ReloadResponse {
        status: "success".to_string(),
        detail: format!(
            "Loaded {} version {} from alias '{}'",
            info.name,
            info.version,
            state.serving.alias()
        ),
        version: info.version,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub status: String,
    pub detail: String,
    pub version: u32,
}

/// Queue a background training run; never waits for it
pub async fn retrain_model(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RetrainResponse>)> {
    let message = match state.retrain.trigger()? {
        RetrainTrigger::Started(_) => "Retraining started in the background",
        RetrainTrigger::AlreadyRunning => "A retraining run is already in progress",
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(RetrainResponse {
            status: "accepted".to_string(),
            message: message.to_string(),
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub status: String,
    pub message: String,
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, metrics_content_type())],
        gather_metrics(),
    )
}

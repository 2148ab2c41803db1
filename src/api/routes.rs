use crate::api::{handlers, AppState};
use crate::metrics::{MetricsConfig, MetricsMiddleware};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    build_router_with_metrics(state, MetricsConfig::default(), DEFAULT_REQUEST_TIMEOUT)
}

/// Requests still running after `request_timeout` are answered with 408
pub fn build_router_with_metrics(
    state: AppState,
    metrics: MetricsConfig,
    request_timeout: Duration,
) -> Router {
    let metrics_endpoint = metrics.endpoint.clone();

    Router::new()
        // Health endpoints
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        // Scoring
        .route("/predict", post(handlers::predict))
        // Model lifecycle
        .route("/reload", post(handlers::reload_model))
        .route("/retrain", post(handlers::retrain_model))
        .route(&metrics_endpoint, get(handlers::metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(MetricsMiddleware::layer_with_config(metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

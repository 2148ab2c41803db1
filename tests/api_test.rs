//! HTTP API tests driven through the router with `oneshot`.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use student_risk::{
    api::{build_router, build_router_with_metrics, AppState},
    data::Table,
    error::{AppError, Result},
    metrics::MetricsConfig,
    ml::{LoadedModel, ModelInfo, ModelLoader, RiskModel, TrainingOutcome},
    serving::{RetrainScheduler, ServingContext, TrainingJob},
};
use tower::ServiceExt;

struct ConstantModel(f64);

impl RiskModel for ConstantModel {
    fn predict_proba(&self, x: &Table) -> Result<Vec<f64>> {
        Ok(vec![self.0; x.n_rows()])
    }
}

/// Serves whatever probability is queued next; fails when empty
#[derive(Default)]
struct QueueLoader {
    next: Mutex<Vec<f64>>,
    version: AtomicUsize,
}

impl QueueLoader {
    fn push(&self, probability: f64) {
        self.next.lock().push(probability);
    }
}

impl ModelLoader for QueueLoader {
    fn load_alias(&self, alias: &str) -> Result<LoadedModel> {
        let probability = self
            .next
            .lock()
            .pop()
            .ok_or_else(|| AppError::Registry(format!("alias '{}' is not set", alias)))?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        Ok(LoadedModel {
            model: Arc::new(ConstantModel(probability)),
            info: ModelInfo {
                name: "student-risk-classifier".to_string(),
                version,
                alias: Some(alias.to_string()),
                loaded_at: Utc::now(),
            },
        })
    }
}

/// Takes longer than the router timeout used in the timeout test
struct SlowLoader;

impl ModelLoader for SlowLoader {
    fn load_alias(&self, alias: &str) -> Result<LoadedModel> {
        std::thread::sleep(Duration::from_millis(500));
        Err(AppError::Registry(format!("alias '{}' is not set", alias)))
    }
}

#[derive(Default)]
struct NoopJob {
    runs: AtomicUsize,
}

impl TrainingJob for NoopJob {
    fn run(&self) -> Result<TrainingOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(TrainingOutcome::Skipped {
            reason: "test".to_string(),
        })
    }
}

struct Harness {
    app: Router,
    loader: Arc<QueueLoader>,
    serving: Arc<ServingContext>,
}

fn harness() -> Harness {
    let loader = Arc::new(QueueLoader::default());
    let serving = Arc::new(ServingContext::new(loader.clone(), "production"));
    let retrain = Arc::new(RetrainScheduler::new(Arc::new(NoopJob::default())));
    let app = build_router(AppState::new(serving.clone(), retrain));
    Harness {
        app,
        loader,
        serving,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn student() -> Value {
    json!({"IAA": 5.5, "IEG": 2.0, "IPS": 6.0, "IDA": 4.5, "IPV": 7.0})
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness();
    for uri in ["/", "/health"] {
        let (status, body) = send(&h.app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], false);
    }
}

#[tokio::test]
async fn test_predict_high_probability_flags_risk() {
    let h = harness();
    h.loader.push(0.8);
    h.serving.reload().unwrap();

    let (status, body) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_detected"], 1);
    assert_eq!(body["probability"], 0.8);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("risk detected"));
}

#[tokio::test]
async fn test_predict_low_probability() {
    let h = harness();
    h.loader.push(0.1);
    h.serving.reload().unwrap();

    let (status, body) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_detected"], 0);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("low risk"));
}

#[tokio::test]
async fn test_predict_threshold_boundary() {
    let h = harness();
    h.loader.push(0.40);
    h.serving.reload().unwrap();

    let (_, body) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(body["risk_detected"], 1);
}

#[tokio::test]
async fn test_predict_without_model_is_server_error() {
    let h = harness();

    let (status, body) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Model not loaded"));
    assert_eq!(body["error"]["code"], "MODEL_NOT_LOADED");
}

#[tokio::test]
async fn test_predict_accepts_out_of_range_scores() {
    let h = harness();
    h.loader.push(0.5);
    h.serving.reload().unwrap();

    let body = json!({"IAA": 10.5, "IEG": -1.0, "IPS": 6.0, "IDA": 4.5, "IPV": 7.0});
    let (status, body) = send(&h.app, post_json("/predict", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_detected"], 1);
}

#[tokio::test]
async fn test_predict_rejects_overlong_text() {
    let h = harness();
    h.loader.push(0.5);
    h.serving.reload().unwrap();

    let mut body = student();
    body["Pedra"] = json!("A".repeat(101));
    let (status, body) = send(&h.app, post_json("/predict", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_predict_rejects_missing_indicator() {
    let h = harness();
    h.loader.push(0.5);
    h.serving.reload().unwrap();

    let body = json!({"IAA": 5.5, "IEG": 2.0, "IPS": 6.0, "IDA": 4.5});
    let (status, _) = send(&h.app, post_json("/predict", &body)).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_predict_accepts_optional_fields() {
    let h = harness();
    h.loader.push(0.3);
    h.serving.reload().unwrap();

    let body = json!({
        "IAA": 5.5, "IEG": 2.0, "IPS": 6.0, "IDA": 4.5, "IPV": 7.0,
        "Idade": 12, "Fase": "Fase 2", "Pedra": "Ametista",
        "Instituicao_de_ensino": "Escola Pública", "Genero": "Menina"
    });
    let (status, body) = send(&h.app, post_json("/predict", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_detected"], 0);
}

#[tokio::test]
async fn test_reload_swaps_the_served_model() {
    let h = harness();
    h.loader.push(0.1);
    let (status, body) = send(&h.app, post_empty("/reload")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["version"], 1);

    let (_, before) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(before["risk_detected"], 0);

    h.loader.push(0.9);
    let (_, body) = send(&h.app, post_empty("/reload")).await;
    assert_eq!(body["version"], 2);

    let (_, after) = send(&h.app, post_json("/predict", &student())).await;
    assert_eq!(after["risk_detected"], 1);
}

#[tokio::test]
async fn test_reload_failure_is_reported_distinctly() {
    let h = harness();
    let (status, body) = send(&h.app, post_empty("/reload")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "RELOAD_ERROR");
}

#[tokio::test]
async fn test_slow_requests_time_out() {
    let serving = Arc::new(ServingContext::new(Arc::new(SlowLoader), "production"));
    let retrain = Arc::new(RetrainScheduler::new(Arc::new(NoopJob::default())));
    let app = build_router_with_metrics(
        AppState::new(serving, retrain),
        MetricsConfig::default(),
        Duration::from_millis(50),
    );

    let (status, _) = send(&app, post_empty("/reload")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_retrain_is_accepted_immediately() {
    let h = harness();
    let (status, body) = send(&h.app, post_empty("/retrain")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    student_risk::metrics::init_metrics().unwrap();
    let h = harness();
    h.loader.push(0.8);
    h.serving.reload().unwrap();
    send(&h.app, post_json("/predict", &student())).await;

    let response = h.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("student_risk_predictions_total"));
    assert!(text.contains("student_risk_input_feature_value"));
}

//! Prometheus metrics for the risk service.
//!
//! Covers HTTP traffic, prediction outcomes, recent input values and the
//! model lifecycle (reloads, training runs, whether a model is loaded).
//!
//! # Example
//! ```no_run
//! use student_risk::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["1"]).inc();
//! ```

mod config;
mod middleware;

pub use config::MetricsConfig;
pub use middleware::{MetricsLayer, MetricsMiddleware, MetricsService};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use prometheus::{CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "student_risk";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    static ref REGISTERED: Mutex<bool> = Mutex::new(false);

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    /// Requests currently being handled
    pub static ref HTTP_REQUESTS_IN_FLIGHT: Gauge = Gauge::with_opts(
        Opts::new("http_requests_in_flight", "Requests currently being handled")
            .namespace(NAMESPACE)
    ).expect("Failed to create HTTP_REQUESTS_IN_FLIGHT metric");

    // ============================================================================
    // Prediction Metrics
    // ============================================================================

    /// Predictions served, by verdict
    ///
    /// Labels: risk ("0" or "1")
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of predictions by risk label")
            .namespace(NAMESPACE),
        &["risk"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Distribution of predicted risk probabilities
    pub static ref PREDICTION_PROBABILITY: Histogram = Histogram::with_opts(
        HistogramOpts::new("prediction_probability", "Predicted positive-class probability")
            .namespace(NAMESPACE)
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0])
    ).expect("Failed to create PREDICTION_PROBABILITY metric");

    /// Most recent value seen for each input indicator
    ///
    /// Labels: feature
    pub static ref INPUT_FEATURE_VALUE: GaugeVec = GaugeVec::new(
        Opts::new("input_feature_value", "Most recent input value per feature")
            .namespace(NAMESPACE),
        &["feature"]
    ).expect("Failed to create INPUT_FEATURE_VALUE metric");

    // ============================================================================
    // Model Lifecycle Metrics
    // ============================================================================

    /// Reload attempts
    ///
    /// Labels: status ("success" or "failure")
    pub static ref MODEL_RELOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("model_reloads_total", "Total number of model reload attempts")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create MODEL_RELOADS_TOTAL metric");

    /// Training runs
    ///
    /// Labels: status ("completed", "skipped", "failed", "panicked")
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Total number of training runs")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    /// 1 when a model is loaded for serving
    pub static ref MODEL_LOADED: Gauge = Gauge::with_opts(
        Opts::new("model_loaded", "Whether a model is loaded for serving")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_LOADED metric");

    // ============================================================================
    // Error & System Metrics
    // ============================================================================

    /// Total number of errors
    ///
    /// Labels: component, error_type
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("errors_total", "Total number of errors")
            .namespace(NAMESPACE),
        &["component", "error_type"]
    ).expect("Failed to create ERRORS_TOTAL metric");

    /// Application build info
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Application build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register every metric with the global registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let mut registered = REGISTERED.lock();
    if *registered {
        return Ok(());
    }

    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_PROBABILITY.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INPUT_FEATURE_VALUE.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(MODEL_RELOADS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(TRAINING_RUNS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_LOADED.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    *registered = true;
    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Prometheus text exposition of the global registry
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Content type of the text exposition format
pub fn metrics_content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_prediction_metrics() {
        PREDICTIONS_TOTAL.with_label_values(&["1"]).inc();
        assert!(PREDICTIONS_TOTAL.with_label_values(&["1"]).get() >= 1.0);

        INPUT_FEATURE_VALUE.with_label_values(&["IAA"]).set(5.5);
        assert_eq!(INPUT_FEATURE_VALUE.with_label_values(&["IAA"]).get(), 5.5);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        MODEL_RELOADS_TOTAL.with_label_values(&["success"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("student_risk_model_reloads_total"));
        assert!(metrics.contains("student_risk_build_info"));
    }
}

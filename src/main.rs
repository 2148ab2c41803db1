use anyhow::Context;
use student_risk::{
    api::{build_router_with_metrics, AppState},
    config::Config,
    metrics::MetricsConfig,
    ml::{FileModelRegistry, TrainingOrchestrator},
    serving::{RetrainScheduler, ServingContext},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    tracing::info!(
        "Starting {} v{}",
        config.observability.service_name,
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    let metrics_config = if config.observability.prometheus_enabled {
        if let Err(e) = student_risk::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
        MetricsConfig::default()
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
        MetricsConfig::disabled()
    };

    let registry = Arc::new(FileModelRegistry::new(
        &config.registry.root,
        &config.registry.model_name,
    ));
    tracing::info!(
        root = %config.registry.root.display(),
        model = %registry.name(),
        "✅ Model registry initialized"
    );

    let serving = Arc::new(
        ServingContext::new(registry, config.registry.production_alias.clone())
            .with_threshold(config.serving.threshold)
            .with_cleaning(config.cleaning.clone())
            .with_features(config.features.clone()),
    );

    if config.serving.load_on_startup {
        let ctx = serving.clone();
        match tokio::task::spawn_blocking(move || ctx.reload()).await? {
            Ok(info) => tracing::info!(version = info.version, "✅ Production model loaded"),
            Err(e) => {
                tracing::warn!("⚠️  No model loaded at startup: {}", e);
                tracing::warn!("   /predict will fail until /reload succeeds");
            }
        }
    }

    let retrain = Arc::new(RetrainScheduler::new(Arc::new(
        TrainingOrchestrator::from_config(&config),
    )));
    tracing::info!("✅ Retrain scheduler initialized");

    let app = build_router_with_metrics(
        AppState::new(serving, retrain),
        metrics_config,
        Duration::from_secs(config.server.request_timeout_secs),
    );
    tracing::info!(
        timeout_secs = config.server.request_timeout_secs,
        "✅ HTTP router built"
    );

    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Predict: POST http://{}/predict", http_addr);
    tracing::info!("   Metrics: http://{}/metrics", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "student_risk={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

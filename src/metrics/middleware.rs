//! HTTP middleware recording request count, duration and in-flight requests
use super::*;
use axum::{
    extract::{MatchedPath, Request},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Entry point for building the metrics layer
#[derive(Clone, Default)]
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    pub fn layer() -> MetricsLayer {
        Self::layer_with_config(MetricsConfig::default())
    }

    pub fn layer_with_config(config: MetricsConfig) -> MetricsLayer {
        MetricsLayer {
            config: Arc::new(config),
        }
    }
}

/// Tower layer for metrics middleware
#[derive(Clone)]
pub struct MetricsLayer {
    config: Arc<MetricsConfig>,
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    config: Arc<MetricsConfig>,
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if !self.config.enabled {
            return Box::pin(self.inner.call(req));
        }

        let config = self.config.clone();
        let method = req.method().to_string();
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        if config.is_path_excluded(&path) {
            return Box::pin(self.inner.call(req));
        }

        HTTP_REQUESTS_IN_FLIGHT.inc();
        let start = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            HTTP_REQUESTS_IN_FLIGHT.dec();

            match result {
                Ok(response) => {
                    let status = response.status().as_u16().to_string();
                    HTTP_REQUESTS_TOTAL
                        .with_label_values(&[&method, &path, &status])
                        .inc();

                    if config.enable_histograms {
                        HTTP_REQUEST_DURATION_SECONDS
                            .with_label_values(&[&method, &path])
                            .observe(start.elapsed().as_secs_f64());
                    }
                    Ok(response)
                }
                Err(e) => {
                    ERRORS_TOTAL
                        .with_label_values(&["http_middleware", "request_error"])
                        .inc();
                    Err(e)
                }
            }
        })
    }
}

use crate::data::cleaning::{clean_data_with, CleaningConfig};
use crate::error::{AppError, Result};
use crate::features::{create_features_with, FeatureConfig};
use crate::metrics::{
    INPUT_FEATURE_VALUE, MODEL_LOADED, MODEL_RELOADS_TOTAL, PREDICTIONS_TOTAL,
    PREDICTION_PROBABILITY,
};
use crate::ml::registry::{LoadedModel, ModelInfo, ModelLoader};
use crate::serving::schemas::{RiskRequest, RiskResponse};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info};
use validator::Validate;

/// Operational decision threshold on the positive-class probability
pub const DEFAULT_SERVING_THRESHOLD: f64 = 0.40;

/// Holds the model being served and scores requests against it.
///
/// The model sits behind `RwLock<Option<Arc<_>>>`; the lock is only held to
/// clone or replace the pointer, so a reload never blocks an in-flight
/// prediction and readers always see one complete model.
pub struct ServingContext {
    current: RwLock<Option<Arc<LoadedModel>>>,
    loader: Arc<dyn ModelLoader>,
    alias: String,
    threshold: f64,
    cleaning: CleaningConfig,
    features: FeatureConfig,
}

impl ServingContext {
    pub fn new(loader: Arc<dyn ModelLoader>, alias: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(None),
            loader,
            alias: alias.into(),
            threshold: DEFAULT_SERVING_THRESHOLD,
            cleaning: CleaningConfig::default(),
            features: FeatureConfig::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = cleaning;
        self
    }

    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Snapshot of the model currently served
    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.current().map(|loaded| loaded.info.clone())
    }

    /// Replace the served model
    pub fn install(&self, model: LoadedModel) {
        let info = model.info.clone();
        let description = model.model.describe();
        let previous = self.current.write().replace(Arc::new(model));
        MODEL_LOADED.set(1.0);
        info!(
            model = %info.name,
            version = info.version,
            previous_version = ?previous.map(|p| p.info.version),
            model_kind = %description,
            "Serving model swapped"
        );
    }

    /// Score one record: clean, engineer features, predict, threshold
    pub fn predict(&self, request: &RiskRequest) -> Result<RiskResponse> {
        request.validate()?;

        let loaded = self.current().ok_or(AppError::ModelNotLoaded)?;

        for (feature, value) in request.indicators() {
            INPUT_FEATURE_VALUE.with_label_values(&[feature]).set(value);
        }

        let probability = self.score(&loaded, request).map_err(|e| {
            error!(error = %e, version = loaded.info.version, "Inference failed");
            match e {
                AppError::Prediction(_) => e,
                other => AppError::Prediction(other.to_string()),
            }
        })?;

        let response = RiskResponse::from_probability(probability, self.threshold);
        PREDICTIONS_TOTAL
            .with_label_values(&[&response.risk_detected.to_string()])
            .inc();
        PREDICTION_PROBABILITY.observe(probability);

        debug!(
            probability,
            risk = response.risk_detected,
            version = loaded.info.version,
            "Prediction served"
        );
        Ok(response)
    }

    fn score(&self, loaded: &LoadedModel, request: &RiskRequest) -> Result<f64> {
        let raw = request.to_table()?;
        let clean = clean_data_with(&raw, &self.cleaning);
        let (x, _) = create_features_with(&clean, &self.features)?;

        let probabilities = loaded.model.predict_proba(&x)?;
        let probability = probabilities
            .first()
            .copied()
            .ok_or_else(|| AppError::Prediction("model returned no probability".to_string()))?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(AppError::Prediction(format!(
                "probability {} is outside [0, 1]",
                probability
            )));
        }
        Ok(probability)
    }

    /// Resolve the alias again and swap the result in.
    ///
    /// On failure the previously served model, if any, stays in place.
    pub fn reload(&self) -> Result<ModelInfo> {
        match self.loader.load_alias(&self.alias) {
            Ok(loaded) => {
                let info = loaded.info.clone();
                self.install(loaded);
                MODEL_RELOADS_TOTAL.with_label_values(&["success"]).inc();
                Ok(info)
            }
            Err(e) => {
                MODEL_RELOADS_TOTAL.with_label_values(&["failure"]).inc();
                error!(alias = %self.alias, error = %e, "Model reload failed");
                Err(AppError::Reload(e.to_string()))
            }
        }
    }
}

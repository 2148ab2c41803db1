use crate::config::{Config, RegistryConfig, TrackingConfig};
use crate::data::cleaning::{clean_data_with, CleaningConfig};
use crate::data::loader::load_data;
use crate::data::Table;
use crate::error::{AppError, Result};
use crate::features::{create_training_features, FeatureConfig};
use crate::metrics::TRAINING_RUNS_TOTAL;
use crate::ml::evaluation::evaluate_model;
use crate::ml::models::{EvaluationReport, Hyperparameters, TrainingConfig};
use crate::ml::pipeline::RiskPipeline;
use crate::ml::registry::{FileModelRegistry, Registration};
use crate::ml::search::{stratified_split, RandomizedSearch, SearchSpace};
use crate::ml::tracking::{FileRunTracker, RunStatus, RunTracker};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a training run ended
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    /// Model fitted, persisted and registered
    Completed(Box<TrainingSummary>),

    /// Source files could not be read; nothing was written
    Skipped { reason: String },
}

impl TrainingOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            TrainingOutcome::Completed(_) => "completed",
            TrainingOutcome::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub run_id: Option<String>,
    pub artifact_path: PathBuf,
    pub registered_version: u32,
    pub promoted: bool,
    pub best_params: Hyperparameters,
    pub cv_recall: f64,
    pub feature_columns: Vec<String>,
    pub report: EvaluationReport,
}

/// Runs load, clean, features, search, evaluation, persistence and
/// registration end to end
#[derive(Debug, Clone)]
pub struct TrainingOrchestrator {
    sources: BTreeMap<String, PathBuf>,
    cleaning: CleaningConfig,
    features: FeatureConfig,
    training: TrainingConfig,
    registry: RegistryConfig,
    tracking: TrackingConfig,
    search_space: SearchSpace,
}

impl TrainingOrchestrator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sources: config.data.sources.clone(),
            cleaning: config.cleaning.clone(),
            features: config.features.clone(),
            training: config.training.clone(),
            registry: config.registry.clone(),
            tracking: config.tracking.clone(),
            search_space: SearchSpace::default(),
        }
    }

    /// Replace the hyperparameter grid
    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = space;
        self
    }

    /// Run a full training pass.
    ///
    /// Unreadable source files end the run as `Skipped` without writing
    /// anything; every other failure is returned.
    pub fn run_training(&self) -> Result<TrainingOutcome> {
        let started = Instant::now();
        let result = self.run();

        let status = match &result {
            Ok(outcome) => outcome.status(),
            Err(_) => "failed",
        };
        TRAINING_RUNS_TOTAL.with_label_values(&[status]).inc();

        match &result {
            Ok(TrainingOutcome::Completed(summary)) => info!(
                version = summary.registered_version,
                recall = summary.report.recall,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "✅ Training run completed"
            ),
            Ok(TrainingOutcome::Skipped { reason }) => {
                warn!(reason = %reason, "Training run skipped")
            }
            Err(e) => error!(error = %e, "Training run failed"),
        }
        result
    }

    fn run(&self) -> Result<TrainingOutcome> {
        info!(sources = self.sources.len(), "[1/6] Loading data");
        let raw = match load_data(&self.sources) {
            Ok(table) => table,
            Err(AppError::FileAccess(reason)) => {
                return Ok(TrainingOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        };

        info!(rows = raw.n_rows(), "[2/6] Cleaning data");
        let clean = clean_data_with(&raw, &self.cleaning);

        info!(rows = clean.n_rows(), "[3/6] Engineering features");
        let (x, y) = create_training_features(&clean, &self.features)?;
        let feature_columns: Vec<String> = x.column_names().into_iter().map(str::to_string).collect();
        info!(features = ?feature_columns, "Final feature set");

        let seed = self.training.random_state;
        let (train_idx, test_idx) = stratified_split(&y, self.training.test_size, seed)?;
        let x_train = x.take_rows(&train_idx);
        let y_train: Vec<u8> = train_idx.iter().map(|&i| y[i]).collect();
        let x_test = x.take_rows(&test_idx);
        let y_test: Vec<u8> = test_idx.iter().map(|&i| y[i]).collect();

        let tracker = self.start_tracker();
        let tracker_ref = tracker.as_ref().map(|t| t as &dyn RunTracker);

        let result = self.fit_and_register(
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            feature_columns,
            tracker_ref,
        );

        if let Some(tracker) = &tracker {
            let status = if result.is_ok() {
                RunStatus::Finished
            } else {
                RunStatus::Failed
            };
            if let Err(e) = tracker.finish(status) {
                warn!(error = %e, "Failed to close tracked run");
            }
        }

        result.map(|summary| TrainingOutcome::Completed(Box::new(summary)))
    }

    fn fit_and_register(
        &self,
        x_train: &Table,
        y_train: &[u8],
        x_test: &Table,
        y_test: &[u8],
        feature_columns: Vec<String>,
        tracker: Option<&dyn RunTracker>,
    ) -> Result<TrainingSummary> {
        let seed = self.training.random_state;

        info!(
            train_rows = x_train.n_rows(),
            n_iter = self.training.n_iter,
            cv_folds = self.training.cv_folds,
            "[4/6] Searching hyperparameters"
        );
        let search = RandomizedSearch::new(
            self.search_space.clone(),
            self.training.n_iter,
            self.training.cv_folds,
            seed,
        )
        .fit(x_train, y_train)?;

        info!(params = %search.best_params, "[5/6] Fitting best candidate");
        let pipeline = RiskPipeline::fit(x_train, y_train, &search.best_params, seed)?;

        if let Some(tracker) = tracker {
            let mut params = search.best_params.to_params();
            params.insert("test_size".to_string(), self.training.test_size.to_string());
            params.insert("random_state".to_string(), seed.to_string());
            params.insert("cv_folds".to_string(), self.training.cv_folds.to_string());
            params.insert("n_iter".to_string(), self.training.n_iter.to_string());
            if let Err(e) = tracker.log_params(&params) {
                warn!(error = %e, "Failed to record run params");
            }
            let mut cv = BTreeMap::new();
            cv.insert("cv_recall".to_string(), search.best_score);
            if let Err(e) = tracker.log_metrics(&cv) {
                warn!(error = %e, "Failed to record search score");
            }
        }

        info!(
            test_rows = x_test.n_rows(),
            threshold = self.training.eval_threshold,
            "[6/6] Evaluating"
        );
        let report = evaluate_model(
            &pipeline,
            x_test,
            y_test,
            self.training.eval_threshold,
            tracker,
        )?;

        pipeline.save(&self.training.artifact_path)?;

        let registry = FileModelRegistry::new(&self.registry.root, &self.registry.model_name);
        let mut metrics = report.metrics();
        metrics.insert("cv_recall".to_string(), search.best_score);
        let registered = registry.register(
            &pipeline,
            Registration {
                run_id: tracker.map(|t| t.run_id().to_string()),
                metrics,
            },
        )?;

        let promoted = self.registry.promote_on_register;
        if promoted {
            registry.set_alias(&self.registry.production_alias, registered.version)?;
        }

        Ok(TrainingSummary {
            run_id: tracker.map(|t| t.run_id().to_string()),
            artifact_path: self.training.artifact_path.clone(),
            registered_version: registered.version,
            promoted,
            best_params: search.best_params,
            cv_recall: search.best_score,
            feature_columns,
            report,
        })
    }

    fn start_tracker(&self) -> Option<FileRunTracker> {
        if !self.tracking.enabled {
            return None;
        }
        match FileRunTracker::start(&self.tracking.root, &self.tracking.experiment) {
            Ok(tracker) => Some(tracker),
            Err(e) => {
                warn!(error = %e, "Run tracking unavailable, continuing without it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_skip_the_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.data.sources = [("2022".to_string(), dir.path().join("missing.csv"))]
            .into_iter()
            .collect();
        config.training.artifact_path = dir.path().join("model.bin");
        config.registry.root = dir.path().join("models");
        config.tracking.enabled = false;

        let outcome = TrainingOrchestrator::from_config(&config)
            .run_training()
            .unwrap();
        assert!(matches!(outcome, TrainingOutcome::Skipped { .. }));
        assert!(!config.training.artifact_path.exists());
        assert!(!config.registry.root.exists());
    }

    #[test]
    fn test_outcome_status_labels() {
        let skipped = TrainingOutcome::Skipped {
            reason: "gone".to_string(),
        };
        assert_eq!(skipped.status(), "skipped");
    }
}

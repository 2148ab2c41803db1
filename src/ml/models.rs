use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Training run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the split, the search sampler and the forest
    #[serde(default = "default_random_state")]
    pub random_state: u64,

    /// Stratified folds per search trial
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Number of sampled hyperparameter combinations
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,

    /// Decision threshold used when evaluating the held-out split
    #[serde(default = "default_eval_threshold")]
    pub eval_threshold: f64,

    /// Canonical location of the persisted pipeline
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
            n_iter: default_n_iter(),
            eval_threshold: default_eval_threshold(),
            artifact_path: default_artifact_path(),
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    3
}

fn default_n_iter() -> usize {
    10
}

fn default_eval_threshold() -> f64 {
    0.45
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("app/model/model.bin")
}

/// Per-class weighting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Inverse class frequency over the whole training set
    Balanced,

    /// Inverse class frequency recomputed on each bootstrap sample
    BalancedSubsample,
}

impl fmt::Display for ClassWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassWeight::Balanced => write!(f, "balanced"),
            ClassWeight::BalancedSubsample => write!(f, "balanced_subsample"),
        }
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub class_weight: ClassWeight,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            class_weight: ClassWeight::Balanced,
        }
    }
}

impl Hyperparameters {
    /// Flattened form for run tracking
    pub fn to_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("n_estimators".to_string(), self.n_estimators.to_string());
        params.insert(
            "max_depth".to_string(),
            self.max_depth
                .map(|d| d.to_string())
                .unwrap_or_else(|| "None".to_string()),
        );
        params.insert(
            "min_samples_leaf".to_string(),
            self.min_samples_leaf.to_string(),
        );
        params.insert("class_weight".to_string(), self.class_weight.to_string());
        params
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_leaf={} class_weight={}",
            self.n_estimators,
            self.max_depth
                .map(|d| d.to_string())
                .unwrap_or_else(|| "None".to_string()),
            self.min_samples_leaf,
            self.class_weight
        )
    }
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Held-out evaluation of a fitted model at a decision threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,

    /// `[[TN, FP], [FN, TP]]`
    pub confusion_matrix: [[usize; 2]; 2],

    /// Keyed by class label ("0", "1")
    pub per_class: BTreeMap<String, ClassMetrics>,

    /// Sorted descending; `None` when the model does not expose them
    pub feature_importances: Option<Vec<(String, f64)>>,
}

impl EvaluationReport {
    /// Headline metrics for run tracking and the registry
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), self.accuracy);
        metrics.insert("precision".to_string(), self.precision);
        metrics.insert("recall".to_string(), self.recall);
        metrics.insert("f1_score".to_string(), self.f1_score);
        metrics
    }
}

/// Input column kind in a model signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Input/output schema stored next to each registered version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<SignatureColumn>,
    pub output: SignatureColumn,
}

/// Metadata written with each registered version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: u32,
    pub run_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub hyperparameters: Hyperparameters,
    pub metrics: BTreeMap<String, f64>,
    pub n_training_samples: usize,
    pub feature_names: Vec<String>,
}

//! Model training, evaluation and lifecycle for the student risk classifier
//!
//! - `preprocess` + `forest` make up the fitted `RiskPipeline` artifact
//! - `search` runs the stratified randomized hyperparameter search
//! - `evaluation` scores a model at a custom decision threshold
//! - `registry` and `tracking` persist versions, aliases and run records
//! - `training` orchestrates a full run

pub mod evaluation;
pub mod forest;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod search;
pub mod tracking;
pub mod training;

pub use evaluation::{apply_threshold, confusion_matrix, evaluate_model, recall_score};
pub use forest::RandomForest;
pub use models::{
    ClassMetrics, ClassWeight, ColumnKind, EvaluationReport, Hyperparameters, ModelMetadata,
    ModelSignature, SignatureColumn, TrainingConfig,
};
pub use pipeline::{RiskModel, RiskPipeline};
pub use preprocess::{ColumnTransform, Preprocessor};
pub use registry::{FileModelRegistry, LoadedModel, ModelInfo, ModelLoader, Registration};
pub use search::{stratified_kfold, stratified_split, RandomizedSearch, SearchResult, SearchSpace};
pub use tracking::{FileRunTracker, RunStatus, RunTracker};
pub use training::{TrainingOrchestrator, TrainingOutcome, TrainingSummary};

use crate::data::table::Table;
use crate::error::{AppError, Result};
use crate::ml::forest::RandomForest;
use crate::ml::models::{ColumnKind, Hyperparameters, ModelSignature, SignatureColumn};
use crate::ml::preprocess::Preprocessor;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// A fitted model the serving layer and the evaluator can score with.
///
/// The importance and output-name methods are optional capabilities; the
/// defaults report them as unavailable.
pub trait RiskModel: Send + Sync {
    /// Positive-class probability per row of an engineered feature table
    fn predict_proba(&self, x: &Table) -> Result<Vec<f64>>;

    /// Per-output-feature importances, if the model exposes them
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Output feature names of the preprocessing stage, if any
    fn feature_names_out(&self) -> Option<Vec<String>> {
        None
    }

    /// Short human-readable description for logs
    fn describe(&self) -> String {
        "risk model".to_string()
    }
}

/// Preprocessing stage plus forest: the persisted artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPipeline {
    preprocessor: Preprocessor,
    forest: RandomForest,
    n_training_samples: usize,
}

impl RiskPipeline {
    /// Fit preprocessing on `x`, then the forest on the transformed matrix
    pub fn fit(x: &Table, y: &[u8], params: &Hyperparameters, seed: u64) -> Result<Self> {
        let preprocessor = Preprocessor::fit(x)?;
        let matrix = preprocessor.transform(x)?;
        let forest = RandomForest::fit(&matrix, y, params, seed)?;

        debug!(
            rows = x.n_rows(),
            encoded_features = matrix.ncols(),
            params = %params,
            "Fitted risk pipeline"
        );

        Ok(Self {
            preprocessor,
            forest,
            n_training_samples: x.n_rows(),
        })
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        self.forest.params()
    }

    pub fn n_training_samples(&self) -> usize {
        self.n_training_samples
    }

    /// Inferred input/output schema
    pub fn signature(&self) -> ModelSignature {
        ModelSignature {
            inputs: self.preprocessor.input_columns(),
            output: SignatureColumn {
                name: "probability".to_string(),
                kind: ColumnKind::Numeric,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Persist atomically: write a sibling temp file, then rename over `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| AppError::Configuration(format!("invalid artifact path {}", path.display())))?;
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            uuid::Uuid::new_v4()
        ));

        let written = std::fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp, path));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }

        info!(path = %path.display(), bytes = bytes.len(), "Persisted model artifact");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl RiskModel for RiskPipeline {
    fn predict_proba(&self, x: &Table) -> Result<Vec<f64>> {
        let matrix = self.preprocessor.transform(x)?;
        self.forest.predict_proba(&matrix)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.forest.feature_importances())
    }

    fn feature_names_out(&self) -> Option<Vec<String>> {
        Some(self.preprocessor.feature_names_out())
    }

    fn describe(&self) -> String {
        format!(
            "random forest ({}), {} trees over {} features",
            self.forest.params(),
            self.forest.n_trees(),
            self.forest.n_features()
        )
    }
}

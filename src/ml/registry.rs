use crate::error::{AppError, Result};
use crate::ml::models::ModelMetadata;
use crate::ml::pipeline::{RiskModel, RiskPipeline};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const MODEL_FILE: &str = "model.bin";
const SIGNATURE_FILE: &str = "signature.json";
const METADATA_FILE: &str = "metadata.json";
const ALIASES_FILE: &str = "aliases.json";

/// Resolves an alias to a ready-to-serve model
pub trait ModelLoader: Send + Sync {
    fn load_alias(&self, alias: &str) -> Result<LoadedModel>;
}

/// A model resolved from the registry
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn RiskModel>,
    pub info: ModelInfo,
}

/// Identity of the model currently being served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: u32,
    pub alias: Option<String>,
    pub loaded_at: chrono::DateTime<Utc>,
}

/// Result of registering a fitted pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredVersion {
    pub name: String,
    pub version: u32,
    pub path: PathBuf,
}

/// Details recorded alongside a new version
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub run_id: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

/// Named, versioned model store on the local filesystem:
/// `<root>/<name>/v<N>/{model.bin,signature.json,metadata.json}` and
/// `<root>/<name>/aliases.json`
pub struct FileModelRegistry {
    root: PathBuf,
    name: String,
    write_lock: Mutex<()>,
}

impl FileModelRegistry {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn model_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    fn version_dir(&self, version: u32) -> PathBuf {
        self.model_dir().join(format!("v{}", version))
    }

    /// Versions present on disk, ascending
    pub fn versions(&self) -> Result<Vec<u32>> {
        let dir = self.model_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions: Vec<u32> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(MODEL_FILE).exists())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix('v'))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<u32>> {
        Ok(self.versions()?.last().copied())
    }

    /// Store the pipeline as the next version with its signature and metadata
    pub fn register(
        &self,
        pipeline: &RiskPipeline,
        registration: Registration,
    ) -> Result<RegisteredVersion> {
        let _guard = self.write_lock.lock();

        let version = self.latest_version()?.map_or(1, |v| v + 1);
        let dir = self.version_dir(version);
        std::fs::create_dir_all(&dir)?;

        let signature = pipeline.signature();
        let metadata = ModelMetadata {
            name: self.name.clone(),
            version,
            run_id: registration.run_id,
            created_at: Utc::now(),
            hyperparameters: pipeline.hyperparameters().clone(),
            metrics: registration.metrics,
            n_training_samples: pipeline.n_training_samples(),
            feature_names: signature.inputs.iter().map(|c| c.name.clone()).collect(),
        };

        std::fs::write(dir.join(SIGNATURE_FILE), serde_json::to_vec_pretty(&signature)?)?;
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&metadata)?)?;
        // model.bin last: a version only counts once its artifact exists
        let path = dir.join(MODEL_FILE);
        pipeline.save(&path)?;

        info!(model = %self.name, version, path = %path.display(), "Registered model version");
        Ok(RegisteredVersion {
            name: self.name.clone(),
            version,
            path,
        })
    }

    pub fn aliases(&self) -> Result<BTreeMap<String, u32>> {
        let path = self.model_dir().join(ALIASES_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    /// Point `alias` at an existing version
    pub fn set_alias(&self, alias: &str, version: u32) -> Result<()> {
        let _guard = self.write_lock.lock();

        if !self.version_dir(version).join(MODEL_FILE).exists() {
            return Err(AppError::Registry(format!(
                "{} has no version {}",
                self.name, version
            )));
        }

        let mut aliases = self.aliases()?;
        let previous = aliases.insert(alias.to_string(), version);

        let dir = self.model_dir();
        let tmp = dir.join(format!(".{}.tmp", ALIASES_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(&aliases)?)?;
        std::fs::rename(&tmp, dir.join(ALIASES_FILE))?;

        info!(model = %self.name, alias, version, previous = ?previous, "Moved alias");
        Ok(())
    }

    pub fn resolve_alias(&self, alias: &str) -> Result<u32> {
        self.aliases()?.get(alias).copied().ok_or_else(|| {
            AppError::Registry(format!("alias '{}' is not set for {}", alias, self.name))
        })
    }

    pub fn load_version(&self, version: u32) -> Result<RiskPipeline> {
        let path = self.version_dir(version).join(MODEL_FILE);
        if !path.exists() {
            return Err(AppError::Registry(format!(
                "{} has no version {}",
                self.name, version
            )));
        }
        RiskPipeline::load(&path)
    }

    pub fn metadata(&self, version: u32) -> Result<ModelMetadata> {
        let path = self.version_dir(version).join(METADATA_FILE);
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}

impl ModelLoader for FileModelRegistry {
    fn load_alias(&self, alias: &str) -> Result<LoadedModel> {
        let version = self.resolve_alias(alias)?;
        let pipeline = self.load_version(version).map_err(|e| {
            warn!(model = %self.name, version, error = %e, "Failed to load registered artifact");
            AppError::Registry(format!("{} v{}: {}", self.name, version, e))
        })?;

        Ok(LoadedModel {
            model: Arc::new(pipeline),
            info: ModelInfo {
                name: self.name.clone(),
                version,
                alias: Some(alias.to_string()),
                loaded_at: Utc::now(),
            },
        })
    }
}

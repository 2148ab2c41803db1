use crate::error::{AppError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sink for run parameters, metrics and artifacts
pub trait RunTracker: Send + Sync {
    fn run_id(&self) -> &str;

    fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<()>;

    fn log_artifact(&self, name: &str, contents: &[u8]) -> Result<()>;
}

/// Final state of a tracked run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    run_id: String,
    experiment: String,
    status: RunStatus,
    started_at: chrono::DateTime<Utc>,
    ended_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Default)]
struct RunState {
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

/// Tracking store on the local filesystem:
/// `<root>/<experiment>/<run_id>/{meta,params,metrics}.json` plus `artifacts/`
pub struct FileRunTracker {
    run_id: String,
    run_dir: PathBuf,
    meta: Mutex<RunMeta>,
    state: Mutex<RunState>,
}

impl FileRunTracker {
    /// Open a new run under the experiment
    pub fn start(root: &Path, experiment: &str) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let run_dir = root.join(experiment).join(&run_id);
        std::fs::create_dir_all(run_dir.join("artifacts"))?;

        let tracker = Self {
            meta: Mutex::new(RunMeta {
                run_id: run_id.clone(),
                experiment: experiment.to_string(),
                status: RunStatus::Running,
                started_at: Utc::now(),
                ended_at: None,
            }),
            state: Mutex::new(RunState::default()),
            run_id,
            run_dir,
        };
        tracker.write_meta()?;

        info!(run_id = %tracker.run_id, dir = %tracker.run_dir.display(), "Started tracked run");
        Ok(tracker)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Close the run with its final status
    pub fn finish(&self, status: RunStatus) -> Result<()> {
        {
            let mut meta = self.meta.lock();
            meta.status = status;
            meta.ended_at = Some(Utc::now());
        }
        self.write_meta()?;
        info!(run_id = %self.run_id, status = ?status, "Closed tracked run");
        Ok(())
    }

    fn write_meta(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.meta.lock())?;
        std::fs::write(self.run_dir.join("meta.json"), bytes)?;
        Ok(())
    }
}

impl RunTracker for FileRunTracker {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock();
        state.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        std::fs::write(
            self.run_dir.join("params.json"),
            serde_json::to_vec_pretty(&state.params)?,
        )?;
        debug!(run_id = %self.run_id, count = params.len(), "Logged params");
        Ok(())
    }

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let mut state = self.state.lock();
        state.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        std::fs::write(
            self.run_dir.join("metrics.json"),
            serde_json::to_vec_pretty(&state.metrics)?,
        )?;
        debug!(run_id = %self.run_id, count = metrics.len(), "Logged metrics");
        Ok(())
    }

    fn log_artifact(&self, name: &str, contents: &[u8]) -> Result<()> {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| AppError::Validation(format!("invalid artifact name '{}'", name)))?;
        std::fs::write(self.run_dir.join("artifacts").join(file_name), contents)?;
        debug!(run_id = %self.run_id, artifact = %name, bytes = contents.len(), "Logged artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_layout() {
        let dir = TempDir::new().unwrap();
        let tracker = FileRunTracker::start(dir.path(), "student-risk").unwrap();

        let mut params = BTreeMap::new();
        params.insert("n_estimators".to_string(), "200".to_string());
        tracker.log_params(&params).unwrap();

        let mut metrics = BTreeMap::new();
        metrics.insert("recall".to_string(), 0.8);
        tracker.log_metrics(&metrics).unwrap();
        metrics.clear();
        metrics.insert("f1_score".to_string(), 0.7);
        tracker.log_metrics(&metrics).unwrap();

        tracker.log_artifact("confusion_matrix.txt", b"tn fp").unwrap();
        tracker.finish(RunStatus::Finished).unwrap();

        let run_dir = dir.path().join("student-risk").join(tracker.run_id());
        let stored: BTreeMap<String, f64> =
            serde_json::from_slice(&std::fs::read(run_dir.join("metrics.json")).unwrap()).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(run_dir.join("artifacts/confusion_matrix.txt").exists());

        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(run_dir.join("meta.json")).unwrap()).unwrap();
        assert_eq!(meta["status"], "finished");
        assert!(!meta["ended_at"].is_null());
    }

    #[test]
    fn test_artifact_names_cannot_escape_run() {
        let dir = TempDir::new().unwrap();
        let tracker = FileRunTracker::start(dir.path(), "exp").unwrap();
        tracker.log_artifact("../../outside.txt", b"x").unwrap();
        assert!(tracker.run_dir().join("artifacts/outside.txt").exists());
        assert!(tracker.log_artifact("..", b"x").is_err());
    }
}

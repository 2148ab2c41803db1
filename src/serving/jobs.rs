use crate::error::{AppError, Result};
use crate::metrics::TRAINING_RUNS_TOTAL;
use crate::ml::training::{TrainingOrchestrator, TrainingOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A long-running, blocking training run
pub trait TrainingJob: Send + Sync + 'static {
    fn run(&self) -> Result<TrainingOutcome>;

    fn name(&self) -> &str {
        "training"
    }
}

impl TrainingJob for TrainingOrchestrator {
    fn run(&self) -> Result<TrainingOutcome> {
        self.run_training()
    }

    fn name(&self) -> &str {
        "student-risk-training"
    }
}

/// What happened when a retrain was requested
#[derive(Debug)]
pub enum RetrainTrigger {
    /// A background run was started; the handle resolves once it is over
    Started(JoinHandle<()>),

    /// A run is already in progress; no second one was started
    AlreadyRunning,
}

/// Runs training jobs off the request path, one at a time.
///
/// Outcomes are only logged and counted; the caller never waits on them.
pub struct RetrainScheduler {
    job: Arc<dyn TrainingJob>,
    running: Arc<AtomicBool>,
}

impl RetrainScheduler {
    pub fn new(job: Arc<dyn TrainingJob>) -> Self {
        Self {
            job,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the job on the blocking pool and return immediately
    pub fn trigger(&self) -> Result<RetrainTrigger> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Retrain(format!("no async runtime available: {}", e)))?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(job = %self.job.name(), "Retrain requested while a run is in progress");
            return Ok(RetrainTrigger::AlreadyRunning);
        }

        let job = self.job.clone();
        let running = self.running.clone();
        info!(job = %job.name(), "🚀 Background retraining started");

        let handle = runtime.spawn(async move {
            let name = job.name().to_string();
            let result = tokio::task::spawn_blocking(move || job.run()).await;
            running.store(false, Ordering::SeqCst);

            match result {
                Ok(Ok(TrainingOutcome::Completed(summary))) => info!(
                    job = %name,
                    version = summary.registered_version,
                    promoted = summary.promoted,
                    recall = summary.report.recall,
                    "✅ Background retraining finished"
                ),
                Ok(Ok(TrainingOutcome::Skipped { reason })) => {
                    warn!(job = %name, reason = %reason, "Background retraining skipped")
                }
                Ok(Err(e)) => {
                    error!(job = %name, error = %e, "Background retraining failed")
                }
                Err(join_error) => {
                    TRAINING_RUNS_TOTAL.with_label_values(&["panicked"]).inc();
                    let detail = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        join_error.to_string()
                    };
                    error!(job = %name, detail = %detail, "Background retraining crashed");
                }
            }
        });

        Ok(RetrainTrigger::Started(handle))
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        runs: AtomicUsize,
        delay_ms: u64,
    }

    impl TrainingJob for CountingJob {
        fn run(&self) -> Result<TrainingOutcome> {
            std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(TrainingOutcome::Skipped {
                reason: "no data".to_string(),
            })
        }
    }

    struct PanickingJob;

    impl TrainingJob for PanickingJob {
        fn run(&self) -> Result<TrainingOutcome> {
            panic!("out of memory while fitting");
        }
    }

    #[tokio::test]
    async fn test_trigger_runs_job_in_background() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            delay_ms: 0,
        });
        let scheduler = RetrainScheduler::new(job.clone());

        match scheduler.trigger().unwrap() {
            RetrainTrigger::Started(handle) => handle.await.unwrap(),
            RetrainTrigger::AlreadyRunning => panic!("nothing was running"),
        }
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_second_trigger_while_running() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            delay_ms: 200,
        });
        let scheduler = RetrainScheduler::new(job.clone());

        let first = scheduler.trigger().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.trigger().unwrap(),
            RetrainTrigger::AlreadyRunning
        ));

        if let RetrainTrigger::Started(handle) = first {
            handle.await.unwrap();
        }
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let scheduler = RetrainScheduler::new(Arc::new(PanickingJob));
        if let RetrainTrigger::Started(handle) = scheduler.trigger().unwrap() {
            assert!(handle.await.is_ok());
        }
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_trigger_outside_runtime() {
        let scheduler = RetrainScheduler::new(Arc::new(PanickingJob));
        assert!(matches!(scheduler.trigger(), Err(AppError::Retrain(_))));
    }
}

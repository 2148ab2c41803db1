//! Online scoring and model lifecycle
//!
//! - `schemas`: request and response bodies of the predict endpoint
//! - `context`: the served model, swapped atomically on reload
//! - `jobs`: background retraining

pub mod context;
pub mod jobs;
pub mod schemas;

pub use context::{ServingContext, DEFAULT_SERVING_THRESHOLD};
pub use jobs::{RetrainScheduler, RetrainTrigger, TrainingJob};
pub use schemas::{RiskRequest, RiskResponse, NO_RISK_MESSAGE, RISK_MESSAGE};

pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::serving::{RetrainScheduler, ServingContext};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub serving: Arc<ServingContext>,
    pub retrain: Arc<RetrainScheduler>,
}

impl AppState {
    pub fn new(serving: Arc<ServingContext>, retrain: Arc<RetrainScheduler>) -> Self {
        Self { serving, retrain }
    }
}

//! Student risk pipeline
//!
//! Cleans the yearly PEDE spreadsheets, engineers features, trains a
//! random-forest classifier tuned for recall, and serves predictions over
//! HTTP with reload and background retraining.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod metrics;
pub mod ml;
pub mod serving;

pub use error::{AppError, Result};

//! Feature engineering shared by training and serving
//!
//! The same transform runs on the full training table and on a single
//! serving record, so the derived columns line up with what the fitted
//! pipeline expects.

pub mod engineering;

pub use engineering::{
    create_features, create_features_with, create_training_features, extract_phase,
    is_leakage_column, FeatureConfig, DROPPED_COLUMNS, INTERACTIONS, TARGET_COLUMN,
};
